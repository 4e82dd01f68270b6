//! Line classification for markdown chunking.

/// Structural role of a single markdown line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// Empty or whitespace-only line
    Blank,

    /// ATX heading (`#` to `######`)
    Heading { level: usize, title: String },

    /// Code fence opener/closer; carries the fence character (`` ` `` or `~`)
    Fence(char),

    /// Bulleted or numbered list item
    ListItem,

    /// Pipe table row or separator
    TableRow,

    /// Anything else
    Text,
}

/// Classify a markdown line outside of a code block.
pub fn classify_line(line: &str) -> LineKind {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }

    // Four or more leading spaces is an indented code line, not structure
    let indent = line.len() - line.trim_start_matches(' ').len();

    if let Some(fence) = fence_char(trimmed) {
        if indent < 4 {
            return LineKind::Fence(fence);
        }
    }

    if indent < 4 {
        if let Some((level, title)) = parse_heading(trimmed) {
            return LineKind::Heading { level, title };
        }
    }

    if is_list_item(trimmed) {
        return LineKind::ListItem;
    }

    if is_table_row(trimmed) {
        return LineKind::TableRow;
    }

    LineKind::Text
}

/// Return the fence character if the line opens or closes a fenced block.
pub(crate) fn fence_char(trimmed: &str) -> Option<char> {
    if trimmed.starts_with("```") {
        Some('`')
    } else if trimmed.starts_with("~~~") {
        Some('~')
    } else {
        None
    }
}

/// Parse `## Title ##` into `(2, "Title")`.
fn parse_heading(trimmed: &str) -> Option<(usize, String)> {
    let level = trimmed.chars().take_while(|&c| c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }

    let rest = &trimmed[level..];
    if !rest.starts_with(|c: char| c.is_whitespace()) {
        return None;
    }

    let title = rest.trim().trim_end_matches('#').trim_end();
    if title.is_empty() {
        return None;
    }

    Some((level, title.to_string()))
}

fn is_list_item(trimmed: &str) -> bool {
    if ["- ", "* ", "+ "].iter().any(|m| trimmed.starts_with(m)) {
        return true;
    }

    // Ordered items: "1. " or "1) "
    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 || digits > 9 {
        return false;
    }
    let rest = &trimmed[digits..];
    rest.starts_with(". ") || rest.starts_with(") ")
}

fn is_table_row(trimmed: &str) -> bool {
    if trimmed.starts_with('|') {
        return true;
    }

    // Separator rows without outer pipes, e.g. "---|:---:"
    trimmed.contains('|')
        && trimmed
            .chars()
            .all(|c| matches!(c, '|' | '-' | ':' | ' '))
}
