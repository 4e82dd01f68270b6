//! Leading frontmatter extraction (`---` YAML or `+++` TOML).

use inkwell_core::AppResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Syntax of a frontmatter block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrontmatterFormat {
    Yaml,
    Toml,
}

/// Structured metadata block found at the top of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frontmatter {
    /// Block syntax
    pub format: FrontmatterFormat,

    /// Text between the fences
    pub raw: String,

    /// Parsed top-level keys; empty when the block does not parse as a table
    pub fields: BTreeMap<String, serde_json::Value>,

    /// Line of the closing fence (1-based); the block spans `1..=end_line`
    pub end_line: usize,
}

/// Split a document into its frontmatter (if any) and the remaining body.
///
/// Returns the frontmatter and the body text. When frontmatter is present the
/// body starts at line `end_line + 1` of the original document.
pub fn extract_frontmatter(text: &str) -> (Option<Frontmatter>, &str) {
    let mut lines = text.split_inclusive('\n');

    let format = match lines.next().map(|l| l.trim_end()) {
        Some("---") => FrontmatterFormat::Yaml,
        Some("+++") => FrontmatterFormat::Toml,
        _ => return (None, text),
    };
    let fence = match format {
        FrontmatterFormat::Yaml => "---",
        FrontmatterFormat::Toml => "+++",
    };

    let mut offset = text.split_inclusive('\n').next().map_or(0, str::len);
    let raw_start = offset;
    let mut line_no = 1;

    for line in lines {
        line_no += 1;
        let line_end = offset + line.len();
        if line.trim_end() == fence {
            let raw = text[raw_start..offset].trim_end_matches(['\r', '\n']).to_string();
            let fields = parse_fields(format, &raw);
            let frontmatter = Frontmatter {
                format,
                raw,
                fields,
                end_line: line_no,
            };
            return (Some(frontmatter), &text[line_end..]);
        }
        offset = line_end;
    }

    // Unterminated fence: not frontmatter
    (None, text)
}

fn parse_fields(format: FrontmatterFormat, raw: &str) -> BTreeMap<String, serde_json::Value> {
    if raw.trim().is_empty() {
        return BTreeMap::new();
    }

    match parse_value(format, raw) {
        Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
        Ok(_) => BTreeMap::new(),
        Err(e) => {
            tracing::debug!("Frontmatter kept unparsed: {}", e);
            BTreeMap::new()
        }
    }
}

fn parse_value(format: FrontmatterFormat, raw: &str) -> AppResult<serde_json::Value> {
    let value = match format {
        FrontmatterFormat::Yaml => {
            serde_json::to_value(serde_yaml::from_str::<serde_yaml::Value>(raw)?)?
        }
        FrontmatterFormat::Toml => serde_json::to_value(raw.parse::<toml::Table>()?)?,
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_frontmatter() {
        let doc = "---\ntitle: Notes\ntags: [a, b]\n---\n# Heading\nBody\n";
        let (fm, body) = extract_frontmatter(doc);
        let fm = fm.unwrap();

        assert_eq!(fm.format, FrontmatterFormat::Yaml);
        assert_eq!(fm.end_line, 4);
        assert_eq!(fm.fields["title"], serde_json::json!("Notes"));
        assert_eq!(fm.fields["tags"], serde_json::json!(["a", "b"]));
        assert_eq!(body, "# Heading\nBody\n");
    }

    #[test]
    fn test_toml_frontmatter() {
        let doc = "+++\ntitle = \"Draft\"\nweight = 3\n+++\ntext";
        let (fm, body) = extract_frontmatter(doc);
        let fm = fm.unwrap();

        assert_eq!(fm.format, FrontmatterFormat::Toml);
        assert_eq!(fm.fields["weight"], serde_json::json!(3));
        assert_eq!(body, "text");
    }

    #[test]
    fn test_malformed_toml_is_serialization_error() {
        let err = parse_value(FrontmatterFormat::Toml, "title = ").unwrap_err();
        assert!(matches!(err, inkwell_core::AppError::Serialization(_)));

        let (fm, _) = extract_frontmatter("+++\ntitle = \n+++\nbody");
        let fm = fm.unwrap();
        assert!(fm.fields.is_empty());
        assert_eq!(fm.raw, "title = ");
    }

    #[test]
    fn test_no_frontmatter() {
        let doc = "# Title\n---\n";
        let (fm, body) = extract_frontmatter(doc);
        assert!(fm.is_none());
        assert_eq!(body, doc);
    }

    #[test]
    fn test_unterminated_is_body() {
        let doc = "---\ntitle: x\nno closing fence\n";
        let (fm, body) = extract_frontmatter(doc);
        assert!(fm.is_none());
        assert_eq!(body, doc);
    }

    #[test]
    fn test_unparseable_block_is_still_stripped() {
        let doc = "---\n: : :\n  - [\n---\nbody";
        let (fm, body) = extract_frontmatter(doc);
        let fm = fm.unwrap();
        assert!(fm.fields.is_empty());
        assert_eq!(fm.raw, ": : :\n  - [");
        assert_eq!(body, "body");
    }
}
