//! Markdown chunker.

use super::{
    detection::{classify_line, LineKind},
    frontmatter::{extract_frontmatter, Frontmatter},
    Chunk, ContentKind,
};
use crate::tokens::estimate_tokens_for_chars;
use serde::{Deserialize, Serialize};

/// Token thresholds for chunking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Smallest chunk produced by a size-driven split
    #[serde(default = "default_min_tokens")]
    pub min_tokens: usize,

    /// Target size; a chunk closes once its buffer reaches this
    #[serde(default = "default_default_tokens")]
    pub default_tokens: usize,

    /// Ceiling for a chunk. Exceeded by a single oversized line or code block,
    /// or when a buffer below `min_tokens` absorbs the line that crosses it
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

fn default_min_tokens() -> usize {
    50
}

fn default_default_tokens() -> usize {
    500
}

fn default_max_tokens() -> usize {
    1500
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            min_tokens: default_min_tokens(),
            default_tokens: default_default_tokens(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Structure-aware markdown chunker.
#[derive(Debug, Clone, Default)]
pub struct MarkdownChunker {
    config: ChunkConfig,
}

impl MarkdownChunker {
    /// Create a new chunker with configuration.
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Split a markdown document into chunks.
    ///
    /// Never fails: malformed markdown is chunked on a best-effort basis and a
    /// document without content yields no chunks.
    pub fn chunk(&self, text: &str, source: &str) -> Vec<Chunk> {
        let (frontmatter, body) = extract_frontmatter(text);
        let first_line = frontmatter.as_ref().map_or(1, |fm| fm.end_line + 1);
        let lines: Vec<&str> = body.lines().collect();

        let mut builder = ChunkBuilder::new(source, &self.config);
        let mut i = 0;

        while i < lines.len() {
            let line_no = first_line + i;
            match classify_line(lines[i]) {
                LineKind::Fence(fence) => {
                    let close = lines[i + 1..]
                        .iter()
                        .position(|l| is_closing_fence(l, fence))
                        .map_or(lines.len() - 1, |offset| i + 1 + offset);
                    builder.push_code_block(line_no, &lines[i..=close]);
                    i = close + 1;
                }
                LineKind::Heading { level, title } => {
                    builder.push_heading(line_no, level, title);
                    i += 1;
                }
                kind => {
                    builder.push_line(line_no, lines[i], kind);
                    i += 1;
                }
            }
        }

        let chunks = builder.finish(frontmatter);

        tracing::debug!(
            "Chunked '{}' into {} chunks from {} bytes",
            source,
            chunks.len(),
            text.len()
        );

        chunks
    }
}

fn is_closing_fence(line: &str, fence: char) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= 3 && trimmed.chars().all(|c| c == fence)
}

/// Role of a buffered line when assembling chunk text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Heading,
    Blank,
    Body(ContentKind),
}

#[derive(Debug)]
struct BufferedLine<'a> {
    line_no: usize,
    text: &'a str,
    slot: Slot,
}

/// Accumulates lines and closes chunks.
struct ChunkBuilder<'a> {
    source: &'a str,
    config: &'a ChunkConfig,
    chunks: Vec<Chunk>,
    headings: Vec<(usize, String)>,
    buffer: Vec<BufferedLine<'a>>,
    /// Characters of non-heading lines in the buffer, newlines included
    body_chars: usize,
}

impl<'a> ChunkBuilder<'a> {
    fn new(source: &'a str, config: &'a ChunkConfig) -> Self {
        Self {
            source,
            config,
            chunks: Vec::new(),
            headings: Vec::new(),
            buffer: Vec::new(),
            body_chars: 0,
        }
    }

    fn body_tokens(&self) -> usize {
        estimate_tokens_for_chars(self.body_chars)
    }

    /// True once the buffer holds a heading or any non-blank body line.
    fn has_content(&self) -> bool {
        self.buffer.iter().any(|l| l.slot != Slot::Blank)
    }

    fn has_body(&self) -> bool {
        self.buffer.iter().any(|l| matches!(l.slot, Slot::Body(_)))
    }

    fn push_heading(&mut self, line_no: usize, level: usize, title: String) {
        // The section in progress ends here, even when it is only a heading
        if self.has_content() {
            self.flush();
        }

        while self.headings.last().is_some_and(|(l, _)| *l >= level) {
            self.headings.pop();
        }
        self.headings.push((level, title));

        self.buffer.push(BufferedLine {
            line_no,
            text: "",
            slot: Slot::Heading,
        });
    }

    fn push_line(&mut self, line_no: usize, text: &'a str, kind: LineKind) {
        let slot = match kind {
            LineKind::Blank => Slot::Blank,
            LineKind::ListItem => Slot::Body(ContentKind::List),
            LineKind::TableRow => Slot::Body(ContentKind::Table),
            _ => Slot::Body(ContentKind::Prose),
        };
        let chars = text.chars().count() + 1;

        // A buffer still under min_tokens takes the line and overflows instead
        if slot != Slot::Blank
            && self.has_body()
            && self.body_tokens() >= self.config.min_tokens
            && estimate_tokens_for_chars(self.body_chars + chars) > self.config.max_tokens
        {
            self.flush();
        }

        self.buffer.push(BufferedLine {
            line_no,
            text,
            slot,
        });
        self.body_chars += chars;

        if self.body_tokens() >= self.config.default_tokens {
            self.flush();
        }
    }

    /// Append a fenced block as one unit.
    fn push_code_block(&mut self, first_line: usize, block: &[&'a str]) {
        let block_chars: usize = block.iter().map(|l| l.chars().count() + 1).sum();
        let block_tokens = estimate_tokens_for_chars(block_chars);

        if self.has_body()
            && (self.body_tokens() >= self.config.min_tokens || block_tokens > self.config.max_tokens)
            && estimate_tokens_for_chars(self.body_chars + block_chars) > self.config.max_tokens
        {
            self.flush();
        }

        for (offset, text) in block.iter().enumerate() {
            self.buffer.push(BufferedLine {
                line_no: first_line + offset,
                text,
                slot: Slot::Body(ContentKind::Code),
            });
        }
        self.body_chars += block_chars;

        if block_tokens > self.config.max_tokens || self.body_tokens() >= self.config.default_tokens
        {
            self.flush();
        }
    }

    /// Close the buffer as a chunk. Blank-only buffers are carried forward.
    fn flush(&mut self) {
        if !self.has_content() {
            return;
        }

        let (start_line, end_line) = match (self.buffer.first(), self.buffer.last()) {
            (Some(first), Some(last)) => (first.line_no, last.line_no),
            _ => return,
        };

        let text = self.buffer_text();
        let content_type = self.majority_kind();
        let heading_path = self.headings.iter().map(|(_, t)| t.clone()).collect();

        self.chunks.push(Chunk::new(
            self.source,
            self.chunks.len(),
            text,
            heading_path,
            (start_line, end_line),
            content_type,
        ));

        self.buffer.clear();
        self.body_chars = 0;
    }

    /// Join body lines, dropping blank lines at either edge.
    fn buffer_text(&self) -> String {
        let body: Vec<&BufferedLine> = self
            .buffer
            .iter()
            .filter(|l| l.slot != Slot::Heading)
            .collect();

        let first = body.iter().position(|l| l.slot != Slot::Blank);
        let last = body.iter().rposition(|l| l.slot != Slot::Blank);

        match (first, last) {
            (Some(first), Some(last)) => body[first..=last]
                .iter()
                .map(|l| l.text)
                .collect::<Vec<_>>()
                .join("\n")
                .trim_end()
                .to_string(),
            _ => String::new(),
        }
    }

    /// Dominant content kind by character volume; prose wins ties.
    fn majority_kind(&self) -> ContentKind {
        let order = [
            ContentKind::Prose,
            ContentKind::Code,
            ContentKind::List,
            ContentKind::Table,
        ];
        let mut volume = [0usize; 4];

        for line in &self.buffer {
            if let Slot::Body(kind) = line.slot {
                if let Some(idx) = order.iter().position(|k| *k == kind) {
                    volume[idx] += line.text.trim().chars().count();
                }
            }
        }

        let mut best = 0;
        for idx in 1..order.len() {
            if volume[idx] > volume[best] {
                best = idx;
            }
        }
        order[best]
    }

    fn finish(mut self, frontmatter: Option<Frontmatter>) -> Vec<Chunk> {
        if self.has_content() {
            self.flush();
        }

        // Trailing blank lines belong to the last chunk
        let trailing_end = self.buffer.last().map(|l| l.line_no);

        if self.chunks.is_empty() {
            return match frontmatter {
                Some(fm) => {
                    let end_line = trailing_end.unwrap_or(fm.end_line);
                    let mut chunk = Chunk::new(
                        self.source,
                        0,
                        fm.raw.clone(),
                        Vec::new(),
                        (1, end_line),
                        ContentKind::Frontmatter,
                    );
                    chunk.frontmatter = Some(fm);
                    vec![chunk]
                }
                None => Vec::new(),
            };
        }

        if let (Some(end), Some(last)) = (trailing_end, self.chunks.last_mut()) {
            last.end_line = end;
        }

        if let Some(first) = self.chunks.first_mut() {
            first.frontmatter = frontmatter;
        }

        self.chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> ChunkConfig {
        ChunkConfig {
            min_tokens: 5,
            default_tokens: 20,
            max_tokens: 40,
        }
    }

    /// Assert that chunk spans tile `first..=last` exactly.
    fn assert_coverage(chunks: &[Chunk], first: usize, last: usize) {
        let mut spans: Vec<(usize, usize)> =
            chunks.iter().map(|c| (c.start_line, c.end_line)).collect();
        spans.sort();

        let mut expected = first;
        for (start, end) in spans {
            assert!(start <= end, "inverted span {}..{}", start, end);
            assert_eq!(start, expected, "gap or overlap at line {}", expected);
            expected = end + 1;
        }
        assert_eq!(expected, last + 1, "lines after {} not covered", expected - 1);
    }

    #[test]
    fn test_empty_document() {
        let chunker = MarkdownChunker::default();
        assert!(chunker.chunk("", "a.md").is_empty());
        assert!(chunker.chunk("\n\n   \n", "a.md").is_empty());
    }

    #[test]
    fn test_heading_paths() {
        let doc = "# Guide\nIntro text.\n## Setup\nInstall it.\nConfigure it.\n## Usage\nRun it.\n";
        let chunks = MarkdownChunker::default().chunk(doc, "guide.md");

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].heading_path, vec!["Guide"]);
        assert_eq!(chunks[0].text, "Intro text.");
        assert_eq!(chunks[1].heading_path, vec!["Guide", "Setup"]);
        assert_eq!(chunks[1].text, "Install it.\nConfigure it.");
        assert_eq!((chunks[1].start_line, chunks[1].end_line), (3, 5));
        assert_eq!(chunks[2].heading_path, vec!["Guide", "Usage"]);
        assert_coverage(&chunks, 1, 7);
    }

    #[test]
    fn test_heading_pops_to_shallower_level() {
        let doc = "# A\n## B\n### C\ntext c\n## D\ntext d\n# E\ntext e";
        let chunks = MarkdownChunker::default().chunk(doc, "x.md");

        let paths: Vec<Vec<String>> = chunks.iter().map(|c| c.heading_path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                vec!["A"],
                vec!["A", "B"],
                vec!["A", "B", "C"],
                vec!["A", "D"],
                vec!["E"],
            ]
        );
    }

    #[test]
    fn test_headings_only() {
        let doc = "# One\n## Two\n# Three";
        let chunks = MarkdownChunker::default().chunk(doc, "h.md");

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.text.is_empty()));
        assert_eq!(chunks[1].heading_path, vec!["One", "Two"]);
        assert_coverage(&chunks, 1, 3);
    }

    #[test]
    fn test_size_split_at_default_tokens() {
        // Each line is 40 chars + newline = 10 tokens; default is 20
        let line = "abcdefghij".repeat(4);
        let doc = vec![line.as_str(); 5].join("\n");
        let chunks = MarkdownChunker::new(small_config()).chunk(&doc, "s.md");

        assert_eq!(chunks.len(), 3);
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 2));
        assert_eq!((chunks[1].start_line, chunks[1].end_line), (3, 4));
        assert_eq!((chunks[2].start_line, chunks[2].end_line), (5, 5));
        for chunk in &chunks[..2] {
            assert!(chunk.token_count >= small_config().min_tokens);
            assert!(chunk.token_count <= small_config().max_tokens);
        }
        assert_coverage(&chunks, 1, 5);
    }

    #[test]
    fn test_small_buffer_absorbs_long_line() {
        let doc = format!("short\n{}\nmore text follows here.", "y".repeat(159));
        let config = small_config();
        let chunks = MarkdownChunker::new(config.clone()).chunk(&doc, "l.md");

        assert_eq!(chunks.len(), 2);
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 2));
        assert!(chunks[0].text.starts_with("short\nyyy"));
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.token_count >= config.min_tokens);
        }
        assert_coverage(&chunks, 1, 3);
    }

    #[test]
    fn test_code_block_is_atomic() {
        let doc = "Some intro line.\n```rust\nfn a() {}\n\nfn b() {}\n```\nAfter.";
        let chunks = MarkdownChunker::new(small_config()).chunk(doc, "c.md");

        let with_code: Vec<&Chunk> = chunks
            .iter()
            .filter(|c| c.text.contains("fn a()"))
            .collect();
        assert_eq!(with_code.len(), 1);
        assert!(with_code[0].text.contains("fn b()"));
        assert!(with_code[0].text.contains("```rust"));
        assert_coverage(&chunks, 1, 7);
    }

    #[test]
    fn test_heading_inside_code_block_is_not_a_heading() {
        let doc = "# Real\n```\n# not a heading\n```\n";
        let chunks = MarkdownChunker::default().chunk(doc, "c.md");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].heading_path, vec!["Real"]);
        assert_eq!(chunks[0].content_type, ContentKind::Code);
    }

    #[test]
    fn test_oversized_code_block_gets_own_chunk() {
        let code_line = "let value = compute(input);".repeat(2);
        let mut doc = String::from("Intro paragraph.\n```\n");
        for _ in 0..20 {
            doc.push_str(&code_line);
            doc.push('\n');
        }
        doc.push_str("```\nTail.");

        let chunks = MarkdownChunker::new(small_config()).chunk(&doc, "big.md");
        let code_chunk = chunks
            .iter()
            .find(|c| c.content_type == ContentKind::Code)
            .unwrap();

        assert!(code_chunk.token_count > small_config().max_tokens);
        assert!(code_chunk.text.starts_with("```"));
        assert!(!code_chunk.text.contains("Intro"));
        assert!(!code_chunk.text.contains("Tail"));
        assert_coverage(&chunks, 1, 24);
    }

    #[test]
    fn test_unterminated_fence_runs_to_end() {
        let doc = "Text.\n```\ncode\nmore code";
        let chunks = MarkdownChunker::default().chunk(doc, "u.md");
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.ends_with("more code"));
        assert_coverage(&chunks, 1, 4);
    }

    #[test]
    fn test_majority_content_type() {
        let doc = "# List\n- one item here\n- two item here\n- three item here\nshort\n# Table\n| a | b |\n|---|---|\n| 1 | 2 |";
        let chunks = MarkdownChunker::default().chunk(doc, "m.md");

        assert_eq!(chunks[0].content_type, ContentKind::List);
        assert_eq!(chunks[1].content_type, ContentKind::Table);
    }

    #[test]
    fn test_frontmatter_attached_to_first_chunk() {
        let doc = "---\ntitle: Notes\n---\n# Intro\nHello.\n## More\nWorld.";
        let chunks = MarkdownChunker::default().chunk(doc, "f.md");

        let fm = chunks[0].frontmatter.as_ref().unwrap();
        assert_eq!(fm.fields["title"], serde_json::json!("Notes"));
        assert!(chunks[1..].iter().all(|c| c.frontmatter.is_none()));
        assert!(chunks.iter().all(|c| !c.text.contains("title")));
        assert_coverage(&chunks, 4, 7);
    }

    #[test]
    fn test_frontmatter_only_document() {
        let doc = "---\ntitle: Empty\n---\n";
        let chunks = MarkdownChunker::default().chunk(doc, "f.md");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content_type, ContentKind::Frontmatter);
        assert_eq!(chunks[0].text, "title: Empty");
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 3));
    }

    #[test]
    fn test_blank_lines_are_covered() {
        let doc = "\n\n# Title\n\nBody line.\n\n\n";
        let chunks = MarkdownChunker::default().chunk(doc, "b.md");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Body line.");
        assert_coverage(&chunks, 1, 7);
    }

    #[test]
    fn test_trailing_small_chunk_is_kept() {
        let long_line = "word ".repeat(30);
        let doc = format!("{}\n{}\nok", long_line.trim(), long_line.trim());
        let chunks = MarkdownChunker::new(small_config()).chunk(&doc, "t.md");

        let last = chunks.last().unwrap();
        assert_eq!(last.text, "ok");
        assert!(last.token_count < small_config().min_tokens);
    }

    #[test]
    fn test_chunk_indexes_and_ids() {
        let doc = "# A\none\n# B\ntwo";
        let chunks = MarkdownChunker::default().chunk(doc, "docs/x.md");

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert_eq!(chunk.id, format!("docs/x.md#{}", i));
            assert_eq!(chunk.source, "docs/x.md");
        }
    }

    #[test]
    fn test_crlf_and_utf8() {
        let doc = "# Título\r\nAcentuação: ã, õ, ç 🎮\r\n";
        let chunks = MarkdownChunker::default().chunk(doc, "u.md");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].heading_path, vec!["Título"]);
        assert_eq!(chunks[0].text, "Acentuação: ã, õ, ç 🎮");
    }
}
