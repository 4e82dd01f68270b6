//! Markdown-aware chunking.
//!
//! This module turns a markdown document into retrievable passages that:
//! - Follow the heading hierarchy (each chunk knows its heading path)
//! - Keep fenced code blocks whole
//! - Stay near a target token size
//! - Cover every body line of the document exactly once

mod detection;
mod frontmatter;
mod metadata;
mod pipeline;

pub use detection::{classify_line, LineKind};
pub use frontmatter::{extract_frontmatter, Frontmatter, FrontmatterFormat};
pub use metadata::calculate_hash;
pub use pipeline::{ChunkConfig, MarkdownChunker};

use crate::tokens::estimate_tokens;
use serde::{Deserialize, Serialize};

/// Dominant kind of content in a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Prose,
    Code,
    List,
    Table,
    Frontmatter,
}

impl ContentKind {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prose => "prose",
            Self::Code => "code",
            Self::List => "list",
            Self::Table => "table",
            Self::Frontmatter => "frontmatter",
        }
    }
}

/// An immutable, independently retrievable passage of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Identifier, `<source>#<chunk_index>`
    pub id: String,

    /// Body text (heading lines are part of the span, not the text)
    pub text: String,

    /// Originating document identifier
    pub source: String,

    /// Heading titles from the document root to this chunk's section
    pub heading_path: Vec<String>,

    /// First line of the span (1-based, inclusive)
    pub start_line: usize,

    /// Last line of the span (1-based, inclusive)
    pub end_line: usize,

    /// Dominant content kind
    pub content_type: ContentKind,

    /// Estimated token count of `text`
    pub token_count: usize,

    /// Position within the document (0-indexed)
    pub chunk_index: usize,

    /// SHA-256 of `text`
    pub hash: String,

    /// Document frontmatter, carried on the first chunk only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontmatter: Option<Frontmatter>,
}

impl Chunk {
    /// Create a chunk, computing its id, token count and hash.
    pub fn new(
        source: &str,
        chunk_index: usize,
        text: String,
        heading_path: Vec<String>,
        lines: (usize, usize),
        content_type: ContentKind,
    ) -> Self {
        let token_count = estimate_tokens(&text);
        let hash = calculate_hash(&text);

        Self {
            id: format!("{}#{}", source, chunk_index),
            text,
            source: source.to_string(),
            heading_path,
            start_line: lines.0,
            end_line: lines.1.max(lines.0),
            content_type,
            token_count,
            chunk_index,
            hash,
            frontmatter: None,
        }
    }

    /// Heading path rendered for display, `"Root"` at top level.
    pub fn heading_label(&self) -> String {
        if self.heading_path.is_empty() {
            "Root".to_string()
        } else {
            self.heading_path.join(" > ")
        }
    }

    /// Text used for embedding and keyword indexing: headings, then body.
    pub fn search_text(&self) -> String {
        if self.heading_path.is_empty() {
            self.text.clone()
        } else {
            format!("{}\n{}", self.heading_path.join(" "), self.text)
        }
    }
}
