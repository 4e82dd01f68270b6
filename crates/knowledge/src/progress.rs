//! Progress reporting for directory indexing.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Stage of a directory indexing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressPhase {
    /// Walking the directory tree
    Discover,
    /// Splitting a document into chunks
    Chunk,
    /// Embedding a document's chunks
    Embed,
    /// Publishing the rebuilt index
    Index,
}

impl ProgressPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discover => "discover",
            Self::Chunk => "chunk",
            Self::Embed => "embed",
            Self::Index => "index",
        }
    }
}

/// Progress event emitted while indexing.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub phase: ProgressPhase,

    /// Units done so far (files or chunks, depending on phase)
    pub current: u64,

    /// Total expected units, if known
    pub total: Option<u64>,

    /// Human-readable message
    pub message: String,

    /// Seconds since the reporter was created
    pub elapsed_secs: Option<f64>,
}

impl ProgressEvent {
    pub fn new(
        phase: ProgressPhase,
        current: u64,
        total: Option<u64>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            phase,
            current,
            total,
            message: message.into(),
            elapsed_secs: None,
        }
    }

    /// Percentage complete, when the total is known.
    pub fn percentage(&self) -> Option<f64> {
        self.total.map(|t| {
            if t > 0 {
                self.current as f64 / t as f64 * 100.0
            } else {
                0.0
            }
        })
    }

    /// Format as a single user-facing line.
    pub fn format_simple(&self) -> String {
        let progress = match self.total {
            Some(total) => format!("{}/{}", self.current, total),
            None => self.current.to_string(),
        };
        let pct = self
            .percentage()
            .map(|p| format!(" ({:.0}%)", p))
            .unwrap_or_default();

        format!("[{}] {}{} - {}", self.phase.as_str(), progress, pct, self.message)
    }
}

/// Callback for progress events.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Emits progress events through an optional callback.
#[derive(Clone)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    start_time: Instant,
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::noop()
    }
}

impl ProgressReporter {
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(callback),
            start_time: Instant::now(),
        }
    }

    /// A reporter that emits nothing.
    pub fn noop() -> Self {
        Self {
            callback: None,
            start_time: Instant::now(),
        }
    }

    pub fn emit(&self, event: ProgressEvent) {
        let Some(callback) = &self.callback else {
            return;
        };

        let elapsed = self.start_time.elapsed().as_secs_f64();
        let event = ProgressEvent {
            elapsed_secs: Some(elapsed),
            ..event
        };

        tracing::debug!(
            phase = event.phase.as_str(),
            current = event.current,
            total = ?event.total,
            message = %event.message,
            elapsed_secs = elapsed,
            "Progress event"
        );

        callback(event);
    }

    pub fn discover(&self, found: u64, root: &str) {
        self.emit(ProgressEvent::new(
            ProgressPhase::Discover,
            found,
            None,
            format!("{} documents under {}", found, root),
        ));
    }

    pub fn chunk(&self, current: u64, total: Option<u64>, source: &str, chunks: usize) {
        self.emit(ProgressEvent::new(
            ProgressPhase::Chunk,
            current,
            total,
            format!("{}: {} chunks", source, chunks),
        ));
    }

    pub fn embed(&self, current: u64, total: Option<u64>, source: &str, lexical_only: usize) {
        let message = if lexical_only == 0 {
            source.to_string()
        } else {
            format!("{} ({} chunks keyword-only)", source, lexical_only)
        };
        self.emit(ProgressEvent::new(
            ProgressPhase::Embed,
            current,
            total,
            message,
        ));
    }

    pub fn index(&self, sources: u64, chunks: usize) {
        self.emit(ProgressEvent::new(
            ProgressPhase::Index,
            sources,
            Some(sources),
            format!("{} chunks searchable", chunks),
        ));
    }
}
