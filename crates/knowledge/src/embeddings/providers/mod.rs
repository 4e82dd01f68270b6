//! Bundled embedding providers.

pub mod ollama;
pub mod trigram;
