//! Cross-module retrieval tests.
