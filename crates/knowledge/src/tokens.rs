//! Approximate token counting.
//!
//! The estimate is a fixed ratio of Unicode scalar values, which is fast and
//! stable across calls. It is not model-exact, but the chunker and the context
//! optimizer both use it, so the budgets they compare agree with each other.

/// Estimated tokens per character.
pub const TOKENS_PER_CHAR: f64 = 0.25;

/// Estimate the token count of `text`.
///
/// Empty text is zero tokens; any non-empty text counts as at least one.
pub fn estimate_tokens(text: &str) -> usize {
    estimate_tokens_for_chars(text.chars().count())
}

/// Estimate the token count of a text of `chars` characters.
pub fn estimate_tokens_for_chars(chars: usize) -> usize {
    if chars == 0 {
        return 0;
    }
    ((chars as f64 * TOKENS_PER_CHAR) as usize).max(1)
}
