//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token, which is
//! close enough for BPE tokenizers on source code and English text.

use codeloop_core::tier::ContextMode;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 bytes. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Approximate token budget of the project context for a mode.
pub fn budget_for(mode: ContextMode) -> usize {
    match mode {
        ContextMode::Minimal => 2_000,
        ContextMode::Smart => 8_000,
        ContextMode::Full => 32_000,
    }
}

/// Byte budget matching [`budget_for`].
pub fn char_budget_for(mode: ContextMode) -> usize {
    budget_for(mode) * 4
}
