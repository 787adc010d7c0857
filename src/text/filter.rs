//! Noise filters for recognized text.
//!
//! Recognition engines return a lot of debris along with real text: page
//! numbers, prices split from their labels, stray punctuation. Each filter is
//! a predicate over a single line; a line is dropped when any filter matches.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextFilter {
    /// Empty or whitespace-only lines.
    Blank,
    /// Lines made of digits, optionally with whitespace.
    DigitsOnly,
    /// Lines without a single letter, ideograph or digit.
    SymbolsOnly,
    /// Lines with at most one visible character.
    SingleChar,
}

impl TextFilter {
    /// True when the line is noise and should be discarded.
    pub fn rejects(&self, line: &str) -> bool {
        let trimmed = line.trim();
        match self {
            TextFilter::Blank => trimmed.is_empty(),
            TextFilter::DigitsOnly => {
                !trimmed.is_empty()
                    && trimmed
                        .chars()
                        .all(|c| c.is_numeric() || c.is_whitespace())
            }
            TextFilter::SymbolsOnly => {
                !trimmed.is_empty() && !trimmed.chars().any(|c| c.is_alphanumeric())
            }
            TextFilter::SingleChar => {
                trimmed.chars().filter(|c| !c.is_whitespace()).count() <= 1
            }
        }
    }
}

/// Apply the filters line by line and join the survivors with newlines.
/// Returns `None` when nothing usable is left.
pub fn apply_filters(text: &str, filters: &[TextFilter]) -> Option<String> {
    let kept: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !filters.iter().any(|f| f.rejects(line)))
        .collect();

    if kept.is_empty() {
        None
    } else {
        Some(kept.join("\n"))
    }
}
