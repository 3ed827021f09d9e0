//! Token estimation utilities.
//!
//! Uses a character-class heuristic: wide characters (anything outside
//! ASCII, e.g. Hangul or CJK) cost 1.5 tokens each, everything else costs
//! 0.25 tokens (~4 characters per token). The sum is rounded up.

/// Estimate the token count for a string.
///
/// `ceil(wide × 1.5 + other × 0.25)`, computed in integer quarters.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let (wide, other) = text.chars().fold((0usize, 0usize), |(w, o), c| {
        if c.is_ascii() { (w, o + 1) } else { (w + 1, o) }
    });
    (wide * 6 + other).div_ceil(4)
}

/// Estimate tokens for several lines joined with `\n`.
pub fn estimate_lines_tokens<S: AsRef<str>>(lines: &[S]) -> usize {
    let joined: Vec<&str> = lines.iter().map(AsRef::as_ref).collect();
    estimate_tokens(&joined.join("\n"))
}
