//! Utility functions for `quipbot`.
//!
//! Character-count helpers. Every length limit in this crate counts Unicode
//! scalar values, never bytes, so truncation must land on a char boundary.

/// Ellipsis marker appended to clamped text.
pub const ELLIPSIS: &str = "...";

/// The first `max_chars` characters of `s`, borrowed.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Clamp `s` to at most `max_chars` characters.
///
/// Oversized text keeps its first `max_chars - 3` characters followed by
/// `"..."`, so the result is exactly `max_chars` long. Limits too small to
/// hold the marker fall back to a plain cut.
///
/// # Examples
/// ```ignore
/// use quipbot::util::clamp_with_ellipsis;
///
/// assert_eq!(clamp_with_ellipsis("hello", 10), "hello");
/// assert_eq!(clamp_with_ellipsis("hello world", 8), "hello...");
/// assert_eq!(clamp_with_ellipsis("😀😀😀😀😀", 4), "😀...");
/// ```
pub fn clamp_with_ellipsis(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    if max_chars <= ELLIPSIS.len() {
        return truncate_chars(s, max_chars).to_string();
    }
    format!(
        "{}{ELLIPSIS}",
        truncate_chars(s, max_chars - ELLIPSIS.len())
    )
}
