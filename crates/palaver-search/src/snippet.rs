//! Snippet extraction for search results.
//!
//! Shows a window of text around the first case-insensitive occurrence of
//! the query, with ellipsis markers when the window is truncated. Pure
//! semantic matches have no literal occurrence and get a plain prefix of
//! the matched text instead.

/// Default snippet window width in bytes.
pub const SNIPPET_WINDOW: usize = 80;

/// Extract a display snippet from `text` around the first occurrence of
/// `query`.
///
/// With a literal occurrence: roughly `window` bytes centred on the match,
/// `...` added on whichever sides were cut. Without one: the first
/// `window * 2` bytes unmodified. All slicing lands on UTF-8 boundaries.
pub fn extract_snippet(text: &str, query: &str, window: usize) -> String {
    if text.is_empty() {
        return String::new();
    }

    let lower_text = text.to_lowercase();
    let lower_query = query.to_lowercase();
    let found = if lower_query.is_empty() {
        None
    } else {
        lower_text.find(&lower_query)
    };

    let Some(idx) = found else {
        let end = floor_boundary(text, (window * 2).min(text.len()));
        return text[..end].to_string();
    };

    // The index comes from the lowercased copy; clamp onto a boundary of
    // the original in case lowercasing changed byte lengths.
    let idx = floor_boundary(text, idx.min(text.len()));
    let start = floor_boundary(text, idx.saturating_sub(window / 2));
    let end = ceil_boundary(text, (idx + query.len() + window / 2).min(text.len()));

    let mut snippet = String::new();
    if start > 0 {
        snippet.push_str("...");
    }
    snippet.push_str(&text[start..end]);
    if end < text.len() {
        snippet.push_str("...");
    }
    snippet
}

fn floor_boundary(text: &str, mut i: usize) -> usize {
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_boundary(text: &str, mut i: usize) -> usize {
    while i < text.len() && !text.is_char_boundary(i) {
        i += 1;
    }
    i
}
