//! Sentence splitting for sentence-granularity indexing.
//!
//! Extracted document text is split into sentence-like fragments on
//! sentence-ending punctuation or blank-line boundaries; fragments shorter
//! than the minimum length are discarded.

use std::sync::OnceLock;

use regex::Regex;

/// Default minimum fragment length in bytes.
pub const DEFAULT_MIN_LEN: usize = 15;

fn blank_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{2,}").expect("static regex"))
}

fn boundary_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // A sentence-ending punctuation mark followed by whitespace.
    RE.get_or_init(|| Regex::new(r"[.!?]\s+").expect("static regex"))
}

/// Split `text` into sentence fragments, keeping only those at least
/// `min_len` bytes long after trimming.
///
/// Splits occur after `.`, `!`, or `?` followed by whitespace (the
/// punctuation stays on the fragment) and at blank-line boundaries.
pub fn split_sentences(text: &str, min_len: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut sentences = Vec::new();
    for block in blank_line_regex().split(text) {
        let mut start = 0;
        for boundary in boundary_regex().find_iter(block) {
            // Keep the punctuation mark ([.!?] is one byte) on the fragment.
            let end = boundary.start() + 1;
            push_fragment(&mut sentences, &block[start..end], min_len);
            start = boundary.end();
        }
        push_fragment(&mut sentences, &block[start..], min_len);
    }
    sentences
}

fn push_fragment(out: &mut Vec<String>, fragment: &str, min_len: usize) {
    let trimmed = fragment.trim();
    if trimmed.len() >= min_len {
        out.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_on_punctuation() {
        let text = "The quarterly revenue grew significantly in Q3. Operating costs stayed flat overall. Margins improved by two points.";
        let sentences = split_sentences(text, DEFAULT_MIN_LEN);
        assert_eq!(
            sentences,
            vec![
                "The quarterly revenue grew significantly in Q3.",
                "Operating costs stayed flat overall.",
                "Margins improved by two points.",
            ]
        );
    }

    #[test]
    fn test_split_on_blank_lines() {
        let text = "First paragraph without punctuation end\n\nSecond paragraph also long enough";
        let sentences = split_sentences(text, DEFAULT_MIN_LEN);
        assert_eq!(
            sentences,
            vec![
                "First paragraph without punctuation end",
                "Second paragraph also long enough",
            ]
        );
    }

    #[test]
    fn test_short_fragments_discarded() {
        let text = "Too short. This fragment is comfortably long enough to keep. No. Yes indeed it is kept here.";
        let sentences = split_sentences(text, DEFAULT_MIN_LEN);
        assert_eq!(
            sentences,
            vec![
                "This fragment is comfortably long enough to keep.",
                "Yes indeed it is kept here.",
            ]
        );
    }

    #[test]
    fn test_question_and_exclamation_boundaries() {
        let text = "Did revenue grow this quarter? It certainly did grow! Remarkable result overall.";
        let sentences = split_sentences(text, DEFAULT_MIN_LEN);
        assert_eq!(sentences.len(), 3);
        assert!(sentences[0].ends_with('?'));
        assert!(sentences[1].ends_with('!'));
    }

    #[test]
    fn test_empty_input() {
        assert!(split_sentences("", DEFAULT_MIN_LEN).is_empty());
    }

    #[test]
    fn test_single_newline_not_a_boundary() {
        let text = "A line that continues\nonto the next line before ending.";
        let sentences = split_sentences(text, DEFAULT_MIN_LEN);
        assert_eq!(sentences.len(), 1);
        assert!(sentences[0].contains('\n'));
    }

    #[test]
    fn test_trailing_text_without_punctuation() {
        let text = "Complete sentence here. Trailing fragment with no terminator";
        let sentences = split_sentences(text, DEFAULT_MIN_LEN);
        assert_eq!(
            sentences,
            vec![
                "Complete sentence here.",
                "Trailing fragment with no terminator",
            ]
        );
    }
}
