//! Palaver extract crate - document text extraction and sentence splitting.
//!
//! Provides the `TextExtractor` trait for pulling plain text out of stored
//! document files, a `MockExtractor` for testing, and `FileExtractor` which
//! handles plain text (and unknown formats treated as text), OOXML Word
//! documents and slide decks, and PDFs behind the `pdf` feature.

pub mod extractor;
pub mod sentence;

use std::path::Path;

use palaver_core::error::PalaverError;
use palaver_core::types::DocumentKind;

pub use extractor::FileExtractor;
pub use sentence::split_sentences;

/// Service for extracting searchable text from a document file.
///
/// Implementations are synchronous; callers run them on a blocking thread.
/// An empty return value means the document contained no extractable text,
/// which callers treat as "nothing to enrich" rather than an error.
pub trait TextExtractor: Send + Sync {
    /// Extract all text from the document at `path`, using its declared kind.
    fn extract(&self, path: &Path, kind: DocumentKind) -> Result<String, PalaverError>;
}

/// Mock extractor for testing.
///
/// Returns deterministic text output without touching the filesystem.
#[derive(Debug, Clone)]
pub struct MockExtractor {
    response_text: String,
    fail: bool,
}

impl MockExtractor {
    /// Create a mock extractor with default response text.
    pub fn new() -> Self {
        Self::with_text("Mock extracted text. Long enough to survive the sentence filter.")
    }

    /// Create a mock extractor that returns the specified text.
    pub fn with_text(text: &str) -> Self {
        Self {
            response_text: text.to_string(),
            fail: false,
        }
    }

    /// Create a mock extractor that returns empty text (no text found).
    pub fn empty() -> Self {
        Self {
            response_text: String::new(),
            fail: false,
        }
    }

    /// Create a mock extractor whose extraction always fails.
    pub fn failing() -> Self {
        Self {
            response_text: String::new(),
            fail: true,
        }
    }
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TextExtractor for MockExtractor {
    fn extract(&self, _path: &Path, _kind: DocumentKind) -> Result<String, PalaverError> {
        if self.fail {
            return Err(PalaverError::Extraction(
                "Mock extractor configured to fail".to_string(),
            ));
        }
        Ok(self.response_text.clone())
    }
}
