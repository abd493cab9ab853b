//! Palaver whisper crate - speech-to-text engine abstraction.
//!
//! Provides a trait-based interface for transcribing a stored audio file
//! into plain text, a configuration type, and a mock implementation for
//! testing without loading a real Whisper model. The real whisper.cpp
//! backend lives in `whisper_engine` behind the `whisper` feature.

pub mod whisper_engine;

use std::path::Path;

use palaver_core::error::PalaverError;

pub use whisper_engine::WhisperSpeech;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the speech-to-text engine.
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// Path to the Whisper GGML model file.
    pub model_path: String,
    /// Language code for transcription (e.g., "en"), or "auto" to detect.
    pub language: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            model_path: String::new(),
            language: "auto".to_string(),
        }
    }
}

// =============================================================================
// Trait
// =============================================================================

/// Service for transcribing a recorded audio file to text.
///
/// Implementations resolve the file reference, run recognition, and return
/// the transcript. An empty transcript means no speech was recognized; the
/// caller decides how to represent that.
pub trait SpeechToText: Send + Sync {
    /// Transcribe the audio file at `path` into plain text.
    fn transcribe(
        &self,
        path: &Path,
    ) -> impl std::future::Future<Output = Result<String, PalaverError>> + Send;
}

/// Object-safe version of [`SpeechToText`] for dynamic dispatch, with a
/// blanket implementation over every `SpeechToText`.
pub trait DynSpeechToText: Send + Sync {
    fn transcribe_boxed<'a>(
        &'a self,
        path: &'a Path,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<String, PalaverError>> + Send + 'a>,
    >;
}

impl<T: SpeechToText> DynSpeechToText for T {
    fn transcribe_boxed<'a>(
        &'a self,
        path: &'a Path,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<String, PalaverError>> + Send + 'a>,
    > {
        Box::pin(self.transcribe(path))
    }
}

// =============================================================================
// Mock implementation
// =============================================================================

/// Mock speech engine that returns a configured transcript.
///
/// Used for testing the enrichment pipeline without a model. `empty()`
/// simulates audio with no recognizable speech and `failing()` simulates an
/// engine error.
#[derive(Debug, Clone)]
pub struct MockSpeech {
    transcript: Option<String>,
}

impl MockSpeech {
    /// Mock that recognizes a fixed transcript.
    pub fn new() -> Self {
        Self::with_text("mock transcription of the recording")
    }

    /// Mock that recognizes the given transcript.
    pub fn with_text(text: &str) -> Self {
        Self {
            transcript: Some(text.to_string()),
        }
    }

    /// Mock that recognizes nothing (empty transcript).
    pub fn empty() -> Self {
        Self {
            transcript: Some(String::new()),
        }
    }

    /// Mock whose engine always fails.
    pub fn failing() -> Self {
        Self { transcript: None }
    }
}

impl Default for MockSpeech {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechToText for MockSpeech {
    async fn transcribe(&self, path: &Path) -> Result<String, PalaverError> {
        if path.as_os_str().is_empty() {
            return Err(PalaverError::Transcription(
                "Empty audio file reference".to_string(),
            ));
        }
        match &self.transcript {
            Some(text) => Ok(text.clone()),
            None => Err(PalaverError::Transcription(
                "Mock engine configured to fail".to_string(),
            )),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_transcribe_basic() {
        let engine = MockSpeech::with_text("hello from the meeting");
        let text = engine.transcribe(Path::new("/audio/a.wav")).await.unwrap();
        assert_eq!(text, "hello from the meeting");
    }

    #[tokio::test]
    async fn test_mock_transcribe_empty_result() {
        let engine = MockSpeech::empty();
        let text = engine.transcribe(Path::new("/audio/a.wav")).await.unwrap();
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn test_mock_transcribe_failure() {
        let engine = MockSpeech::failing();
        let result = engine.transcribe(Path::new("/audio/a.wav")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_transcribe_empty_path() {
        let engine = MockSpeech::new();
        let result = engine.transcribe(Path::new("")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_dyn_speech_blanket_impl() {
        let boxed: Box<dyn DynSpeechToText> = Box::new(MockSpeech::with_text("boxed"));
        let text = boxed
            .transcribe_boxed(Path::new("/audio/a.wav"))
            .await
            .unwrap();
        assert_eq!(text, "boxed");
    }

    #[test]
    fn test_speech_config_default() {
        let config = SpeechConfig::default();
        assert!(config.model_path.is_empty());
        assert_eq!(config.language, "auto");
    }
}
