//! Real Whisper transcription via whisper-rs (whisper.cpp bindings).
//!
//! When compiled with the `whisper` feature, loads a GGML model file and
//! runs speech-to-text over WAV audio read with hound. Without the feature,
//! the engine is a stub that always reports the feature as missing.

#[cfg(feature = "whisper")]
use std::path::Path as StdPath;
use std::path::Path;

use palaver_core::error::PalaverError;

use crate::{SpeechConfig, SpeechToText};

/// Whisper.cpp-backed speech engine.
///
/// Holds a loaded model context reused across transcription calls.
pub struct WhisperSpeech {
    #[cfg(feature = "whisper")]
    ctx: whisper_rs::WhisperContext,
    config: SpeechConfig,
}

impl WhisperSpeech {
    /// Create a new engine by loading a GGML model file.
    ///
    /// # Errors
    /// Returns `PalaverError::Transcription` if the model file doesn't exist
    /// or fails to load.
    #[cfg(feature = "whisper")]
    pub fn new(config: SpeechConfig) -> Result<Self, PalaverError> {
        use whisper_rs::{WhisperContext, WhisperContextParameters};

        let model_path = &config.model_path;
        if !StdPath::new(model_path).exists() {
            return Err(PalaverError::Transcription(format!(
                "Whisper model file not found: {}",
                model_path
            )));
        }

        tracing::info!(model = %model_path, lang = %config.language, "Loading Whisper model");

        let params = WhisperContextParameters::default();
        let ctx = WhisperContext::new_with_params(model_path, params).map_err(|e| {
            PalaverError::Transcription(format!("Failed to load Whisper model: {}", e))
        })?;

        tracing::info!("Whisper model loaded successfully");
        Ok(Self { ctx, config })
    }

    /// Stub constructor when the `whisper` feature is disabled.
    #[cfg(not(feature = "whisper"))]
    pub fn new(config: SpeechConfig) -> Result<Self, PalaverError> {
        tracing::warn!("WhisperSpeech created without `whisper` feature — transcription will fail");
        Ok(Self { config })
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &SpeechConfig {
        &self.config
    }
}

// ---------------------------------------------------------------------------
// Real implementation (whisper feature enabled)
// ---------------------------------------------------------------------------

#[cfg(feature = "whisper")]
impl SpeechToText for WhisperSpeech {
    async fn transcribe(&self, path: &Path) -> Result<String, PalaverError> {
        use whisper_rs::{FullParams, SamplingStrategy};

        let samples_16k = read_wav_mono_16k(path)?;
        if samples_16k.is_empty() {
            return Err(PalaverError::Transcription(format!(
                "Audio file contains no samples: {}",
                path.display()
            )));
        }

        tracing::debug!(
            samples = samples_16k.len(),
            file = %path.display(),
            "Starting Whisper transcription"
        );

        let mut state = self.ctx.create_state().map_err(|e| {
            PalaverError::Transcription(format!("Failed to create Whisper state: {}", e))
        })?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

        let lang = if self.config.language == "auto" {
            None
        } else {
            Some(self.config.language.as_str())
        };
        params.set_language(lang);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_single_segment(false);

        state.full(params, &samples_16k).map_err(|e| {
            PalaverError::Transcription(format!("Whisper inference failed: {}", e))
        })?;

        let n_segments = state.full_n_segments().map_err(|e| {
            PalaverError::Transcription(format!("Failed to get segment count: {}", e))
        })?;

        let mut full_text = String::new();
        for i in 0..n_segments {
            let text = state.full_get_segment_text(i).map_err(|e| {
                PalaverError::Transcription(format!("Failed to get segment {} text: {}", i, e))
            })?;
            if !full_text.is_empty() {
                full_text.push(' ');
            }
            full_text.push_str(text.trim());
        }

        tracing::info!(
            segments = n_segments,
            text_len = full_text.len(),
            "Transcription complete"
        );

        Ok(full_text.trim().to_string())
    }
}

// ---------------------------------------------------------------------------
// Stub implementation (whisper feature disabled)
// ---------------------------------------------------------------------------

#[cfg(not(feature = "whisper"))]
impl SpeechToText for WhisperSpeech {
    async fn transcribe(&self, _path: &Path) -> Result<String, PalaverError> {
        Err(PalaverError::Transcription(
            "Whisper transcription requires the `whisper` feature to be enabled".into(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Audio input helpers
// ---------------------------------------------------------------------------

/// Read a WAV file, average channels to mono, and resample to 16 kHz.
#[cfg(feature = "whisper")]
fn read_wav_mono_16k(path: &Path) -> Result<Vec<f32>, PalaverError> {
    let mut reader = hound::WavReader::open(path).map_err(|e| {
        PalaverError::Transcription(format!("Failed to open {}: {}", path.display(), e))
    })?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| PalaverError::Transcription(format!("Bad WAV data: {}", e)))?,
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| PalaverError::Transcription(format!("Bad WAV data: {}", e)))?
        }
    };

    let channels = spec.channels as usize;
    let mono: Vec<f32> = if channels <= 1 {
        samples
    } else {
        samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    if spec.sample_rate == 16_000 {
        Ok(mono)
    } else {
        Ok(resample(&mono, spec.sample_rate, 16_000))
    }
}

/// Simple linear resampling from one sample rate to another.
///
/// Linear interpolation is sufficient for Whisper input, which is already
/// low-frequency speech.
#[cfg(feature = "whisper")]
fn resample(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || input.is_empty() {
        return input.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (input.len() as f64 / ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_idx = i as f64 * ratio;
        let idx0 = src_idx.floor() as usize;
        let idx1 = (idx0 + 1).min(input.len() - 1);
        let frac = (src_idx - idx0 as f64) as f32;

        let sample = input[idx0] * (1.0 - frac) + input[idx1] * frac;
        output.push(sample);
    }

    output
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
