use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PalaverError, Result};

/// Top-level configuration for the Palaver backend.
///
/// Loaded from `~/.palaver/config.toml` by default. Each section corresponds
/// to one subsystem; every field has a default so a partial file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PalaverConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub speech: SpeechSettings,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

impl PalaverConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PalaverConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file does not
    /// exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| PalaverError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Path of the SQLite database inside the data directory.
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.general.data_dir).join("palaver.db")
    }

    /// Path of the message-granularity vector file.
    pub fn message_index_path(&self) -> PathBuf {
        PathBuf::from(&self.general.data_dir).join("messages.vec")
    }

    /// Path of the message-granularity id-map sidecar.
    pub fn message_map_path(&self) -> PathBuf {
        PathBuf::from(&self.general.data_dir).join("messages.map.json")
    }

    /// Path of the sentence-granularity vector file.
    pub fn sentence_index_path(&self) -> PathBuf {
        PathBuf::from(&self.general.data_dir).join("sentences.vec")
    }

    /// Path of the sentence-granularity id-map sidecar.
    pub fn sentence_map_path(&self) -> PathBuf {
        PathBuf::from(&self.general.data_dir).join("sentences.map.json")
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for SQLite and the vector index files.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.palaver/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8400,
        }
    }
}

/// Embedding model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Directory containing `model.onnx` and `tokenizer.json`. Empty means
    /// no model is configured and the deterministic mock is used instead.
    pub model_dir: String,
    /// Expected vector dimensionality (all-MiniLM-L6-v2 produces 384).
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_dir: String::new(),
            dimensions: 384,
        }
    }
}

/// Speech-to-text engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechSettings {
    /// Path to the Whisper GGML model file.
    pub model_path: String,
    /// Language code, or "auto" to detect.
    pub language: String,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            model_path: String::new(),
            language: "auto".to_string(),
        }
    }
}

/// Document extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Sentence fragments shorter than this are discarded.
    pub min_sentence_len: usize,
    /// Extracted text is truncated to this many bytes before being stored
    /// on the content item for keyword search.
    pub stored_text_cap: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_sentence_len: 15,
            stored_text_cap: 4000,
        }
    }
}

/// Hybrid search stage limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum keyword-stage results.
    pub keyword_limit: usize,
    /// Maximum semantic message-stage results.
    pub semantic_limit: usize,
    /// Maximum semantic sentence-stage results.
    pub sentence_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            keyword_limit: 30,
            semantic_limit: 20,
            sentence_limit: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PalaverConfig::default();
        assert_eq!(config.embedding.dimensions, 384);
        assert_eq!(config.extraction.min_sentence_len, 15);
        assert_eq!(config.extraction.stored_text_cap, 4000);
        assert_eq!(config.search.keyword_limit, 30);
        assert_eq!(config.search.semantic_limit, 20);
        assert_eq!(config.search.sentence_limit, 10);
        assert_eq!(config.server.port, 8400);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = PalaverConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = PalaverConfig::default();
        config.server.port = 9100;
        config.speech.language = "en".to_string();
        config.save(&path).unwrap();

        let loaded = PalaverConfig::load(&path).unwrap();
        assert_eq!(loaded.server.port, 9100);
        assert_eq!(loaded.speech.language, "en");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = 9999\n").unwrap();

        let config = PalaverConfig::load(&path).unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.search.keyword_limit, 30);
    }

    #[test]
    fn test_index_paths_derive_from_data_dir() {
        let mut config = PalaverConfig::default();
        config.general.data_dir = "/var/lib/palaver".to_string();

        assert_eq!(
            config.message_index_path(),
            PathBuf::from("/var/lib/palaver/messages.vec")
        );
        assert_eq!(
            config.sentence_map_path(),
            PathBuf::from("/var/lib/palaver/sentences.map.json")
        );
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/palaver/palaver.db")
        );
    }
}
