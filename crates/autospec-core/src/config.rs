use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AutoSpecError, Result};

/// Top-level configuration for an AutoSpec session.
///
/// Loaded from `~/.autospec/config.toml` by default. Each section corresponds
/// to one stage of the retrieval pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoSpecConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
}

impl AutoSpecConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AutoSpecConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
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
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.ingest.chunk_size == 0 {
            return Err(AutoSpecError::Config(
                "ingest.chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.ingest.chunk_overlap >= self.ingest.chunk_size {
            return Err(AutoSpecError::Config(format!(
                "ingest.chunk_overlap ({}) must be smaller than ingest.chunk_size ({})",
                self.ingest.chunk_overlap, self.ingest.chunk_size
            )));
        }
        if self.embedding.batch_size == 0 {
            return Err(AutoSpecError::Config(
                "embedding.batch_size must be greater than zero".to_string(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(AutoSpecError::Config(
                "retrieval.top_k must be greater than zero".to_string(),
            ));
        }
        if self.conversation.max_turns == Some(0) {
            return Err(AutoSpecError::Config(
                "conversation.max_turns must be greater than zero when set".to_string(),
            ));
        }
        let timeouts = [
            ("ingest.parse_timeout_secs", self.ingest.parse_timeout_secs),
            ("embedding.timeout_secs", self.embedding.timeout_secs),
            ("llm.timeout_secs", self.llm.timeout_secs),
        ];
        for (name, secs) in timeouts {
            if secs == 0 {
                return Err(AutoSpecError::Config(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Document ingestion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Target chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// Upper bound on text extraction for a single document.
    pub parse_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 150,
            parse_timeout_secs: 60,
        }
    }
}

/// Which embedding backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// Sentence-transformer ONNX export run through ONNX Runtime.
    Onnx,
    /// Deterministic hash vectors. Retrieval quality is meaningless.
    Mock,
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    /// Directory holding `model.onnx` and `tokenizer.json`.
    pub model_dir: String,
    /// Number of chunk texts sent through the model per call.
    pub batch_size: usize,
    /// Token limit per input; longer inputs are truncated.
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Onnx,
            model_dir: "~/.autospec/models/all-MiniLM-L6-v2".to_string(),
            batch_size: 32,
            max_tokens: 256,
            timeout_secs: 60,
        }
    }
}

/// Retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks placed in the answer prompt.
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

/// Language model settings for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            model: "gemini-2.5-flash".to_string(),
            temperature: 0.0,
            api_key_env: "GOOGLE_API_KEY".to_string(),
            timeout_secs: 120,
        }
    }
}

/// How follow-up questions are turned into standalone retrieval queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CondenseStrategy {
    /// Ask the language model to rephrase the follow-up.
    Llm,
    /// Prepend the previous turn to the follow-up without a model call.
    Heuristic,
}

/// Conversation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub condense: CondenseStrategy,
    /// Sliding window over stored turns. `None` keeps every turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<usize>,
    /// Length of the source excerpts returned for display.
    pub excerpt_chars: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            condense: CondenseStrategy::Llm,
            max_turns: None,
            excerpt_chars: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = AutoSpecConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.ingest.chunk_size, 1000);
        assert_eq!(config.ingest.chunk_overlap, 150);
        assert_eq!(config.embedding.backend, EmbeddingBackend::Onnx);
        assert_eq!(config.embedding.batch_size, 32);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.llm.model, "gemini-2.5-flash");
        assert_eq!(config.llm.temperature, 0.0);
        assert_eq!(config.conversation.condense, CondenseStrategy::Llm);
        assert!(config.conversation.max_turns.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(
            r#"
[general]
log_level = "debug"

[ingest]
chunk_size = 800
chunk_overlap = 100

[embedding]
backend = "mock"

[retrieval]
top_k = 8

[llm]
base_url = "http://127.0.0.1:11434/v1"
model = "llama3.1"

[conversation]
condense = "heuristic"
max_turns = 10
"#,
        );

        let config = AutoSpecConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.ingest.chunk_size, 800);
        assert_eq!(config.ingest.chunk_overlap, 100);
        assert_eq!(config.ingest.parse_timeout_secs, 60);
        assert_eq!(config.embedding.backend, EmbeddingBackend::Mock);
        assert_eq!(config.retrieval.top_k, 8);
        assert_eq!(config.llm.model, "llama3.1");
        assert_eq!(config.llm.api_key_env, "GOOGLE_API_KEY");
        assert_eq!(config.conversation.condense, CondenseStrategy::Heuristic);
        assert_eq!(config.conversation.max_turns, Some(10));
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let file = create_temp_config("[retrieval]\ntop_k = 3\n");
        let config = AutoSpecConfig::load(file.path()).unwrap();
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.ingest.chunk_size, 1000);
        assert_eq!(config.conversation.excerpt_chars, 300);
    }

    #[test]
    fn test_load_rejects_overlap_not_smaller_than_size() {
        let file = create_temp_config("[ingest]\nchunk_size = 100\nchunk_overlap = 100\n");
        let err = AutoSpecConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, AutoSpecError::Config(_)));
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = AutoSpecConfig::default();
        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());

        let mut config = AutoSpecConfig::default();
        config.llm.timeout_secs = 0;
        assert!(config.validate().unwrap_err().to_string().contains("llm.timeout_secs"));

        let mut config = AutoSpecConfig::default();
        config.conversation.max_turns = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("this is not valid [[[ toml");
        let err = AutoSpecConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, AutoSpecError::Config(_)));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = AutoSpecConfig::load_or_default(Path::new("/nonexistent/autospec.toml"));
        assert_eq!(config.retrieval.top_k, 5);
    }

    #[test]
    fn test_save_creates_parent_dirs_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AutoSpecConfig::default();
        config.retrieval.top_k = 7;
        config.conversation.max_turns = Some(4);
        config.save(&path).unwrap();

        let loaded = AutoSpecConfig::load(&path).unwrap();
        assert_eq!(loaded.retrieval.top_k, 7);
        assert_eq!(loaded.conversation.max_turns, Some(4));
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let config: AutoSpecConfig = toml::from_str("").unwrap();
        assert_eq!(config.ingest.chunk_size, 1000);
        assert_eq!(config.embedding.max_tokens, 256);
        assert_eq!(config.llm.timeout_secs, 120);
    }
}
