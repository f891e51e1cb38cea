//! Memory agent configuration management

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main memory agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryAgentConfig {
    /// Model configuration
    #[serde(default)]
    pub model: ModelConfig,

    /// Conversation and memory behaviour
    #[serde(default)]
    pub agent: AgentConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

impl MemoryAgentConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))
    }
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Fully specified model name, `provider/model`
    pub name: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Custom base URL
    pub base_url: Option<String>,

    /// Maximum tokens per completion
    pub max_tokens: u32,

    /// Sampling temperature (provider default when unset)
    pub temperature: Option<f32>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "anthropic/claude-3-5-sonnet-latest".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: None,
            max_tokens: 1024,
            temperature: None,
            timeout_secs: 60,
        }
    }
}

impl ModelConfig {
    /// Provider and model parsed from `name`
    pub fn spec(&self) -> ModelSpec {
        split_model_and_provider(&self.name)
    }

    /// Resolve the API key from the environment.
    ///
    /// Tries the configured variable as written, then its UPPER_CASE form.
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .or_else(|_| std::env::var(self.api_key_env.to_uppercase()))
            .ok()
            .filter(|key| !key.is_empty())
    }
}

/// Provider/model pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    /// Provider name, if the model was fully specified
    pub provider: Option<String>,
    /// Model identifier
    pub model: String,
}

/// Split `provider/model` at the first `/`.
///
/// A name without `/` has no provider and is taken whole as the model.
pub fn split_model_and_provider(fully_specified_name: &str) -> ModelSpec {
    match fully_specified_name.split_once('/') {
        Some((provider, model)) => ModelSpec {
            provider: Some(provider.to_string()),
            model: model.to_string(),
        },
        None => ModelSpec {
            provider: None,
            model: fully_specified_name.to_string(),
        },
    }
}

/// Where memories are retrieved from when building the system prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalScope {
    /// Only the category the recent conversation is classified into
    #[default]
    Category,
    /// Every category for the user
    User,
}

/// Conversation and memory behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Number of trailing messages the categorizer reads
    pub category_window: usize,

    /// Model calls allowed per turn (or per resume) before giving up
    pub max_model_rounds: usize,

    /// Memories placed in the system prompt
    pub memory_search_limit: usize,

    /// Retrieval scope for the system prompt
    pub retrieval: RetrievalScope,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            category_window: 3,
            max_model_rounds: 5,
            memory_search_limit: 10,
            retrieval: RetrievalScope::Category,
        }
    }
}

/// Checkpoint backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointBackend {
    /// Process lifetime only
    Memory,
    /// JSON files under `checkpoint_dir`
    #[default]
    File,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Checkpoint backend
    pub checkpoints: CheckpointBackend,

    /// Directory for file checkpoints
    pub checkpoint_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = dirs_next::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("memory-agent");

        Self {
            checkpoints: CheckpointBackend::File,
            checkpoint_dir: base.join("checkpoints"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = MemoryAgentConfig::default();
        assert_eq!(config.agent.category_window, 3);
        assert_eq!(config.agent.retrieval, RetrievalScope::Category);
        assert_eq!(config.storage.checkpoints, CheckpointBackend::File);
        assert!(config.storage.checkpoint_dir.ends_with("memory-agent/checkpoints"));
    }

    #[test]
    fn test_split_model_and_provider() {
        assert_eq!(
            split_model_and_provider("anthropic/claude-3-5-sonnet-latest"),
            ModelSpec {
                provider: Some("anthropic".to_string()),
                model: "claude-3-5-sonnet-latest".to_string(),
            }
        );
        assert_eq!(
            split_model_and_provider("gpt-4o"),
            ModelSpec {
                provider: None,
                model: "gpt-4o".to_string(),
            }
        );
        let nested = split_model_and_provider("openrouter/meta/llama-3");
        assert_eq!(nested.provider.as_deref(), Some("openrouter"));
        assert_eq!(nested.model, "meta/llama-3");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: MemoryAgentConfig = toml::from_str(
            r#"
            [agent]
            category_window = 5
            retrieval = "user"

            [storage]
            checkpoints = "memory"
            "#,
        )
        .unwrap();

        assert_eq!(config.agent.category_window, 5);
        assert_eq!(config.agent.max_model_rounds, 5);
        assert_eq!(config.agent.retrieval, RetrievalScope::User);
        assert_eq!(config.storage.checkpoints, CheckpointBackend::Memory);
        assert_eq!(config.model.api_key_env, "ANTHROPIC_API_KEY");
    }

    #[test]
    fn test_from_file_and_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[model]\nname = \"anthropic/claude-3-5-haiku-latest\"").unwrap();

        let config = MemoryAgentConfig::from_file(file.path()).unwrap();
        assert_eq!(config.model.spec().model, "claude-3-5-haiku-latest");

        let rendered = config.to_toml().unwrap();
        let reparsed: MemoryAgentConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(reparsed.model.name, config.model.name);
    }

    #[test]
    fn test_from_missing_file() {
        let err = MemoryAgentConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_resolve_api_key_missing() {
        let config = ModelConfig {
            api_key_env: "MEMORY_AGENT_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..Default::default()
        };
        assert!(config.resolve_api_key().is_none());
    }
}
