use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Model id reported by ModelInfo
    pub model_id: String,

    /// max_new_tokens applied when a request leaves it unset
    pub default_max_new_tokens: u32,

    /// Largest max_new_tokens a request may ask for
    pub max_new_tokens_limit: u32,

    /// Longest prompt + generation the model accepts
    pub max_sequence_length: u32,

    /// Largest number of prompts in one Generate call
    pub max_batch_size: usize,

    /// Directory holding LoRA adapters, one subdirectory per adapter id
    pub adapter_cache: Option<PathBuf>,

    /// Shut the server down after an engine-fatal failure
    pub terminate_on_engine_fatal: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            model_id: "echo".to_string(),
            default_max_new_tokens: 10,
            max_new_tokens_limit: 1024,
            max_sequence_length: 2048,
            max_batch_size: 64,
            adapter_cache: None,
            terminate_on_engine_fatal: false,
        }
    }
}

impl AdapterConfig {
    /// Load from configuration file
    pub fn load_from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"model_id": "granite", "max_batch_size": 4}}"#).unwrap();

        let config = AdapterConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.model_id, "granite");
        assert_eq!(config.max_batch_size, 4);
        assert_eq!(config.default_max_new_tokens, 10);
        assert!(config.adapter_cache.is_none());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = AdapterConfig::load_from_file(std::path::Path::new("/nonexistent/tgis.json"));
        assert!(result.is_err());
    }
}
