//! LoRA adapter lookup
//!
//! Adapters live in a cache directory, one subdirectory per adapter id, each
//! holding an `adapter_config.json`. Resolved adapters are kept for the life
//! of the process so the engine sees a stable integer id per adapter.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tgis_core::AdapterRequest;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

const ADAPTER_CONFIG_FILE: &str = "adapter_config.json";
const SUPPORTED_PEFT_TYPE: &str = "LORA";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    #[error("Adapter not found: {0}")]
    NotFound(String),

    #[error("Invalid adapter id: {0}")]
    InvalidId(String),

    #[error("Adapter {0} requested but no adapter cache is configured")]
    NoCache(String),

    #[error("Adapter {name} has unsupported type {peft_type}")]
    Unsupported { name: String, peft_type: String },

    #[error("Invalid adapter config for {name}: {reason}")]
    InvalidConfig { name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, AdapterError>;

#[derive(Debug, Deserialize)]
struct AdapterFileConfig {
    peft_type: String,
}

/// Resolves caller-supplied adapter ids to engine adapter requests
#[derive(Debug, Clone)]
pub struct AdapterStore {
    cache_dir: Option<PathBuf>,
    adapters: Arc<RwLock<HashMap<String, AdapterRequest>>>,
    next_id: Arc<AtomicU32>,
}

impl AdapterStore {
    /// Store backed by `cache_dir`; `None` rejects every adapter id
    pub fn new(cache_dir: Option<PathBuf>) -> Self {
        Self {
            cache_dir,
            adapters: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU32::new(1)),
        }
    }

    /// Resolve an optional adapter id
    pub async fn resolve(&self, adapter_id: Option<&str>) -> Result<Option<AdapterRequest>> {
        let Some(name) = adapter_id.filter(|id| !id.is_empty()) else {
            return Ok(None);
        };

        if let Some(adapter) = self.adapters.read().await.get(name) {
            return Ok(Some(adapter.clone()));
        }

        let mut adapters = self.adapters.write().await;
        if let Some(adapter) = adapters.get(name) {
            return Ok(Some(adapter.clone()));
        }

        let path = self.locate(name)?;
        Self::check_config(name, &path).await?;

        let adapter = AdapterRequest {
            name: name.to_string(),
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            path,
        };
        info!(
            "Loaded adapter {} (id {}) from {}",
            adapter.name,
            adapter.id,
            adapter.path.display()
        );
        adapters.insert(name.to_string(), adapter.clone());
        Ok(Some(adapter))
    }

    /// Number of adapters resolved so far
    pub async fn len(&self) -> usize {
        self.adapters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn locate(&self, name: &str) -> Result<PathBuf> {
        let cache_dir = self
            .cache_dir
            .as_ref()
            .ok_or_else(|| AdapterError::NoCache(name.to_string()))?;

        if name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(AdapterError::InvalidId(name.to_string()));
        }

        let path = cache_dir.join(name);
        if !path.is_dir() {
            return Err(AdapterError::NotFound(name.to_string()));
        }
        Ok(path)
    }

    async fn check_config(name: &str, path: &Path) -> Result<()> {
        let config_path = path.join(ADAPTER_CONFIG_FILE);
        debug!("Reading adapter config {}", config_path.display());

        let content = tokio::fs::read_to_string(&config_path)
            .await
            .map_err(|_| AdapterError::NotFound(name.to_string()))?;
        let config: AdapterFileConfig =
            serde_json::from_str(&content).map_err(|e| AdapterError::InvalidConfig {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        if !config.peft_type.eq_ignore_ascii_case(SUPPORTED_PEFT_TYPE) {
            return Err(AdapterError::Unsupported {
                name: name.to_string(),
                peft_type: config.peft_type,
            });
        }
        Ok(())
    }
}

impl Default for AdapterStore {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_adapter(root: &Path, name: &str, config: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(ADAPTER_CONFIG_FILE), config).unwrap();
    }

    #[tokio::test]
    async fn test_no_adapter_requested() {
        let store = AdapterStore::new(None);
        assert_eq!(store.resolve(None).await.unwrap(), None);
        assert_eq!(store.resolve(Some("")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_adapter_without_cache() {
        let store = AdapterStore::new(None);
        let result = store.resolve(Some("my-lora")).await;
        assert!(matches!(result, Err(AdapterError::NoCache(_))));
    }

    #[tokio::test]
    async fn test_resolve_and_cache() {
        let root = tempfile::tempdir().unwrap();
        write_adapter(root.path(), "lora-a", r#"{"peft_type": "LORA", "r": 8}"#);
        write_adapter(root.path(), "lora-b", r#"{"peft_type": "lora"}"#);
        let store = AdapterStore::new(Some(root.path().to_path_buf()));

        let a = store.resolve(Some("lora-a")).await.unwrap().unwrap();
        let b = store.resolve(Some("lora-b")).await.unwrap().unwrap();
        let a_again = store.resolve(Some("lora-a")).await.unwrap().unwrap();

        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(a, a_again);
        assert_eq!(a.path, root.path().join("lora-a"));
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_rejects_bad_adapters() {
        let root = tempfile::tempdir().unwrap();
        write_adapter(root.path(), "prompt", r#"{"peft_type": "PROMPT_TUNING"}"#);
        write_adapter(root.path(), "broken", "not json");
        std::fs::create_dir_all(root.path().join("empty")).unwrap();
        let store = AdapterStore::new(Some(root.path().to_path_buf()));

        assert!(matches!(
            store.resolve(Some("missing")).await,
            Err(AdapterError::NotFound(_))
        ));
        assert!(matches!(
            store.resolve(Some("empty")).await,
            Err(AdapterError::NotFound(_))
        ));
        assert!(matches!(
            store.resolve(Some("../etc")).await,
            Err(AdapterError::InvalidId(_))
        ));
        assert!(matches!(
            store.resolve(Some("prompt")).await,
            Err(AdapterError::Unsupported { .. })
        ));
        assert!(matches!(
            store.resolve(Some("broken")).await,
            Err(AdapterError::InvalidConfig { .. })
        ));
        assert!(store.is_empty().await);
    }
}
