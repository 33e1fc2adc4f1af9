//! Engine gateway contract for tgis-core
//!
//! The adapter never generates text itself. Everything it serves comes from
//! an [`Engine`]: a shared, process-wide handle injected at construction time.

use crate::{GenerationDelta, GenerationOutput, GenerationParams, ModelInfo, RequestId, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// A resolved LoRA adapter the engine should apply
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdapterRequest {
    /// Adapter name as supplied by the caller
    pub name: String,
    /// Unique, stable integer id for the engine's adapter slots
    pub id: u32,
    /// Directory holding the adapter weights
    pub path: PathBuf,
}

/// One prompt handed to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRequest {
    /// Engine-side id, used for [`Engine::abort`]
    pub request_id: RequestId,
    pub prompt: String,
    pub adapter: Option<AdapterRequest>,
    pub params: GenerationParams,
}

/// Lazily decoded output of a streaming generation
pub struct EngineStream {
    pub input_token_count: u32,
    pub deltas: BoxStream<'static, Result<GenerationDelta>>,
}

/// Tokenization result as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tokenization {
    pub token_count: u32,
    pub tokens: Vec<String>,
}

/// Liveness of the engine's background loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineHealth {
    pub errored: bool,
    pub running: bool,
}

impl Default for EngineHealth {
    fn default() -> Self {
        Self {
            errored: false,
            running: true,
        }
    }
}

impl EngineHealth {
    /// The loop has failed and is no longer serving anything
    pub fn is_dead(&self) -> bool {
        self.errored && !self.running
    }
}

/// Async boundary to a text-generation engine
#[async_trait]
pub trait Engine: Send + Sync {
    /// Generate a full completion for one prompt
    async fn generate(&self, request: EngineRequest) -> Result<GenerationOutput>;

    /// Generate incrementally; consuming the stream to the end is equivalent
    /// to [`Engine::generate`]
    async fn generate_stream(&self, request: EngineRequest) -> Result<EngineStream>;

    /// Count (and optionally return) the tokens of `text`
    async fn tokenize(&self, text: &str, return_tokens: bool) -> Result<Tokenization>;

    /// Abandon in-flight work for a request. Unknown ids are ignored.
    fn abort(&self, _request_id: &RequestId) {}

    fn health(&self) -> EngineHealth {
        EngineHealth::default()
    }

    fn model_info(&self) -> ModelInfo;
}

/// Arc-wrapped engine shared by all calls
pub type SharedEngine = Arc<dyn Engine>;
