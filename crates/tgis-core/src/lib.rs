//! # TGIS Adapter Core
//!
//! Domain types shared by the adapter: request identity, call metadata,
//! generation requests and responses, and the [`Engine`] contract the
//! adapter drives.

pub mod engine;
pub mod error;
pub mod request;
pub mod response;

pub use engine::{
    AdapterRequest, Engine, EngineHealth, EngineRequest, EngineStream, SharedEngine, Tokenization,
};
pub use error::{EngineError, Result};
pub use request::{
    BatchRequest, CORRELATION_HEADER, CallMetadata, DecodingMethod, GenerationParams,
    GenerationRequest, RequestId, TokenizeRequest,
};
pub use response::{
    GenerationDelta, GenerationOutput, ModelInfo, ModelKind, StopReason, TokenizeOutput,
};
