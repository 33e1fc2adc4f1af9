//! TGIS-compatible generation adapter
//!
//! Sits between a gRPC surface and a text-generation engine. The
//! [`Dispatcher`] runs every call through the same lifecycle: correlation,
//! validation, adapter lookup, aggregation, and failure classification.

pub mod adapters;
pub mod aggregator;
pub mod classifier;
pub mod config;
pub mod correlation;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod validation;

// Re-export core types
pub use tgis_core::{
    BatchRequest, CallMetadata, CORRELATION_HEADER, DecodingMethod, Engine, EngineError,
    EngineHealth, EngineRequest, GenerationDelta, GenerationOutput, GenerationParams,
    GenerationRequest, ModelInfo, ModelKind, RequestId, SharedEngine, StopReason,
    TokenizeOutput, TokenizeRequest,
};

pub use adapters::{AdapterError, AdapterStore};
pub use aggregator::ResponseStream;
pub use classifier::{ErrorClassifier, ErrorKind, ErrorRecord, Outcome, ShutdownSignal};
pub use config::AdapterConfig;
pub use correlation::{ABSENT_CORRELATION_MARKER, CorrelationAssigner, IdSource};
pub use dispatcher::{CallOutcome, Dispatcher, DispatcherBuilder};
pub use engine::EchoEngine;
pub use error::{Result, TgisError};
