//! Error types for tgis-core

use thiserror::Error;

/// Failures raised by an [`Engine`](crate::Engine) implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The engine's background loop has stopped; every in-flight and future
    /// request is affected.
    #[error("Engine loop is dead: {0}")]
    EngineDead(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Adapter not found: {0}")]
    AdapterNotFound(String),

    #[error("Request aborted: {0}")]
    Aborted(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
