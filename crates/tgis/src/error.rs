//! Error types for tgis crate

use crate::adapters::AdapterError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TgisError {
    #[error("Engine error: {0}")]
    Engine(#[from] tgis_core::EngineError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, TgisError>;
