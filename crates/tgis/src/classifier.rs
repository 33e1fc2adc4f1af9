//! Failure classification for call handling
//!
//! Every dispatcher operation funnels its failure through
//! [`ErrorClassifier::handle`] exactly once. Engine-fatal failures are logged
//! once and the call ends without a result. Everything else goes back to the
//! caller unchanged.

use crate::{Result, TgisError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use strum::Display;
use tgis_core::{EngineError, RequestId, SharedEngine};
use tokio::sync::Notify;
use tracing::{debug, error};

/// Closed set of failure kinds. Every error variant maps to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// The engine's background loop is dead
    EngineFatal,
    /// Bad input or a failure confined to this call
    RequestScoped,
    /// Anything not recognized as either of the above
    Unknown,
}

/// What the classifier did with a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Outcome {
    /// Logged, call ends without a result
    Suppressed,
    /// Returned to the caller unchanged
    Reraised,
    /// Logged, call ends without a result, server shutdown requested
    Terminated,
}

/// The classifier's view of one failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    pub outcome: Outcome,
}

/// Identity of the call being classified, for logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub request_id: RequestId,
    pub method: &'static str,
}

impl CallContext {
    pub fn new(request_id: RequestId, method: &'static str) -> Self {
        Self { request_id, method }
    }
}

/// One-shot request for the server to stop accepting calls
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    triggered: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Later calls are no-ops.
    pub fn trigger(&self) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            self.notify.notify_one();
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Resolves once [`ShutdownSignal::trigger`] has been called
    pub async fn triggered(&self) {
        if self.is_triggered() {
            return;
        }
        self.notify.notified().await;
    }
}

#[derive(Clone)]
pub struct ErrorClassifier {
    engine: SharedEngine,
    shutdown: Option<ShutdownSignal>,
}

impl ErrorClassifier {
    pub fn new(engine: SharedEngine) -> Self {
        Self {
            engine,
            shutdown: None,
        }
    }

    /// Trigger `shutdown` whenever an engine-fatal failure is handled
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Map a failure onto its kind.
    ///
    /// A dead engine makes every failure engine-fatal, whatever surfaced it.
    pub fn classify(&self, error: &TgisError) -> ErrorKind {
        if self.engine.health().is_dead() {
            return ErrorKind::EngineFatal;
        }

        match error {
            TgisError::Engine(EngineError::EngineDead(_)) => ErrorKind::EngineFatal,
            TgisError::Engine(
                EngineError::InvalidRequest(_)
                | EngineError::AdapterNotFound(_)
                | EngineError::Aborted(_),
            ) => ErrorKind::RequestScoped,
            TgisError::Validation(_) | TgisError::Adapter(_) => ErrorKind::RequestScoped,
            TgisError::Engine(EngineError::Backend(_)) | TgisError::Internal(_) => {
                ErrorKind::Unknown
            }
        }
    }

    /// Resolve a failure: `Ok` when it was suppressed, `Err` with the very
    /// same error when the caller must see it.
    pub fn handle(&self, error: TgisError, context: &CallContext) -> Result<ErrorRecord> {
        let kind = self.classify(&error);
        match kind {
            ErrorKind::EngineFatal => {
                error!(
                    request_id = %context.request_id,
                    method = context.method,
                    "{}",
                    error
                );
                let outcome = match &self.shutdown {
                    Some(shutdown) => {
                        shutdown.trigger();
                        Outcome::Terminated
                    }
                    None => Outcome::Suppressed,
                };
                Ok(ErrorRecord {
                    kind,
                    message: error.to_string(),
                    outcome,
                })
            }
            ErrorKind::RequestScoped | ErrorKind::Unknown => {
                debug!(
                    request_id = %context.request_id,
                    method = context.method,
                    "Propagating {} error: {}",
                    kind,
                    error
                );
                Err(error)
            }
        }
    }
}
