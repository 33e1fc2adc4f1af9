//! Per-call request identity
//!
//! Every inbound call gets exactly one [`RequestId`]: the caller's
//! `x-correlation-id` when it sent a non-empty one, a fresh UUID otherwise.

use std::sync::Arc;
use tgis_core::{CallMetadata, RequestId};
use tracing::info;

/// Marker logged in place of a correlation id the caller did not send
pub const ABSENT_CORRELATION_MARKER: &str = "None";

/// Source of fresh ids for calls without a correlation header
pub type IdSource = Arc<dyn Fn() -> uuid::Uuid + Send + Sync>;

#[derive(Clone)]
pub struct CorrelationAssigner {
    id_source: IdSource,
}

impl CorrelationAssigner {
    /// Assigner generating random v4 UUIDs
    pub fn new() -> Self {
        Self::with_id_source(Arc::new(uuid::Uuid::new_v4))
    }

    /// Assigner drawing fresh ids from `id_source`
    pub fn with_id_source(id_source: IdSource) -> Self {
        Self { id_source }
    }

    /// Resolve the identity of one call and log its entry.
    pub fn assign(&self, metadata: &CallMetadata) -> RequestId {
        let correlation_id = metadata.correlation_id();
        let request_id = match correlation_id {
            Some(value) => RequestId::from_string(value),
            None => RequestId::from_uuid((self.id_source)()),
        };

        info!(
            "Request received: request_id={} correlation_id={}",
            request_id,
            correlation_id.unwrap_or(ABSENT_CORRELATION_MARKER)
        );
        request_id
    }
}

impl Default for CorrelationAssigner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tgis_core::CORRELATION_HEADER;

    #[test]
    fn test_header_passes_through_verbatim() {
        let assigner = CorrelationAssigner::new();
        let metadata = CallMetadata::new().with(CORRELATION_HEADER, "not a uuid at all");
        assert_eq!(assigner.assign(&metadata).as_str(), "not a uuid at all");
    }

    #[test]
    fn test_missing_header_uses_id_source() {
        let fixed = uuid::Uuid::from_u128(0x1234_5678_9abc_def0_1234_5678_9abc_def0);
        let assigner = CorrelationAssigner::with_id_source(Arc::new(move || fixed));

        let id = assigner.assign(&CallMetadata::new());
        assert_eq!(id.as_str(), "123456789abcdef0123456789abcdef0");
    }

    #[test]
    fn test_empty_header_generates() {
        let assigner = CorrelationAssigner::new();
        let metadata = CallMetadata::new().with(CORRELATION_HEADER, "");
        let first = assigner.assign(&metadata);
        let second = assigner.assign(&metadata);
        assert_eq!(first.as_str().len(), 32);
        assert_ne!(first, second);
    }
}
