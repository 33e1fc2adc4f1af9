use tgis::{EngineError, TgisError};
use tonic::Status;

/// Map a failure the caller must see onto a gRPC status
pub fn to_status(error: TgisError) -> Status {
    let message = error.to_string();
    match error {
        TgisError::Validation(_)
        | TgisError::Adapter(_)
        | TgisError::Engine(EngineError::InvalidRequest(_) | EngineError::AdapterNotFound(_)) => {
            Status::invalid_argument(message)
        }
        TgisError::Engine(EngineError::Aborted(_)) => Status::cancelled(message),
        TgisError::Engine(EngineError::EngineDead(_)) => Status::unavailable(message),
        TgisError::Engine(EngineError::Backend(_)) | TgisError::Internal(_) => {
            Status::internal(message)
        }
    }
}
