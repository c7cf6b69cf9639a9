//! Store-driver failure kinds and their mapping onto [`JsonApiError`].

use jsonapi_core::JsonApiError;
use thiserror::Error;

/// Failures the store executor boundary can produce. Operation executors
/// map every variant one-to-one onto an infrastructure [`JsonApiError`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("inflight request limit reached")]
    Overloaded,

    #[error("store connection/session error: {0}")]
    Connection(String),

    #[error("CQL statement preparation failed: {0}")]
    Prepare(String),

    #[error("CQL execution failed: {0}")]
    Execution(String),

    #[error("cancelled by caller")]
    Cancelled,
}

impl From<StoreError> for JsonApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout { elapsed_ms } => JsonApiError::RequestTimeout { elapsed_ms },
            StoreError::Overloaded => JsonApiError::ServerBusy,
            StoreError::Connection(msg) | StoreError::Prepare(msg) | StoreError::Execution(msg) => {
                JsonApiError::internal(msg)
            }
            StoreError::Cancelled => JsonApiError::internal("operation cancelled"),
        }
    }
}
