//! The closed error taxonomy.
//!
//! [`ErrorCode`] is the stable, wire-visible identifier set from the
//! specification (§7): every failure the system can produce maps to
//! exactly one of these. [`JsonApiError`] is the `thiserror`-derived Rust
//! error type carrying the structured context for each failure; its
//! [`JsonApiError::error_code`] and [`JsonApiError::exception_class`]
//! methods are what the command pipeline's envelope builder calls to
//! populate `{ message, errorCode, exceptionClass }` (§4.7, §7).
//!
//! HTTP status is never part of this type — the envelope is always 200;
//! callers distinguish failures by `errorCode` alone.

use thiserror::Error;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, JsonApiError>;

/// The closed, stable set of error identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // ---- Input ----
    ShredBadDocumentType,
    ShredBadDocIdType,
    UnsupportedFilterDataType,
    UnsupportedUpdateOperationPath,
    InvalidCollectionName,
    // ---- Resource ----
    NamespaceDoesNotExist,
    CollectionNotExist,
    TooManyCollections,
    TooManyIndexes,
    // ---- Concurrency ----
    ConcurrentUpdateLimitExceeded,
    DocumentAlreadyExists,
    // ---- Infrastructure ----
    RequestTimeout,
    ServerBusy,
    InternalServerError,
}

impl ErrorCode {
    /// The stable wire identifier, exactly as named in the specification.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ShredBadDocumentType => "SHRED_BAD_DOCUMENT_TYPE",
            ErrorCode::ShredBadDocIdType => "SHRED_BAD_DOCID_TYPE",
            ErrorCode::UnsupportedFilterDataType => "UNSUPPORTED_FILTER_DATA_TYPE",
            ErrorCode::UnsupportedUpdateOperationPath => "UNSUPPORTED_UPDATE_OPERATION_PATH",
            ErrorCode::InvalidCollectionName => "INVALID_COLLECTION_NAME",
            ErrorCode::NamespaceDoesNotExist => "NAMESPACE_DOES_NOT_EXIST",
            ErrorCode::CollectionNotExist => "COLLECTION_NOT_EXIST",
            ErrorCode::TooManyCollections => "TOO_MANY_COLLECTIONS",
            ErrorCode::TooManyIndexes => "TOO_MANY_INDEXES",
            ErrorCode::ConcurrentUpdateLimitExceeded => "CONCURRENT_UPDATE_LIMIT_EXCEEDED",
            ErrorCode::DocumentAlreadyExists => "DOCUMENT_ALREADY_EXISTS",
            ErrorCode::RequestTimeout => "REQUEST_TIMEOUT",
            ErrorCode::ServerBusy => "SERVER_BUSY",
            ErrorCode::InternalServerError => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured error type for every fallible operation in the system.
#[derive(Debug, Clone, Error)]
pub enum JsonApiError {
    #[error("Bad document type to shred: expected a JSON object, got {actual_type}")]
    ShredBadDocumentType { actual_type: String },

    #[error("Bad _id type to shred: _id must be a string, number, boolean, null, or UUID, got {actual_type}")]
    ShredBadDocIdType { actual_type: String },

    #[error("Unsupported filter data type for field '{field}': {reason}")]
    UnsupportedFilterDataType { field: String, reason: String },

    #[error("Unsupported update operation path '{path}': {reason}")]
    UnsupportedUpdateOperationPath { path: String, reason: String },

    #[error("Invalid collection name '{collection}': {reason}")]
    InvalidCollectionName { collection: String, reason: String },

    #[error("Namespace '{namespace}' does not exist")]
    NamespaceDoesNotExist { namespace: String },

    #[error("Collection '{collection}' does not exist in namespace '{namespace}'")]
    CollectionNotExist { namespace: String, collection: String },

    #[error("Too many collections in namespace '{namespace}': limit is {limit}")]
    TooManyCollections { namespace: String, limit: usize },

    #[error("Too many indexes for database: budget is {limit}, requested {requested}")]
    TooManyIndexes { limit: usize, requested: usize },

    #[error("Concurrent update limit exceeded for document '{id}' in '{collection}' after {attempts} attempts")]
    ConcurrentUpdateLimitExceeded {
        collection: String,
        id: String,
        attempts: u32,
    },

    #[error("Document already exists: '{id}' in '{collection}'")]
    DocumentAlreadyExists { collection: String, id: String },

    #[error("Request timed out after {elapsed_ms}ms")]
    RequestTimeout { elapsed_ms: u64 },

    #[error("Server busy: inflight request limit reached")]
    ServerBusy,

    #[error("Internal server error: {message}")]
    InternalServerError { message: String },
}

impl JsonApiError {
    pub fn shred_bad_document_type(actual_type: impl Into<String>) -> Self {
        JsonApiError::ShredBadDocumentType {
            actual_type: actual_type.into(),
        }
    }

    pub fn shred_bad_docid_type(actual_type: impl Into<String>) -> Self {
        JsonApiError::ShredBadDocIdType {
            actual_type: actual_type.into(),
        }
    }

    pub fn unsupported_filter_data_type(field: impl Into<String>, reason: impl Into<String>) -> Self {
        JsonApiError::UnsupportedFilterDataType {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported_update_operation_path(
        path: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        JsonApiError::UnsupportedUpdateOperationPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_collection_name(collection: impl Into<String>, reason: impl Into<String>) -> Self {
        JsonApiError::InvalidCollectionName {
            collection: collection.into(),
            reason: reason.into(),
        }
    }

    pub fn namespace_does_not_exist(namespace: impl Into<String>) -> Self {
        JsonApiError::NamespaceDoesNotExist {
            namespace: namespace.into(),
        }
    }

    pub fn collection_not_exist(namespace: impl Into<String>, collection: impl Into<String>) -> Self {
        JsonApiError::CollectionNotExist {
            namespace: namespace.into(),
            collection: collection.into(),
        }
    }

    pub fn concurrent_update_limit_exceeded(
        collection: impl Into<String>,
        id: impl Into<String>,
        attempts: u32,
    ) -> Self {
        JsonApiError::ConcurrentUpdateLimitExceeded {
            collection: collection.into(),
            id: id.into(),
            attempts,
        }
    }

    pub fn document_already_exists(collection: impl Into<String>, id: impl Into<String>) -> Self {
        JsonApiError::DocumentAlreadyExists {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        JsonApiError::InternalServerError {
            message: message.into(),
        }
    }

    /// The stable error code for the response envelope.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            JsonApiError::ShredBadDocumentType { .. } => ErrorCode::ShredBadDocumentType,
            JsonApiError::ShredBadDocIdType { .. } => ErrorCode::ShredBadDocIdType,
            JsonApiError::UnsupportedFilterDataType { .. } => ErrorCode::UnsupportedFilterDataType,
            JsonApiError::UnsupportedUpdateOperationPath { .. } => {
                ErrorCode::UnsupportedUpdateOperationPath
            }
            JsonApiError::InvalidCollectionName { .. } => ErrorCode::InvalidCollectionName,
            JsonApiError::NamespaceDoesNotExist { .. } => ErrorCode::NamespaceDoesNotExist,
            JsonApiError::CollectionNotExist { .. } => ErrorCode::CollectionNotExist,
            JsonApiError::TooManyCollections { .. } => ErrorCode::TooManyCollections,
            JsonApiError::TooManyIndexes { .. } => ErrorCode::TooManyIndexes,
            JsonApiError::ConcurrentUpdateLimitExceeded { .. } => {
                ErrorCode::ConcurrentUpdateLimitExceeded
            }
            JsonApiError::DocumentAlreadyExists { .. } => ErrorCode::DocumentAlreadyExists,
            JsonApiError::RequestTimeout { .. } => ErrorCode::RequestTimeout,
            JsonApiError::ServerBusy => ErrorCode::ServerBusy,
            JsonApiError::InternalServerError { .. } => ErrorCode::InternalServerError,
        }
    }

    /// The Java-flavoured exception class tag the envelope carries
    /// alongside `errorCode` (§6, §4.7) — kept as a closed mapping rather
    /// than derived, since it is part of the wire contract external
    /// clients already parse against.
    pub fn exception_class(&self) -> &'static str {
        match self {
            JsonApiError::ShredBadDocumentType { .. }
            | JsonApiError::ShredBadDocIdType { .. }
            | JsonApiError::UnsupportedFilterDataType { .. }
            | JsonApiError::UnsupportedUpdateOperationPath { .. }
            | JsonApiError::InvalidCollectionName { .. } => "ConstraintViolationException",
            JsonApiError::NamespaceDoesNotExist { .. }
            | JsonApiError::CollectionNotExist { .. }
            | JsonApiError::TooManyCollections { .. }
            | JsonApiError::TooManyIndexes { .. } => "JsonApiException",
            JsonApiError::ConcurrentUpdateLimitExceeded { .. }
            | JsonApiError::DocumentAlreadyExists { .. } => "JsonApiException",
            JsonApiError::RequestTimeout { .. } => "RequestTimeoutException",
            JsonApiError::ServerBusy => "ServerBusyException",
            JsonApiError::InternalServerError { .. } => "InternalServerErrorException",
        }
    }

    /// Whether retrying the owning operation (e.g. an `updateOne` CAS
    /// loop) is ever meaningful for this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            JsonApiError::DocumentAlreadyExists { .. } | JsonApiError::RequestTimeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_round_trips_to_stable_string() {
        assert_eq!(ErrorCode::ShredBadDocumentType.as_str(), "SHRED_BAD_DOCUMENT_TYPE");
        assert_eq!(
            ErrorCode::ConcurrentUpdateLimitExceeded.as_str(),
            "CONCURRENT_UPDATE_LIMIT_EXCEEDED"
        );
    }

    #[test]
    fn shred_bad_document_type_message_matches_scenario() {
        let err = JsonApiError::shred_bad_document_type("array");
        assert!(err.to_string().starts_with("Bad document type to shred"));
    }

    #[test]
    fn exception_class_mapping_is_stable() {
        let err = JsonApiError::invalid_collection_name("c", "already exists with different settings");
        assert_eq!(err.exception_class(), "ConstraintViolationException");
        assert_eq!(err.error_code(), ErrorCode::InvalidCollectionName);
    }
}
