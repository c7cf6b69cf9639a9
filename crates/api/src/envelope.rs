//! The wire envelope: a one-key command object in, and the uniform
//! `{ data, status, errors }` `CommandResult` envelope out (§4.7, §6).
//!
//! HTTP status is never part of this type — the embedding HTTP surface
//! always answers 200; callers distinguish failures by `errorCode` alone.

use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use thiserror::Error;

use jsonapi_core::JsonApiError;
use jsonapi_operations::{CommandStatus, OperationOutput};

use crate::resolve::DataShape;

/// One `{ "<tag>": { ...params } }`-shaped request body, parsed from
/// exactly one top-level key (§4.7 step 1).
#[derive(Debug, Clone)]
pub struct CommandEnvelope {
    pub tag: String,
    pub params: JsonValue,
}

impl CommandEnvelope {
    /// Parse already-decoded JSON.
    pub fn from_value(raw: JsonValue) -> Result<Self, PipelineError> {
        let obj = match raw {
            JsonValue::Object(obj) => obj,
            _ => return Err(PipelineError::constraint_violation("command body must be a JSON object")),
        };
        let mut iter = obj.into_iter();
        let (tag, params) = match iter.next() {
            Some(first) => first,
            None => return Err(PipelineError::constraint_violation("command body must not be empty")),
        };
        if iter.next().is_some() {
            return Err(PipelineError::constraint_violation(
                "command body must have exactly one top-level key",
            ));
        }
        Ok(Self { tag, params })
    }

    /// Parse raw request bytes/text — the HTTP surface's entry point.
    /// Malformed JSON surfaces as `JsonParseException`, an empty body as
    /// `ConstraintViolationException` (§6).
    pub fn from_str(raw: &str) -> Result<Self, PipelineError> {
        if raw.trim().is_empty() {
            return Err(PipelineError::constraint_violation("request body must not be empty"));
        }
        let value: JsonValue =
            serde_json::from_str(raw).map_err(|e| PipelineError::MalformedJson(e.to_string()))?;
        Self::from_value(value)
    }
}

/// Failures that abort command resolution before an [`Operation`] even
/// exists to execute — malformed bodies, unresolvable tags, and
/// bean-validation failures on command parameters.
///
/// [`Operation`]: crate::resolve::Operation
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("{0}")]
    MalformedJson(String),
    #[error("{0}")]
    ConstraintViolation(String),
    #[error("Could not resolve type id '{0}'")]
    UnknownCommand(String),
}

impl PipelineError {
    pub fn constraint_violation(message: impl Into<String>) -> Self {
        PipelineError::ConstraintViolation(message.into())
    }

    /// The stable, Stargate-style error code for a pre-execution failure.
    /// Distinct from [`jsonapi_core::ErrorCode`] — these never reach an
    /// operation executor, so they fall outside the closed operational
    /// taxonomy (§7) the same way Jackson-level parse/bind failures sit
    /// outside a service's own error kinds.
    pub fn error_code(&self) -> &'static str {
        match self {
            PipelineError::MalformedJson(_) => "JSON_PARSE_ERROR",
            PipelineError::ConstraintViolation(_) => "CONSTRAINT_VIOLATION",
            PipelineError::UnknownCommand(_) => "UNKNOWN_COMMAND",
        }
    }

    pub fn exception_class(&self) -> &'static str {
        match self {
            PipelineError::MalformedJson(_) => "JsonParseException",
            PipelineError::ConstraintViolation(_) => "ConstraintViolationException",
            PipelineError::UnknownCommand(_) => "JsonMappingException",
        }
    }
}

/// One entry of the envelope's `errors` array — every error carries
/// `message`, `errorCode`, and `exceptionClass` (§4.7).
#[derive(Debug, Clone, Serialize)]
pub struct ErrorObject {
    pub message: String,
    #[serde(rename = "errorCode")]
    pub error_code: String,
    #[serde(rename = "exceptionClass")]
    pub exception_class: String,
}

impl From<&JsonApiError> for ErrorObject {
    fn from(err: &JsonApiError) -> Self {
        Self {
            message: err.to_string(),
            error_code: err.error_code().as_str().to_string(),
            exception_class: err.exception_class().to_string(),
        }
    }
}

impl From<&PipelineError> for ErrorObject {
    fn from(err: &PipelineError) -> Self {
        Self {
            message: err.to_string(),
            error_code: err.error_code().to_string(),
            exception_class: err.exception_class().to_string(),
        }
    }
}

/// The `data` section's shape: absent for commands that only report
/// `status` (e.g. `insertOne`), a single possibly-null `document` for
/// `findOne`-family commands, or a `documents` array (plus continuation
/// token) for `find`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DataSection {
    Document {
        document: Option<JsonValue>,
    },
    Documents {
        documents: Vec<JsonValue>,
        #[serde(rename = "nextPageState", skip_serializing_if = "Option::is_none")]
        next_page_state: Option<String>,
    },
}

/// The always-200 response envelope (§4.7).
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommandResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<DataSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JsonValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorObject>,
}

impl CommandResult {
    /// Fold a successful operation's output into the envelope, shaping
    /// `data` according to the resolved operation's [`DataShape`] — the
    /// output alone can't distinguish "findOne matched nothing" from
    /// "this command never returns a document".
    pub fn from_output(output: OperationOutput, shape: DataShape) -> Self {
        let data = match shape {
            DataShape::None => None,
            DataShape::SingleDocument => Some(DataSection::Document {
                document: output.data_document,
            }),
            DataShape::ManyDocuments => Some(DataSection::Documents {
                documents: output.data_documents.unwrap_or_default(),
                next_page_state: output.next_page_state,
            }),
        };
        Self {
            data,
            status: status_json(&output.status),
            errors: output.errors.iter().map(ErrorObject::from).collect(),
        }
    }

    pub fn from_error(err: &JsonApiError) -> Self {
        Self {
            data: None,
            status: None,
            errors: vec![ErrorObject::from(err)],
        }
    }

    pub fn from_pipeline_error(err: &PipelineError) -> Self {
        Self {
            data: None,
            status: None,
            errors: vec![ErrorObject::from(err)],
        }
    }
}

fn status_json(status: &CommandStatus) -> Option<JsonValue> {
    let mut map = serde_json::Map::new();
    if let Some(ok) = status.ok {
        map.insert("ok".to_string(), json!(ok));
    }
    if let Some(ids) = &status.inserted_ids {
        map.insert("insertedIds".to_string(), json!(ids));
    }
    if let Some(v) = status.matched_count {
        map.insert("matchedCount".to_string(), json!(v));
    }
    if let Some(v) = status.modified_count {
        map.insert("modifiedCount".to_string(), json!(v));
    }
    if let Some(v) = status.deleted_count {
        map.insert("deletedCount".to_string(), json!(v));
    }
    if let Some(v) = &status.upserted_id {
        map.insert("upsertedId".to_string(), v.clone());
    }
    if let Some(v) = status.count {
        map.insert("count".to_string(), json!(v));
    }
    if let Some(v) = &status.collections {
        map.insert("collections".to_string(), json!(v));
    }
    if let Some(v) = status.more_data {
        map.insert("moreData".to_string(), json!(v));
    }
    if map.is_empty() {
        None
    } else {
        Some(JsonValue::Object(map))
    }
}
