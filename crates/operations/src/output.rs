//! The shape every operation executor returns. The command pipeline
//! (`jsonapi-api`) folds this into the wire `CommandResult` envelope
//! (§4.7) — `status` fields map directly onto the envelope's `status`
//! object, `data_document`/`data_documents` onto its `data` object.

use serde_json::Value as JsonValue;

use jsonapi_core::JsonApiError;

/// The `status` object of a `CommandResult` — every field is optional;
/// only the ones a given operation populates are serialized by the
/// command pipeline.
#[derive(Debug, Clone, Default)]
pub struct CommandStatus {
    pub ok: Option<u8>,
    pub inserted_ids: Option<Vec<JsonValue>>,
    pub matched_count: Option<u64>,
    pub modified_count: Option<u64>,
    pub deleted_count: Option<u64>,
    pub upserted_id: Option<JsonValue>,
    pub count: Option<u64>,
    pub collections: Option<Vec<String>>,
    pub more_data: Option<bool>,
}

impl CommandStatus {
    pub fn ok() -> Self {
        Self {
            ok: Some(1),
            ..Default::default()
        }
    }
}

/// What one operation executor produces. `errors` carries per-document
/// failures that don't abort the whole command (e.g. one conflicting
/// document inside an `insertMany` batch) — the command pipeline appends
/// these to the envelope's `errors` array alongside any top-level failure.
#[derive(Debug, Clone, Default)]
pub struct OperationOutput {
    pub status: CommandStatus,
    pub data_document: Option<JsonValue>,
    pub data_documents: Option<Vec<JsonValue>>,
    pub next_page_state: Option<String>,
    pub errors: Vec<JsonApiError>,
}

impl OperationOutput {
    pub fn ack() -> Self {
        Self {
            status: CommandStatus::ok(),
            ..Default::default()
        }
    }

    pub fn inserted_ids(ids: Vec<JsonValue>) -> Self {
        Self {
            status: CommandStatus {
                ok: Some(1),
                inserted_ids: Some(ids),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn collections(names: Vec<String>) -> Self {
        Self {
            status: CommandStatus {
                ok: Some(1),
                collections: Some(names),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn count(value: u64, more_data: bool) -> Self {
        Self {
            status: CommandStatus {
                ok: Some(1),
                count: Some(value),
                more_data: Some(more_data),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn modify_result(matched: u64, modified: u64, upserted_id: Option<JsonValue>) -> Self {
        Self {
            status: CommandStatus {
                ok: Some(1),
                matched_count: Some(matched),
                modified_count: Some(modified),
                upserted_id,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn delete_result(deleted: u64) -> Self {
        Self {
            status: CommandStatus {
                ok: Some(1),
                deleted_count: Some(deleted),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn with_document(mut self, doc: Option<JsonValue>) -> Self {
        self.data_document = doc;
        self
    }

    pub fn with_documents(mut self, docs: Vec<JsonValue>, next_page_state: Option<String>) -> Self {
        self.data_documents = Some(docs);
        self.next_page_state = next_page_state;
        self
    }
}
