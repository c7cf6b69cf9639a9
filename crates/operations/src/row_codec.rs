//! Translate a [`WritableShreddedDocument`] into the store row it writes,
//! and translate a stored row back into `(doc_json, tx_id)` for reads.

use std::collections::HashMap;

use jsonapi_core::JsonApiError;
use jsonapi_shredder::WritableShreddedDocument;
use jsonapi_store::{BoundValue, Row};
use serde_json::Value as JsonValue;

pub mod columns {
    pub const KEY_TAG: &str = "key_tag";
    pub const KEY_TEXT: &str = "key_text";
    pub const TX_ID: &str = "tx_id";
    pub const DOC_JSON: &str = "doc_json";
    pub const EXIST_KEYS: &str = "exist_keys";
    pub const ARRAY_SIZE: &str = "array_size";
    pub const ARRAY_CONTAINS: &str = "array_contains";
    pub const QUERY_BOOL_VALUES: &str = "query_bool_values";
    pub const QUERY_DBL_VALUES: &str = "query_dbl_values";
    pub const QUERY_TEXT_VALUES: &str = "query_text_values";
    pub const QUERY_TIMESTAMP_VALUES: &str = "query_timestamp_values";
    pub const QUERY_NULL_VALUES: &str = "query_null_values";
    pub const QUERY_VECTOR_VALUE: &str = "query_vector_value";

    pub const ALL: &[&str] = &[
        KEY_TAG,
        KEY_TEXT,
        TX_ID,
        DOC_JSON,
        EXIST_KEYS,
        ARRAY_SIZE,
        ARRAY_CONTAINS,
        QUERY_BOOL_VALUES,
        QUERY_DBL_VALUES,
        QUERY_TEXT_VALUES,
        QUERY_TIMESTAMP_VALUES,
        QUERY_NULL_VALUES,
        QUERY_VECTOR_VALUE,
    ];

    /// The eight columns every collection gets a `StorageAttachedIndex`
    /// on regardless of vector settings — `CreateCollection` derives its
    /// index count from this list's length rather than keeping a
    /// hand-maintained constant in sync with it (spec Open Question (c),
    /// resolved in DESIGN.md).
    pub const INDEXABLE: &[&str] = &[
        EXIST_KEYS,
        ARRAY_SIZE,
        ARRAY_CONTAINS,
        QUERY_BOOL_VALUES,
        QUERY_DBL_VALUES,
        QUERY_TEXT_VALUES,
        QUERY_TIMESTAMP_VALUES,
        QUERY_NULL_VALUES,
    ];
}

/// Build the row a successful write persists.
pub fn to_row(shredded: &WritableShreddedDocument, tx_id: i64) -> Row {
    let (tag, text) = shredded.id.to_key_tuple();
    let mut map = HashMap::new();
    map.insert(columns::KEY_TAG.to_string(), BoundValue::TinyInt(tag as i8));
    map.insert(columns::KEY_TEXT.to_string(), BoundValue::Text(text));
    map.insert(columns::TX_ID.to_string(), BoundValue::TimestampMillis(tx_id));
    map.insert(columns::DOC_JSON.to_string(), BoundValue::Text(shredded.doc_json.clone()));
    map.insert(
        columns::EXIST_KEYS.to_string(),
        BoundValue::SetText(shredded.exist_keys.clone()),
    );
    map.insert(
        columns::ARRAY_SIZE.to_string(),
        BoundValue::MapTextUsize(shredded.array_size.clone()),
    );
    map.insert(
        columns::ARRAY_CONTAINS.to_string(),
        BoundValue::SetText(shredded.array_contains.clone()),
    );
    map.insert(
        columns::QUERY_BOOL_VALUES.to_string(),
        BoundValue::MapTextBool(shredded.query_bool_values.clone()),
    );
    map.insert(
        columns::QUERY_DBL_VALUES.to_string(),
        BoundValue::MapTextDecimal(shredded.query_dbl_values.clone()),
    );
    map.insert(
        columns::QUERY_TEXT_VALUES.to_string(),
        BoundValue::MapTextText(shredded.query_text_values.clone()),
    );
    map.insert(
        columns::QUERY_TIMESTAMP_VALUES.to_string(),
        BoundValue::MapTextTimestamp(shredded.query_timestamp_values.clone()),
    );
    map.insert(
        columns::QUERY_NULL_VALUES.to_string(),
        BoundValue::SetText(shredded.query_null_values.clone()),
    );
    map.insert(
        columns::QUERY_VECTOR_VALUE.to_string(),
        match &shredded.query_vector_value {
            Some(vector) => BoundValue::Vector(vector.clone()),
            None => BoundValue::Null,
        },
    );
    Row { columns: map }
}

/// Flatten a row into the fixed column-order parameter list a CQL
/// `INSERT`/`UPDATE` statement binds positionally — the first two entries
/// are always `(key_tag, key_text)`, the convention
/// [`jsonapi_store::memory::InMemoryStoreExecutor`] relies on to locate a
/// document by primary key.
pub fn to_params(row: &Row) -> Vec<BoundValue> {
    columns::ALL
        .iter()
        .map(|name| row.get(name).cloned().unwrap_or(BoundValue::Null))
        .collect()
}

/// Re-hydrate `(doc_json, tx_id)` from a stored row — the read path never
/// needs the index columns, only the canonical document and its version.
pub fn rehydrate(row: &Row) -> Result<(JsonValue, i64), JsonApiError> {
    let doc_json = match row.get(columns::DOC_JSON) {
        Some(BoundValue::Text(s)) => s,
        _ => return Err(JsonApiError::internal("row missing doc_json column")),
    };
    let tx_id = match row.get(columns::TX_ID) {
        Some(BoundValue::TimestampMillis(t)) => *t,
        _ => return Err(JsonApiError::internal("row missing tx_id column")),
    };
    let doc: JsonValue = serde_json::from_str(doc_json)
        .map_err(|e| JsonApiError::internal(format!("stored doc_json is not valid JSON: {e}")))?;
    Ok((doc, tx_id))
}
