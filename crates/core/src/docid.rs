//! `_id` representation and its encoding into the primary key tuple.

use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

use crate::error::JsonApiError;

/// The closed set of representations `_id` may take (§3).
#[derive(Debug, Clone, PartialEq)]
pub enum DocId {
    Text(String),
    Number(Decimal),
    Bool(bool),
    Null,
    Uuid(Uuid),
}

/// The one-byte tag used in the `key` column's `(tinyint, text)` tuple,
/// one value per [`DocId`] variant — stable, never renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DocIdTag {
    Text = 0,
    Number = 1,
    Bool = 2,
    Null = 3,
    Uuid = 4,
}

impl DocId {
    /// Derive a `DocId` from the document's `_id` field. Assigns a random
    /// UUID if `value` is `None` (the field was absent).
    pub fn from_json(value: Option<&JsonValue>) -> Result<Self, JsonApiError> {
        match value {
            None => Ok(DocId::Uuid(Uuid::new_v4())),
            Some(JsonValue::String(s)) => Ok(DocId::Text(s.clone())),
            Some(JsonValue::Bool(b)) => Ok(DocId::Bool(*b)),
            Some(JsonValue::Null) => Ok(DocId::Null),
            Some(JsonValue::Number(n)) => {
                let decimal = Decimal::from_str_exact(&n.to_string())
                    .map_err(|_| JsonApiError::shred_bad_docid_type("number"))?;
                Ok(DocId::Number(decimal))
            }
            Some(JsonValue::Array(_)) => Err(JsonApiError::shred_bad_docid_type("array")),
            Some(JsonValue::Object(_)) => Err(JsonApiError::shred_bad_docid_type("object")),
        }
    }

    /// Encode as the `(tinyint tag, text)` primary key tuple.
    pub fn to_key_tuple(&self) -> (DocIdTag, String) {
        match self {
            DocId::Text(s) => (DocIdTag::Text, s.clone()),
            DocId::Number(d) => (DocIdTag::Number, d.normalize().to_string()),
            DocId::Bool(b) => (DocIdTag::Bool, b.to_string()),
            DocId::Null => (DocIdTag::Null, String::new()),
            DocId::Uuid(u) => (DocIdTag::Uuid, u.to_string()),
        }
    }

    /// The canonical JSON representation written back into `doc_json`.
    pub fn to_json(&self) -> JsonValue {
        match self {
            DocId::Text(s) => JsonValue::String(s.clone()),
            DocId::Number(d) => serde_json::from_str::<serde_json::Number>(&d.normalize().to_string())
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DocId::Bool(b) => JsonValue::Bool(*b),
            DocId::Null => JsonValue::Null,
            DocId::Uuid(u) => JsonValue::String(u.to_string()),
        }
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_id_assigns_random_uuid() {
        let id = DocId::from_json(None).unwrap();
        assert!(matches!(id, DocId::Uuid(_)));
    }

    #[test]
    fn array_id_is_rejected() {
        let err = DocId::from_json(Some(&json!([1, 2]))).unwrap_err();
        assert_eq!(err.error_code(), crate::error::ErrorCode::ShredBadDocIdType);
    }

    #[test]
    fn object_id_is_rejected() {
        assert!(DocId::from_json(Some(&json!({"a": 1}))).is_err());
    }

    #[test]
    fn string_id_round_trips() {
        let id = DocId::from_json(Some(&json!("abc"))).unwrap();
        assert_eq!(id, DocId::Text("abc".to_string()));
        let (tag, text) = id.to_key_tuple();
        assert_eq!(tag, DocIdTag::Text);
        assert_eq!(text, "abc");
    }
}
