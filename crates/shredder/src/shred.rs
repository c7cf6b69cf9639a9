//! Shredding: walk a JSON document and emit the fixed column bundle
//! described below.

use std::collections::{BTreeMap, BTreeSet};

use jsonapi_core::dotpath::{DotPath, PathSegment};
use jsonapi_core::{DocId, JsonApiError};
use rust_decimal::Decimal;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::hash::stable_hash;

/// Reserved top-level field carrying an optional similarity-search vector
/// for the document, mirrored out of normal indexing the same way `_id`
/// is — it lands in its own column (`query_vector_value`), never in the
/// generic `query_*` maps, and is excluded from `exist_keys`/`array_size`
/// bookkeeping.
pub const VECTOR_FIELD: &str = "$vector";

/// The row a document shreds into: one bundle of typed maps/sets per
/// the fixed column schema.
#[derive(Debug, Clone, PartialEq)]
pub struct WritableShreddedDocument {
    pub id: DocId,
    /// Canonical, compact JSON text — `_id` first, keys in input order,
    /// no whitespace, numbers preserved exactly.
    pub doc_json: String,
    /// Every path that materialized, in document (pre-order, depth-first)
    /// visiting order — object containers, array containers, and leaves
    /// alike.
    pub doc_field_order: Vec<String>,
    pub exist_keys: BTreeSet<String>,
    pub array_size: BTreeMap<String, usize>,
    /// `path|type|hash-or-literal` entries, one per array element.
    pub array_contains: BTreeSet<String>,
    /// path → stable hash of the object/array subtree rooted there.
    pub sub_doc_equals: BTreeMap<String, String>,
    pub query_bool_values: BTreeMap<String, bool>,
    pub query_dbl_values: BTreeMap<String, Decimal>,
    pub query_text_values: BTreeMap<String, String>,
    /// path → epoch milliseconds, populated from `{"$date": ...}` leaves.
    pub query_timestamp_values: BTreeMap<String, i64>,
    pub query_null_values: BTreeSet<String>,
    pub query_vector_value: Option<Vec<f32>>,
}

/// Deterministic JSON → shredded-row transform.
#[derive(Debug, Default, Clone, Copy)]
pub struct Shredder;

impl Shredder {
    pub fn new() -> Self {
        Self
    }

    /// Shred `doc`. Fails with [`ErrorCode::ShredBadDocumentType`] if `doc`
    /// is not a JSON object, with [`ErrorCode::ShredBadDocIdType`] if
    /// `_id` is an array or object.
    ///
    /// [`ErrorCode::ShredBadDocumentType`]: jsonapi_core::ErrorCode::ShredBadDocumentType
    /// [`ErrorCode::ShredBadDocIdType`]: jsonapi_core::ErrorCode::ShredBadDocIdType
    pub fn shred(&self, doc: &JsonValue) -> Result<WritableShreddedDocument, JsonApiError> {
        let obj = doc
            .as_object()
            .ok_or_else(|| JsonApiError::shred_bad_document_type(type_name(doc)))?;

        let id = DocId::from_json(obj.get("_id"))?;

        let mut walker = Walker::default();
        for (key, value) in obj.iter() {
            if key == "_id" || key == VECTOR_FIELD {
                continue;
            }
            let path = DotPath::from_segments(vec![PathSegment::Key(key.clone())]);
            walker.walk(&path, value);
        }

        let vector = obj
            .get(VECTOR_FIELD)
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_f64())
                    .map(|f| f as f32)
                    .collect::<Vec<f32>>()
            });

        let doc_json = canonicalize(&id, obj);

        Ok(WritableShreddedDocument {
            id,
            doc_json,
            doc_field_order: walker.order,
            exist_keys: walker.exist_keys,
            array_size: walker.array_size,
            array_contains: walker.array_contains,
            sub_doc_equals: walker.sub_doc_equals,
            query_bool_values: walker.query_bool_values,
            query_dbl_values: walker.query_dbl_values,
            query_text_values: walker.query_text_values,
            query_timestamp_values: walker.query_timestamp_values,
            query_null_values: walker.query_null_values,
            query_vector_value: vector,
        })
    }
}

#[derive(Default)]
struct Walker {
    order: Vec<String>,
    exist_keys: BTreeSet<String>,
    array_size: BTreeMap<String, usize>,
    array_contains: BTreeSet<String>,
    sub_doc_equals: BTreeMap<String, String>,
    query_bool_values: BTreeMap<String, bool>,
    query_dbl_values: BTreeMap<String, Decimal>,
    query_text_values: BTreeMap<String, String>,
    query_timestamp_values: BTreeMap<String, i64>,
    query_null_values: BTreeSet<String>,
}

impl Walker {
    fn walk(&mut self, path: &DotPath, value: &JsonValue) {
        let rendered = path.to_string();
        self.order.push(rendered.clone());
        self.exist_keys.insert(rendered.clone());

        if let Some(millis) = as_extended_date(value) {
            self.query_timestamp_values.insert(rendered, millis);
            return;
        }

        match value {
            JsonValue::Null => {
                self.query_null_values.insert(rendered);
            }
            JsonValue::Bool(b) => {
                self.query_bool_values.insert(rendered, *b);
            }
            JsonValue::Number(n) => {
                if let Ok(decimal) = Decimal::from_str_exact(&n.to_string()) {
                    self.query_dbl_values.insert(rendered, decimal);
                }
            }
            JsonValue::String(s) => {
                self.query_text_values.insert(rendered, s.clone());
            }
            JsonValue::Object(map) => {
                self.sub_doc_equals.insert(rendered.clone(), stable_hash(value));
                for (key, child) in map.iter() {
                    let mut segments = path.segments().to_vec();
                    segments.push(PathSegment::Key(key.clone()));
                    self.walk(&DotPath::from_segments(segments), child);
                }
            }
            JsonValue::Array(arr) => {
                self.sub_doc_equals.insert(rendered.clone(), stable_hash(value));
                self.array_size.insert(rendered.clone(), arr.len());
                for element in arr.iter() {
                    self.array_contains
                        .insert(crate::hash::array_entry_literal(&rendered, element));
                }
                for (index, child) in arr.iter().enumerate() {
                    let mut segments = path.segments().to_vec();
                    segments.push(PathSegment::Index(index));
                    self.walk(&DotPath::from_segments(segments), child);
                }
            }
        }
    }
}

/// Recognize the `{"$date": <millis-or-iso8601>}` extended literal used to
/// address `query_timestamp_values` — plain JSON has no native date type,
/// so a single-key marker object is the convention (mirrors the `$vector`
/// reserved field for ANN, and the MongoDB-style `$date` extended JSON
/// type); see DESIGN.md for the reasoning.
pub(crate) fn as_extended_date(value: &JsonValue) -> Option<i64> {
    let obj = value.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    let raw = obj.get("$date")?;
    if let Some(n) = raw.as_i64() {
        return Some(n);
    }
    if let Some(s) = raw.as_str() {
        return chrono_like_parse(s);
    }
    None
}

/// Minimal RFC 3339 → epoch-millis parser so this crate doesn't need a
/// `chrono` dependency just for one literal format.
fn chrono_like_parse(s: &str) -> Option<i64> {
    // Accept "YYYY-MM-DDTHH:MM:SS[.sss]Z" — the only shape the command
    // pipeline's JSON parser ever produces for date literals.
    let (date, time) = s.split_once('T')?;
    let time = time.strip_suffix('Z')?;
    let mut date_parts = date.split('-');
    let year: i64 = date_parts.next()?.parse().ok()?;
    let month: i64 = date_parts.next()?.parse().ok()?;
    let day: i64 = date_parts.next()?.parse().ok()?;
    let (time, millis) = match time.split_once('.') {
        Some((t, ms)) => (t, ms.parse::<i64>().ok()?),
        None => (time, 0),
    };
    let mut time_parts = time.split(':');
    let hour: i64 = time_parts.next()?.parse().ok()?;
    let minute: i64 = time_parts.next()?.parse().ok()?;
    let second: i64 = time_parts.next()?.parse().ok()?;

    let days = days_from_civil(year, month, day);
    Some(((days * 86_400 + hour * 3600 + minute * 60 + second) * 1000) + millis)
}

/// Howard Hinnant's days-from-civil algorithm (proleptic Gregorian).
fn days_from_civil(y: i64, m: i64, d: i64) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as i64;
    let mp = (m + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Canonical `doc_json`: `_id` first, remaining keys in input order, no
/// whitespace.
fn canonicalize(id: &DocId, obj: &JsonMap<String, JsonValue>) -> String {
    let mut out = JsonMap::new();
    out.insert("_id".to_string(), id.to_json());
    for (key, value) in obj.iter() {
        if key == "_id" {
            continue;
        }
        out.insert(key.clone(), value.clone());
    }
    serde_json::to_string(&JsonValue::Object(out)).expect("canonical document serializes")
}

fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonapi_core::error::ErrorCode;
    use serde_json::json;

    #[test]
    fn scenario_1_basic_document() {
        let doc = json!({
            "_id": "abc",
            "name": "Bob",
            "values": [1, 2],
            "[extra.stuff]": true,
            "nullable": null,
        });
        let shredded = Shredder::new().shred(&doc).unwrap();

        assert_eq!(
            shredded.doc_field_order,
            vec![
                "name".to_string(),
                "values".to_string(),
                "values.[0]".to_string(),
                "values.[1]".to_string(),
                r"\[extra\.stuff\]".to_string(),
                "nullable".to_string(),
            ]
        );
        assert_eq!(shredded.array_size.get("values"), Some(&2));
        assert_eq!(
            shredded.query_bool_values.get(r"\[extra\.stuff\]"),
            Some(&true)
        );
        assert_eq!(shredded.query_text_values.get("name"), Some(&"Bob".to_string()));
        assert!(shredded.query_null_values.contains("nullable"));
        assert_eq!(
            shredded.query_dbl_values.get("values.[0]"),
            Some(&Decimal::from(1))
        );
        assert_eq!(
            shredded.query_dbl_values.get("values.[1]"),
            Some(&Decimal::from(2))
        );
    }

    #[test]
    fn scenario_2_array_is_not_a_document() {
        let err = Shredder::new().shred(&json!([1, 2])).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::ShredBadDocumentType);
        assert!(err.to_string().starts_with("Bad document type to shred"));
    }

    #[test]
    fn scenario_3_array_id_is_rejected() {
        let err = Shredder::new().shred(&json!({"_id": []})).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::ShredBadDocIdType);
    }

    #[test]
    fn id_is_not_indexed() {
        let doc = json!({"_id": "abc", "name": "Bob"});
        let shredded = Shredder::new().shred(&doc).unwrap();
        assert!(!shredded.exist_keys.contains("_id"));
        assert!(!shredded.query_text_values.contains_key("_id"));
    }

    #[test]
    fn doc_json_has_id_first_and_no_whitespace() {
        let doc = json!({"name": "Bob", "_id": "abc"});
        let shredded = Shredder::new().shred(&doc).unwrap();
        assert!(shredded.doc_json.starts_with(r#"{"_id":"abc""#));
        assert!(!shredded.doc_json.contains(' '));
    }

    #[test]
    fn nested_object_gets_sub_doc_hash_and_exist_key() {
        let doc = json!({"a": {"b": 1, "c": 2}});
        let shredded = Shredder::new().shred(&doc).unwrap();
        assert!(shredded.exist_keys.contains("a"));
        assert!(shredded.sub_doc_equals.contains_key("a"));
        assert!(shredded.query_dbl_values.contains_key("a.b"));
    }

    #[test]
    fn array_contains_has_one_entry_per_element() {
        let doc = json!({"tags": ["a", "b", "a"]});
        let shredded = Shredder::new().shred(&doc).unwrap();
        assert!(shredded.array_contains.contains("tags|text|a"));
        assert!(shredded.array_contains.contains("tags|text|b"));
    }

    #[test]
    fn reshredding_canonical_json_is_idempotent() {
        let doc = json!({"_id": "x", "a": 1, "b": [1, {"c": true}]});
        let first = Shredder::new().shred(&doc).unwrap();
        let reparsed: JsonValue = serde_json::from_str(&first.doc_json).unwrap();
        let second = Shredder::new().shred(&reparsed).unwrap();
        assert_eq!(first.doc_field_order, second.doc_field_order);
        assert_eq!(first.query_dbl_values, second.query_dbl_values);
        assert_eq!(first.array_size, second.array_size);
    }

    #[test]
    fn extended_date_literal_becomes_timestamp() {
        let doc = json!({"created": {"$date": "2024-01-15T10:30:00.000Z"}});
        let shredded = Shredder::new().shred(&doc).unwrap();
        assert!(shredded.query_timestamp_values.contains_key("created"));
        assert!(!shredded.exist_keys.contains("created.$date"));
    }

    #[test]
    fn vector_field_is_extracted_and_excluded_from_indexing() {
        let doc = json!({"name": "x", "$vector": [0.1, 0.2, 0.3]});
        let shredded = Shredder::new().shred(&doc).unwrap();
        assert_eq!(shredded.query_vector_value, Some(vec![0.1f32, 0.2, 0.3]));
        assert!(!shredded.exist_keys.iter().any(|k| k.contains("vector")));
    }
}

#[cfg(test)]
mod proptests {
    //! spec.md §8 invariants, exercised over arbitrary small documents
    //! rather than the fixed scenario 1 fixture above.

    use super::*;
    use proptest::prelude::*;

    /// A bounded-depth, bounded-size JSON value generator: object/array
    /// containers of plain-ASCII-keyed scalars, at most two levels deep,
    /// matching the teacher's own bounded-depth proptest generators for
    /// its WAL/replay invariants.
    fn arb_scalar() -> impl Strategy<Value = JsonValue> {
        prop_oneof![
            Just(JsonValue::Null),
            any::<bool>().prop_map(JsonValue::Bool),
            any::<i32>().prop_map(|n| JsonValue::Number(n.into())),
            "[a-z]{0,8}".prop_map(JsonValue::String),
        ]
    }

    fn arb_field_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9]{0,6}"
    }

    fn arb_document() -> impl Strategy<Value = JsonValue> {
        let leaf = arb_scalar();
        let inner = proptest::collection::vec((arb_field_name(), leaf.clone()), 0..4)
            .prop_map(|fields| JsonValue::Object(fields.into_iter().collect()));
        let array_of_scalars = proptest::collection::vec(leaf, 0..4).prop_map(JsonValue::Array);
        proptest::collection::vec(
            (arb_field_name(), prop_oneof![arb_scalar(), inner, array_of_scalars]),
            1..5,
        )
        .prop_map(|fields| JsonValue::Object(fields.into_iter().collect()))
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 128, ..Default::default() })]

        /// `shred(D).doc_json` re-parsed and re-shredded equals `shred(D)`
        /// on every field the output carries (idempotent canonicalisation).
        #[test]
        fn reshredding_doc_json_is_idempotent(mut doc in arb_document()) {
            doc.as_object_mut().unwrap().insert("_id".to_string(), JsonValue::String("fixed".to_string()));
            let first = Shredder::new().shred(&doc).unwrap();
            let reparsed: JsonValue = serde_json::from_str(&first.doc_json).unwrap();
            let second = Shredder::new().shred(&reparsed).unwrap();
            prop_assert_eq!(first.doc_field_order, second.doc_field_order);
            prop_assert_eq!(first.exist_keys, second.exist_keys);
            prop_assert_eq!(first.array_size, second.array_size);
            prop_assert_eq!(first.query_bool_values, second.query_bool_values);
            prop_assert_eq!(first.query_text_values, second.query_text_values);
            prop_assert_eq!(first.query_dbl_values, second.query_dbl_values);
            prop_assert_eq!(first.query_null_values, second.query_null_values);
        }

        /// For every leaf path P, P is in `exist_keys` iff `find_value`
        /// resolves it against the same document.
        #[test]
        fn exist_keys_agrees_with_find_value(mut doc in arb_document()) {
            doc.as_object_mut().unwrap().insert("_id".to_string(), JsonValue::String("fixed".to_string()));
            let shredded = Shredder::new().shred(&doc).unwrap();
            for rendered in &shredded.doc_field_order {
                prop_assert!(shredded.exist_keys.contains(rendered));
                let path = DotPath::parse(rendered).unwrap();
                prop_assert!(path.find_value(&doc).is_some());
            }
        }
    }
}
