//! Document size, nesting depth and path length bounds.
//!
//! Grounded on the teacher's `core::json` module constants
//! (`MAX_DOCUMENT_SIZE`, `MAX_NESTING_DEPTH`, `MAX_PATH_LENGTH`), scaled
//! down from the teacher's in-process embedded-store numbers to values
//! appropriate for documents that cross a network boundary into a
//! wide-column store.

use serde_json::Value as JsonValue;

/// Size, depth and path-length bounds applied to documents before
/// shredding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum serialized document size, in bytes.
    pub max_document_size_bytes: usize,
    /// Maximum nesting depth (objects and arrays combined).
    pub max_nesting_depth: usize,
    /// Maximum number of segments in a single dotted path.
    pub max_path_length: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_document_size_bytes: 1_000_000,
            max_nesting_depth: 64,
            max_path_length: 64,
        }
    }
}

impl Limits {
    pub fn validate_size(&self, doc_json: &str) -> Result<(), String> {
        if doc_json.len() > self.max_document_size_bytes {
            return Err(format!(
                "document size {} exceeds maximum of {} bytes",
                doc_json.len(),
                self.max_document_size_bytes
            ));
        }
        Ok(())
    }

    pub fn validate_depth(&self, value: &JsonValue) -> Result<(), String> {
        let depth = nesting_depth(value);
        if depth > self.max_nesting_depth {
            return Err(format!(
                "document nesting depth {} exceeds maximum of {}",
                depth, self.max_nesting_depth
            ));
        }
        Ok(())
    }

    /// Reject a dotted path (from a filter, an update clause, or a
    /// projection) with more segments than `max_path_length` — an
    /// unbounded path is an unbounded amount of `find_or_create`
    /// auto-vivification work per document.
    pub fn validate_path_length(&self, segment_count: usize) -> Result<(), String> {
        if segment_count > self.max_path_length {
            return Err(format!(
                "path length {} exceeds maximum of {}",
                segment_count, self.max_path_length
            ));
        }
        Ok(())
    }
}

fn nesting_depth(value: &JsonValue) -> usize {
    match value {
        JsonValue::Object(map) => 1 + map.values().map(nesting_depth).max().unwrap_or(0),
        JsonValue::Array(arr) => 1 + arr.iter().map(nesting_depth).max().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_document_has_depth_one() {
        let limits = Limits::default();
        assert!(limits.validate_depth(&json!({"a": 1})).is_ok());
    }

    #[test]
    fn deeply_nested_document_is_rejected() {
        let limits = Limits {
            max_nesting_depth: 2,
            ..Limits::default()
        };
        let doc = json!({"a": {"b": {"c": 1}}});
        assert!(limits.validate_depth(&doc).is_err());
    }

    #[test]
    fn path_within_bound_is_accepted() {
        let limits = Limits::default();
        assert!(limits.validate_path_length(3).is_ok());
    }

    #[test]
    fn overlong_path_is_rejected() {
        let limits = Limits {
            max_path_length: 4,
            ..Limits::default()
        };
        assert!(limits.validate_path_length(5).is_err());
    }
}
