//! Request-scoped context and the per-collection settings `CreateCollection`
//! compares a pre-existing table against.

use serde::{Deserialize, Serialize};

use jsonapi_core::JsonApiError;

/// `(namespace, collection)` resolved for one command, plus the optional
/// tenant discriminator used to key the schema cache and the store-session
/// cache (§4.5, §5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    pub tenant: Option<String>,
    pub namespace: String,
    pub collection: Option<String>,
}

impl CommandContext {
    pub fn new(tenant: Option<String>, namespace: impl Into<String>, collection: Option<String>) -> Self {
        Self {
            tenant,
            namespace: namespace.into(),
            collection,
        }
    }

    /// Schema commands (`createCollection`, `findCollections`) operate on
    /// a namespace alone; every document command requires a collection.
    pub fn require_collection(&self) -> Result<&str, JsonApiError> {
        self.collection
            .as_deref()
            .ok_or_else(|| JsonApiError::internal("command requires a collection in its context"))
    }
}

/// The options a collection's backing table was created with — matching
/// `(vector_enabled, vector_size, similarity_function, comment)` (§4.6).
///
/// Persisted as a JSON blob in the CQL table's `comment` clause, the same
/// convention the real JSON API uses: the comment is both a human-readable
/// annotation and the only piece of table metadata a later
/// `createCollection` call needs to recover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CollectionSettings {
    #[serde(default)]
    pub vector_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl CollectionSettings {
    pub fn to_comment(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_comment(comment: Option<&str>) -> Self {
        comment
            .and_then(|c| serde_json::from_str(c).ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip_through_comment() {
        let settings = CollectionSettings {
            vector_enabled: true,
            vector_size: Some(1536),
            similarity_function: Some("cosine".to_string()),
            comment: None,
        };
        let comment = settings.to_comment();
        let recovered = CollectionSettings::from_comment(Some(&comment));
        assert_eq!(settings, recovered);
    }

    #[test]
    fn missing_comment_is_default_settings() {
        assert_eq!(CollectionSettings::from_comment(None), CollectionSettings::default());
    }
}
