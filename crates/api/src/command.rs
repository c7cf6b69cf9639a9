//! Per-tag command parameter shapes (§4.7 step 1). Each struct mirrors
//! exactly what its tag accepts on the wire; unknown fields are rejected
//! so a typo in a request surfaces immediately rather than being silently
//! ignored.

use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

fn default_filter() -> JsonValue {
    JsonValue::Object(Map::new())
}

fn default_update() -> JsonValue {
    JsonValue::Object(Map::new())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VectorOptions {
    #[serde(default)]
    pub enabled: bool,
    pub size: Option<u32>,
    #[serde(rename = "function")]
    pub similarity_function: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CollectionOptions {
    pub vector: Option<VectorOptions>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCollectionParams {
    pub name: String,
    #[serde(default)]
    pub options: CollectionOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamedCollectionParams {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InsertOneParams {
    pub document: JsonValue,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InsertManyParams {
    pub documents: Vec<JsonValue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FindParams {
    #[serde(default = "default_filter")]
    pub filter: JsonValue,
    pub limit: Option<u64>,
    #[serde(rename = "pageState")]
    pub page_state: Option<String>,
    /// `{"sort": {"$vector": [...]}}` requests an ANN-ordered result
    /// instead of the default `_id` ordering (§4.6); rejected unless the
    /// collection was created with `vector.enabled`.
    pub sort: Option<JsonValue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterOnlyParams {
    #[serde(default = "default_filter")]
    pub filter: JsonValue,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FindOneParams {
    #[serde(default = "default_filter")]
    pub filter: JsonValue,
    /// See [`FindParams::sort`].
    pub sort: Option<JsonValue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateParams {
    #[serde(default = "default_filter")]
    pub filter: JsonValue,
    #[serde(default = "default_update")]
    pub update: JsonValue,
    #[serde(default)]
    pub upsert: bool,
}

/// The closed set of command tags (§4.7, §GLOSSARY) — the key under which
/// a request's single top-level object is nested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandTag {
    CreateCollection,
    DropCollection,
    FindCollections,
    InsertOne,
    InsertMany,
    Find,
    FindOne,
    CountDocuments,
    UpdateOne,
    UpdateMany,
    FindOneAndUpdate,
    DeleteOne,
    DeleteMany,
    FindOneAndDelete,
}

impl CommandTag {
    pub fn from_str(tag: &str) -> Option<Self> {
        Some(match tag {
            "createCollection" => CommandTag::CreateCollection,
            "deleteCollection" => CommandTag::DropCollection,
            "findCollections" => CommandTag::FindCollections,
            "insertOne" => CommandTag::InsertOne,
            "insertMany" => CommandTag::InsertMany,
            "find" => CommandTag::Find,
            "findOne" => CommandTag::FindOne,
            "countDocuments" => CommandTag::CountDocuments,
            "updateOne" => CommandTag::UpdateOne,
            "updateMany" => CommandTag::UpdateMany,
            "findOneAndUpdate" => CommandTag::FindOneAndUpdate,
            "deleteOne" => CommandTag::DeleteOne,
            "deleteMany" => CommandTag::DeleteMany,
            "findOneAndDelete" => CommandTag::FindOneAndDelete,
            _ => return None,
        })
    }
}
