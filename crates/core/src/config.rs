//! Process-wide, read-only-after-load configuration (§6).
//!
//! Grounded on the teacher's `crates/engine/src/database/config.rs`
//! pattern: a plain `serde`-deserializable struct with a `Default` impl
//! supplying every documented default, loaded once at process startup and
//! then shared read-only via `Arc` by everything downstream.

use serde::{Deserialize, Serialize};

/// Typed configuration, one field per option named in spec.md §6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonApiConfig {
    pub operations: OperationsConfig,
    pub database: DatabaseConfig,
    pub schema_cache: SchemaCacheConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationsConfig {
    /// Default namespace when a request path omits one.
    pub keyspace: String,
    /// Hard cap on documents returned in a single page.
    pub max_documents_per_page: usize,
    /// Pause, in milliseconds, between successive DDL statements issued
    /// while creating a collection (`CREATE TABLE` then `CREATE INDEX`×N).
    pub ddl_delay_millis: u64,
    /// CAS retry budget for `updateOne`/`deleteOne`-family operations.
    pub max_retries: u32,
    /// Deadline for one command's end-to-end execution (§5). Exceeding it
    /// surfaces `REQUEST_TIMEOUT` rather than letting the caller hang.
    pub request_timeout_millis: u64,
    /// Upper bound on commands executing concurrently (§5) — further
    /// requests are rejected with `SERVER_BUSY` rather than queued
    /// unbounded.
    pub max_inflight_requests: usize,
}

impl Default for OperationsConfig {
    fn default() -> Self {
        Self {
            keyspace: "default_keyspace".to_string(),
            max_documents_per_page: 20,
            ddl_delay_millis: 1000,
            max_retries: 3,
            request_timeout_millis: 10_000,
            max_inflight_requests: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Per-namespace collection limit.
    pub max_collections: usize,
    /// Indexes created per collection by `CreateCollection` — must stay in
    /// sync with the number of `CREATE INDEX` statements it issues
    /// (Open Question (c), resolved in DESIGN.md).
    pub indexes_needed_per_collection: usize,
    /// Cluster-wide index budget.
    pub indexes_available_per_database: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_collections: 5,
            indexes_needed_per_collection: 8,
            indexes_available_per_database: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaCacheConfig {
    pub ttl_seconds: u64,
    pub max_size: usize,
}

impl Default for SchemaCacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 600,
            max_size: 100,
        }
    }
}

impl Default for JsonApiConfig {
    fn default() -> Self {
        Self {
            operations: OperationsConfig::default(),
            database: DatabaseConfig::default(),
            schema_cache: SchemaCacheConfig::default(),
        }
    }
}

impl JsonApiConfig {
    /// Load configuration, falling back to documented defaults for any
    /// option not overridden. Environment/file layering is left to the
    /// embedding process; this constructor is the seam tests use to
    /// inject small limits (mirroring the teacher's
    /// `DatabaseConfig::with_small_limits`-style test constructors).
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// Layer a handful of well-known `JSONAPI_*` environment variables
    /// over the defaults. Unset or unparseable variables fall back to
    /// the default rather than failing startup.
    pub fn from_env_and_defaults() -> Self {
        let mut config = Self::default();
        if let Ok(keyspace) = std::env::var("JSONAPI_KEYSPACE") {
            config.operations.keyspace = keyspace;
        }
        if let Some(v) = env_usize("JSONAPI_MAX_COLLECTIONS") {
            config.database.max_collections = v;
        }
        if let Some(v) = env_usize("JSONAPI_MAX_DOCUMENTS_PER_PAGE") {
            config.operations.max_documents_per_page = v;
        }
        if let Some(v) = env_u64("JSONAPI_REQUEST_TIMEOUT_MILLIS") {
            config.operations.request_timeout_millis = v;
        }
        config
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = JsonApiConfig::default();
        assert_eq!(cfg.operations.max_retries, 3);
        assert_eq!(cfg.schema_cache.max_size, 100);
        assert_eq!(cfg.schema_cache.ttl_seconds, 600);
    }

    #[test]
    fn from_env_falls_back_to_defaults_when_unset() {
        std::env::remove_var("JSONAPI_KEYSPACE");
        let cfg = JsonApiConfig::from_env_and_defaults();
        assert_eq!(cfg.operations.keyspace, "default_keyspace");
    }
}
