//! # jsonapi-server
//!
//! A JSON document API layer in front of a wide-column (Cassandra-family)
//! store: documents go in as arbitrary JSON, get shredded into a fixed
//! relational column schema for indexed lookup, and come back out exactly
//! as they went in.
//!
//! # Quick start
//!
//! ```
//! use std::sync::Arc;
//! use jsonapi_server::{CommandContext, JsonApiConfig, Pipeline};
//! use jsonapi_server::InMemoryStoreExecutor;
//! use serde_json::json;
//!
//! # async fn run() {
//! let pipeline = Pipeline::new(Arc::new(InMemoryStoreExecutor::new()), JsonApiConfig::default());
//! let context = CommandContext::new(None, "default_keyspace", Some("users".to_string()));
//!
//! let insert = pipeline
//!     .handle_value(context.clone(), json!({"insertOne": {"document": {"_id": "1", "name": "Ada"}}}))
//!     .await;
//! assert!(insert.errors.is_empty());
//!
//! let found = pipeline
//!     .handle_value(context, json!({"findOne": {"filter": {"_id": "1"}}}))
//!     .await;
//! assert!(found.errors.is_empty());
//! # }
//! ```
//!
//! # Layout
//!
//! | Crate | Responsibility |
//! |-------|----------------|
//! | `jsonapi-core` | `DotPath`, `DocId`, the closed error taxonomy, config, limits |
//! | `jsonapi-shredder` | JSON ⇄ relational row shredding, filter/update algebras |
//! | `jsonapi-schema-cache` | per-collection schema cache |
//! | `jsonapi-store` | the `StoreExecutor` seam, plus an in-memory test double and a ScyllaDB adapter |
//! | `jsonapi-operations` | concrete operation executors (DDL, CRUD, count, find) |
//! | `jsonapi-api` | the command envelope pipeline tying everything together |
//!
//! Only the re-exports below are part of this crate's stable surface;
//! everything else lives in its own published crate.

pub use jsonapi_api::{CommandResult, DataSection, ErrorObject, Pipeline};
pub use jsonapi_core::{config::JsonApiConfig, DocId, DotPath, ErrorCode, JsonApiError};
pub use jsonapi_operations::CommandContext;
pub use jsonapi_store::InMemoryStoreExecutor;
