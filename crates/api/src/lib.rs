//! The command envelope pipeline (§4.7): parse a single-key command
//! object, resolve it against a `CommandContext` into a concrete
//! operation, execute it against a [`jsonapi_store::StoreExecutor`], and
//! shape the result into the always-200 [`CommandResult`] envelope (§6).
//!
//! ```
//! use std::sync::Arc;
//! use jsonapi_api::Pipeline;
//! use jsonapi_core::JsonApiConfig;
//! use jsonapi_operations::CommandContext;
//! use jsonapi_store::InMemoryStoreExecutor;
//! use serde_json::json;
//!
//! # async fn run() {
//! let pipeline = Pipeline::new(Arc::new(InMemoryStoreExecutor::new()), JsonApiConfig::default());
//! let context = CommandContext::new(None, "default_keyspace", Some("users".to_string()));
//! let result = pipeline
//!     .handle_value(context, json!({"insertOne": {"document": {"name": "Ada"}}}))
//!     .await;
//! assert!(result.errors.is_empty());
//! # }
//! ```

pub mod command;
pub mod envelope;
pub mod pipeline;
pub mod resolve;

pub use command::CommandTag;
pub use envelope::{CommandEnvelope, CommandResult, DataSection, ErrorObject, PipelineError};
pub use pipeline::Pipeline;
pub use resolve::{resolve, DataShape, Operation};
