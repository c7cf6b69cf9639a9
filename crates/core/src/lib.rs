//! Core types shared across the `jsonapi-server` workspace.
//!
//! This crate defines the foundational, driver-independent pieces:
//! - [`DotPath`] / [`PathMatch`]: the dotted-path locator algebra used by
//!   the shredder, the filter algebra, and the update algebra.
//! - [`DocId`]: the closed set of `_id` representations and their encoding
//!   into the primary key tuple.
//! - [`error`]: the closed error taxonomy (`ErrorCode`, `JsonApiError`).
//! - [`config`]: process-wide, read-only-after-load configuration.
//! - [`limits`]: document size/depth/path-length bounds.

pub mod config;
pub mod docid;
pub mod dotpath;
pub mod error;
pub mod limits;

pub use config::JsonApiConfig;
pub use docid::DocId;
pub use dotpath::{DotPath, PathMatch, PathSegment};
pub use error::{ErrorCode, JsonApiError, Result};
pub use limits::Limits;
