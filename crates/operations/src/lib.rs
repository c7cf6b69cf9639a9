//! Concrete operation executors (§4.6): collection DDL, document CRUD,
//! count and find, all built on the [`jsonapi_store::StoreExecutor`] seam.
//!
//! Every operation is a plain struct carrying its typed parameters plus a
//! `CommandContext`, with an `execute(...)` method that builds statements
//! and interprets the result page — the command pipeline (`jsonapi-api`)
//! is the only caller, and never touches `jsonapi_store` directly.

pub mod context;
pub mod ddl;
pub mod insert;
pub mod mutate;
pub mod output;
pub mod read;
pub mod row_codec;
pub mod tx_id;

pub use context::{CollectionSettings, CommandContext};
pub use ddl::{CreateCollection, DropCollection, FindCollections};
pub use insert::{Insert, InsertMany};
pub use mutate::{Delete, DeleteMany, FindOneAndDelete, FindOneAndUpdate, Update, UpdateMany};
pub use output::{CommandStatus, OperationOutput};
pub use read::{Count, Find, FindOne};
