//! The store executor boundary: the seam between operation executors and
//! the underlying wide-column (Cassandra-family) store.
//!
//! Operation executors never talk to a driver directly — they build a
//! [`Statement`], hand it to a [`StoreExecutor`], and get back a
//! [`ResultPage`]. Tests substitute [`InMemoryStoreExecutor`] for the real
//! [`ScyllaStoreExecutor`] adapter.

pub mod error;
pub mod executor;
pub mod memory;
pub mod scylla_adapter;
pub mod statement;

pub use error::StoreError;
pub use executor::{PreparedHandle, StoreExecutor};
pub use memory::InMemoryStoreExecutor;
pub use scylla_adapter::ScyllaStoreExecutor;
pub use statement::{BoundValue, ResultPage, Row, Statement};
