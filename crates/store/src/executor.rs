//! The `StoreExecutor` trait: the one seam operation executors use to
//! reach the backing store.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::statement::{ResultPage, Statement};

/// An opaque handle to a prepared statement. The concrete meaning (a CQL
/// driver's `PreparedStatement`, or nothing at all for the in-memory test
/// double) is owned by the implementor.
#[derive(Debug, Clone)]
pub struct PreparedHandle(pub String);

/// The store-driver collaborator boundary. Implementors run parameterized
/// statements and return async result pages; callers never construct or
/// depend on a concrete driver type.
#[async_trait]
pub trait StoreExecutor: Send + Sync {
    /// Prepare `cql` for repeated execution. Implementations that don't
    /// distinguish prepared from ad-hoc statements may return a handle
    /// that just echoes `cql` back.
    async fn prepare(&self, cql: &str) -> Result<PreparedHandle, StoreError>;

    /// Execute one statement and return its result page.
    async fn execute(&self, stmt: Statement) -> Result<ResultPage, StoreError>;

    /// Fetch the keyspace's table names, used by `CreateCollection` and
    /// `FindCollections` to enumerate existing collections.
    async fn list_tables(&self, keyspace: &str) -> Result<Vec<String>, StoreError>;
}
