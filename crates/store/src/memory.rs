//! An in-memory [`StoreExecutor`] test double. Tables are plain maps
//! keyed by the `(tag, text)` primary key; statements are interpreted via
//! [`StatementIntent`] rather than by parsing CQL text.
//!
//! By convention, any statement addressing a single document by key binds
//! the tag and text as its first two parameters
//! (`BoundValue::TinyInt`, `BoundValue::Text`).

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::StoreError;
use crate::executor::{PreparedHandle, StoreExecutor};
use crate::statement::{BoundValue, ResultPage, Row, Statement, StatementIntent};

type DocKey = (i8, String);

#[derive(Default)]
struct Table {
    rows: BTreeMap<DocKey, Row>,
    comment: Option<String>,
}

/// In-memory fake store, suitable for unit/integration tests of operation
/// executors without a live cluster.
#[derive(Default)]
pub struct InMemoryStoreExecutor {
    keyspaces: Mutex<BTreeMap<String, BTreeMap<String, Table>>>,
}

impl InMemoryStoreExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn key_of(stmt: &Statement) -> Option<DocKey> {
        let tag = match stmt.params.first() {
            Some(BoundValue::TinyInt(t)) => *t,
            _ => return None,
        };
        let text = match stmt.params.get(1) {
            Some(BoundValue::Text(s)) => s.clone(),
            _ => return None,
        };
        Some((tag, text))
    }
}

#[async_trait]
impl StoreExecutor for InMemoryStoreExecutor {
    async fn prepare(&self, cql: &str) -> Result<PreparedHandle, StoreError> {
        Ok(PreparedHandle(cql.to_string()))
    }

    async fn list_tables(&self, keyspace: &str) -> Result<Vec<String>, StoreError> {
        let guard = self.keyspaces.lock();
        Ok(guard
            .get(keyspace)
            .map(|tables| tables.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn execute(&self, stmt: Statement) -> Result<ResultPage, StoreError> {
        let mut guard = self.keyspaces.lock();
        let tables = guard.entry(stmt.keyspace.clone()).or_default();

        match &stmt.intent {
            StatementIntent::CreateTable { comment } => {
                let table = tables.entry(stmt.table.clone()).or_default();
                if table.comment.is_none() {
                    table.comment = comment.clone();
                }
                Ok(ResultPage::empty(true))
            }
            StatementIntent::CreateIndex => Ok(ResultPage::empty(true)),
            StatementIntent::DropTable => {
                tables.remove(&stmt.table);
                Ok(ResultPage::empty(true))
            }
            StatementIntent::DescribeTable => match tables.get(&stmt.table) {
                Some(table) => {
                    let mut columns = std::collections::HashMap::new();
                    columns.insert(
                        "comment".to_string(),
                        match &table.comment {
                            Some(c) => BoundValue::Text(c.clone()),
                            None => BoundValue::Null,
                        },
                    );
                    Ok(ResultPage::single_row(Row { columns }, true))
                }
                None => Ok(ResultPage::empty(true)),
            },
            StatementIntent::InsertIfNotExists { row } => {
                let table = tables.entry(stmt.table.clone()).or_default();
                let key = Self::key_of(&stmt).ok_or_else(|| {
                    StoreError::Execution("insert statement missing primary key params".into())
                })?;
                if table.rows.contains_key(&key) {
                    Ok(ResultPage::empty(false))
                } else {
                    table.rows.insert(key, row.clone());
                    Ok(ResultPage::empty(true))
                }
            }
            StatementIntent::ConditionalUpdate { expected_tx_id, row } => {
                let table = tables.entry(stmt.table.clone()).or_default();
                let key = Self::key_of(&stmt).ok_or_else(|| {
                    StoreError::Execution("update statement missing primary key params".into())
                })?;
                match table.rows.get(&key) {
                    Some(existing) => {
                        let current_tx = tx_id_of(existing);
                        if current_tx == Some(*expected_tx_id) {
                            table.rows.insert(key, row.clone());
                            Ok(ResultPage::empty(true))
                        } else {
                            Ok(ResultPage::single_row(existing.clone(), false))
                        }
                    }
                    None => Ok(ResultPage::empty(false)),
                }
            }
            StatementIntent::ConditionalDelete { expected_tx_id } => {
                let table = tables.entry(stmt.table.clone()).or_default();
                let key = Self::key_of(&stmt).ok_or_else(|| {
                    StoreError::Execution("delete statement missing primary key params".into())
                })?;
                match table.rows.get(&key) {
                    Some(existing) => {
                        let current_tx = tx_id_of(existing);
                        if current_tx == Some(*expected_tx_id) {
                            table.rows.remove(&key);
                            Ok(ResultPage::empty(true))
                        } else {
                            Ok(ResultPage::single_row(existing.clone(), false))
                        }
                    }
                    None => Ok(ResultPage::empty(false)),
                }
            }
            StatementIntent::SelectById => {
                let table = tables.entry(stmt.table.clone()).or_default();
                match Self::key_of(&stmt).and_then(|key| table.rows.get(&key)) {
                    Some(row) => Ok(ResultPage::single_row(row.clone(), true)),
                    None => Ok(ResultPage::empty(true)),
                }
            }
            StatementIntent::SelectScan | StatementIntent::CountScan | StatementIntent::VectorScan { .. } => {
                let table = tables.entry(stmt.table.clone()).or_default();
                let rows: Vec<Row> = table.rows.values().cloned().collect();
                Ok(ResultPage {
                    rows,
                    paging_state: None,
                    was_applied: true,
                })
            }
        }
    }
}

fn tx_id_of(row: &Row) -> Option<i64> {
    match row.get("tx_id") {
        Some(BoundValue::Decimal(d)) => d.to_string().parse().ok(),
        Some(BoundValue::TimestampMillis(t)) => Some(*t),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn row_with_tx(tx_id: i64) -> Row {
        let mut columns = HashMap::new();
        columns.insert("tx_id".to_string(), BoundValue::TimestampMillis(tx_id));
        Row { columns }
    }

    #[tokio::test]
    async fn insert_if_not_exists_then_conflict() {
        let store = InMemoryStoreExecutor::new();
        let stmt = Statement::new(
            "ks",
            "docs",
            "INSERT",
            StatementIntent::InsertIfNotExists {
                row: row_with_tx(1),
            },
        )
        .bind(BoundValue::TinyInt(0))
        .bind(BoundValue::Text("abc".to_string()));

        let first = store.execute(stmt.clone()).await.unwrap();
        assert!(first.was_applied);
        let second = store.execute(stmt).await.unwrap();
        assert!(!second.was_applied);
    }

    #[tokio::test]
    async fn conditional_update_requires_matching_tx_id() {
        let store = InMemoryStoreExecutor::new();
        let insert = Statement::new(
            "ks",
            "docs",
            "INSERT",
            StatementIntent::InsertIfNotExists {
                row: row_with_tx(1),
            },
        )
        .bind(BoundValue::TinyInt(0))
        .bind(BoundValue::Text("abc".to_string()));
        store.execute(insert).await.unwrap();

        let bad_update = Statement::new(
            "ks",
            "docs",
            "UPDATE",
            StatementIntent::ConditionalUpdate {
                expected_tx_id: 99,
                row: row_with_tx(2),
            },
        )
        .bind(BoundValue::TinyInt(0))
        .bind(BoundValue::Text("abc".to_string()));
        let result = store.execute(bad_update).await.unwrap();
        assert!(!result.was_applied);

        let good_update = Statement::new(
            "ks",
            "docs",
            "UPDATE",
            StatementIntent::ConditionalUpdate {
                expected_tx_id: 1,
                row: row_with_tx(2),
            },
        )
        .bind(BoundValue::TinyInt(0))
        .bind(BoundValue::Text("abc".to_string()));
        let result = store.execute(good_update).await.unwrap();
        assert!(result.was_applied);
    }
}
