//! The concrete [`StoreExecutor`] implementation backed by the `scylla`
//! CQL driver, the obvious pick for a system fronting a Cassandra-family
//! wide-column store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use rust_decimal::Decimal;
use scylla::client::caching_session::CachingSession;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::frame::response::result::{ColumnSpec, CqlValue};
use scylla::statement::Consistency;
use tracing::instrument;

use crate::error::StoreError;
use crate::executor::{PreparedHandle, StoreExecutor};
use crate::statement::{BoundValue, ResultPage, Row, Statement, StatementIntent};

/// Number of prepared statements kept warm per session.
const PREPARED_CACHE_SIZE: usize = 512;

pub struct ScyllaStoreExecutor {
    session: Arc<CachingSession>,
}

impl ScyllaStoreExecutor {
    pub async fn connect(known_nodes: &[String]) -> Result<Self, StoreError> {
        let mut builder = SessionBuilder::new();
        for node in known_nodes {
            builder = builder.known_node(node);
        }
        let session: Session = builder
            .build()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            session: Arc::new(CachingSession::from(session, PREPARED_CACHE_SIZE)),
        })
    }

    fn bind_values(stmt: &Statement) -> Vec<CqlValue> {
        stmt.params.iter().map(to_cql_value).collect()
    }
}

#[async_trait]
impl StoreExecutor for ScyllaStoreExecutor {
    #[instrument(skip(self))]
    async fn prepare(&self, cql: &str) -> Result<PreparedHandle, StoreError> {
        self.session
            .get_session()
            .prepare(cql)
            .await
            .map_err(|e| StoreError::Prepare(e.to_string()))?;
        Ok(PreparedHandle(cql.to_string()))
    }

    #[instrument(skip(self, stmt), fields(table = %stmt.table))]
    async fn execute(&self, stmt: Statement) -> Result<ResultPage, StoreError> {
        let values = Self::bind_values(&stmt);
        let mut query = scylla::statement::query::Query::new(stmt.cql.clone());
        query.set_consistency(Consistency::LocalQuorum);
        if let Some(size) = stmt.page_size {
            query.set_page_size(size);
        }

        let result = self
            .session
            .execute_iter(query, values)
            .await
            .map_err(|e| StoreError::Execution(e.to_string()));

        // `execute_iter` models a streamed read; writes and LWT statements
        // go through `execute_unpaged` so the `[applied]` flag is visible.
        match stmt.intent {
            StatementIntent::SelectScan
            | StatementIntent::CountScan
            | StatementIntent::SelectById
            | StatementIntent::DescribeTable
            | StatementIntent::VectorScan { .. } => {
                let iter = result?;
                let rows = rows_from_iter(iter).await?;
                Ok(ResultPage {
                    rows,
                    paging_state: None,
                    was_applied: true,
                })
            }
            _ => {
                let unpaged = self
                    .session
                    .execute_unpaged(stmt.cql.clone(), Self::bind_values(&stmt))
                    .await
                    .map_err(|e| StoreError::Execution(e.to_string()))?;
                let was_applied = unpaged
                    .first_row()
                    .ok()
                    .and_then(|row| row.columns.first().cloned().flatten())
                    .map(|v| matches!(v, CqlValue::Boolean(true)))
                    .unwrap_or(true);
                Ok(ResultPage::empty(was_applied))
            }
        }
    }

    #[instrument(skip(self))]
    async fn list_tables(&self, keyspace: &str) -> Result<Vec<String>, StoreError> {
        let cql = "SELECT table_name FROM system_schema.tables WHERE keyspace_name = ?";
        let result = self
            .session
            .execute_unpaged(cql, (keyspace,))
            .await
            .map_err(|e| StoreError::Execution(e.to_string()))?;
        let rows = result.rows().map_err(|e| StoreError::Execution(e.to_string()))?;
        Ok(rows
            .into_typed::<(String,)>()
            .filter_map(Result::ok)
            .map(|(name,)| name)
            .collect())
    }
}

/// Stream every page of `iter` and decode each raw row into a [`Row`]
/// keyed by column name, the shape [`crate::memory::InMemoryStoreExecutor`]
/// and `jsonapi_operations::row_codec` already agree on.
async fn rows_from_iter(
    mut iter: scylla::transport::iterator::RowIterator,
) -> Result<Vec<Row>, StoreError> {
    let specs = iter.column_specs().to_vec();
    let mut rows = Vec::new();
    while let Some(typed_row) = iter
        .try_next()
        .await
        .map_err(|e| StoreError::Execution(e.to_string()))?
    {
        rows.push(row_from_columns(&specs, typed_row.columns));
    }
    Ok(rows)
}

fn row_from_columns(specs: &[ColumnSpec], values: Vec<Option<CqlValue>>) -> Row {
    let mut columns = HashMap::with_capacity(values.len());
    for (spec, value) in specs.iter().zip(values) {
        columns.insert(spec.name().to_string(), from_cql_value(value));
    }
    Row { columns }
}

/// Decode one driver-returned cell. Column shape is fixed (§3), so every
/// cell this system ever reads back is one of these kinds.
fn from_cql_value(value: Option<CqlValue>) -> BoundValue {
    match value {
        None | Some(CqlValue::Empty) => BoundValue::Null,
        Some(CqlValue::Text(s)) | Some(CqlValue::Ascii(s)) => BoundValue::Text(s),
        Some(CqlValue::Boolean(b)) => BoundValue::Bool(b),
        Some(CqlValue::BigInt(n)) => BoundValue::TimestampMillis(n),
        Some(CqlValue::Int(n)) => BoundValue::TimestampMillis(n as i64),
        Some(CqlValue::TinyInt(t)) => BoundValue::TinyInt(t),
        Some(CqlValue::Set(items)) => BoundValue::SetText(
            items
                .into_iter()
                .filter_map(|v| match v {
                    CqlValue::Text(s) | CqlValue::Ascii(s) => Some(s),
                    _ => None,
                })
                .collect(),
        ),
        Some(CqlValue::Map(entries)) => {
            // The four `query_*` map columns and `array_size` share a text
            // key; the value kind tells us which `BoundValue::MapText*`
            // variant to reconstruct into. Callers match on the variant,
            // not the column name, so this must stay lossless per-entry.
            decode_map(entries)
        }
        Some(CqlValue::List(items)) => BoundValue::Vector(
            items
                .into_iter()
                .filter_map(|v| match v {
                    CqlValue::Float(f) => Some(f),
                    CqlValue::Double(d) => Some(d as f32),
                    _ => None,
                })
                .collect(),
        ),
        Some(other) => {
            // Any remaining CQL kind (e.g. a raw float/double/int column
            // not part of the fixed schema) is preserved as text so a
            // caller can still see *something* rather than silently
            // losing the cell.
            BoundValue::Text(format!("{other:?}"))
        }
    }
}

fn decode_map(entries: Vec<(CqlValue, CqlValue)>) -> BoundValue {
    if entries.is_empty() {
        return BoundValue::MapTextText(Default::default());
    }
    match &entries[0].1 {
        CqlValue::Boolean(_) => BoundValue::MapTextBool(
            entries
                .into_iter()
                .filter_map(|(k, v)| match (text_of(k), v) {
                    (Some(k), CqlValue::Boolean(b)) => Some((k, b)),
                    _ => None,
                })
                .collect(),
        ),
        CqlValue::Int(_) => BoundValue::MapTextUsize(
            entries
                .into_iter()
                .filter_map(|(k, v)| match (text_of(k), v) {
                    (Some(k), CqlValue::Int(n)) => Some((k, n as usize)),
                    _ => None,
                })
                .collect(),
        ),
        CqlValue::BigInt(_) => BoundValue::MapTextTimestamp(
            entries
                .into_iter()
                .filter_map(|(k, v)| match (text_of(k), v) {
                    (Some(k), CqlValue::BigInt(n)) => Some((k, n)),
                    _ => None,
                })
                .collect(),
        ),
        CqlValue::Text(_) | CqlValue::Ascii(_) => {
            // `query_dbl_values` and `query_text_values` both store text
            // cells (decimals are persisted as their canonical string
            // form); try decimal first, text second.
            let mut decimals = std::collections::BTreeMap::new();
            let mut texts = std::collections::BTreeMap::new();
            let mut all_decimal = true;
            for (k, v) in entries {
                let Some(k) = text_of(k) else { continue };
                let text = match v {
                    CqlValue::Text(s) | CqlValue::Ascii(s) => s,
                    _ => continue,
                };
                match Decimal::from_str_exact(&text) {
                    Ok(d) => {
                        decimals.insert(k.clone(), d);
                    }
                    Err(_) => all_decimal = false,
                }
                texts.insert(k, text);
            }
            if all_decimal && !decimals.is_empty() {
                BoundValue::MapTextDecimal(decimals)
            } else {
                BoundValue::MapTextText(texts)
            }
        }
        _ => BoundValue::MapTextText(Default::default()),
    }
}

fn text_of(value: CqlValue) -> Option<String> {
    match value {
        CqlValue::Text(s) | CqlValue::Ascii(s) => Some(s),
        _ => None,
    }
}

fn to_cql_value(value: &BoundValue) -> CqlValue {
    match value {
        BoundValue::Text(s) => CqlValue::Text(s.clone()),
        BoundValue::Decimal(d) => CqlValue::Text(d.normalize().to_string()),
        BoundValue::Bool(b) => CqlValue::Boolean(*b),
        BoundValue::TimestampMillis(ms) => CqlValue::BigInt(*ms),
        BoundValue::TinyInt(t) => CqlValue::TinyInt(*t),
        BoundValue::Int(n) => CqlValue::Int(*n),
        BoundValue::Null => CqlValue::Empty,
        BoundValue::Vector(v) => CqlValue::List(
            v.iter()
                .map(|f| CqlValue::Float(*f))
                .collect::<Vec<_>>(),
        ),
        BoundValue::SetText(set) => CqlValue::Set(
            set.iter().map(|s| CqlValue::Text(s.clone())).collect::<Vec<_>>(),
        ),
        BoundValue::MapTextUsize(map) => CqlValue::Map(
            map.iter()
                .map(|(k, v)| (CqlValue::Text(k.clone()), CqlValue::Int(*v as i32)))
                .collect::<Vec<_>>(),
        ),
        BoundValue::MapTextBool(map) => CqlValue::Map(
            map.iter()
                .map(|(k, v)| (CqlValue::Text(k.clone()), CqlValue::Boolean(*v)))
                .collect::<Vec<_>>(),
        ),
        BoundValue::MapTextDecimal(map) => CqlValue::Map(
            map.iter()
                .map(|(k, v)| (CqlValue::Text(k.clone()), CqlValue::Text(v.normalize().to_string())))
                .collect::<Vec<_>>(),
        ),
        BoundValue::MapTextText(map) => CqlValue::Map(
            map.iter()
                .map(|(k, v)| (CqlValue::Text(k.clone()), CqlValue::Text(v.clone())))
                .collect::<Vec<_>>(),
        ),
        BoundValue::MapTextTimestamp(map) => CqlValue::Map(
            map.iter()
                .map(|(k, v)| (CqlValue::Text(k.clone()), CqlValue::BigInt(*v)))
                .collect::<Vec<_>>(),
        ),
    }
}
