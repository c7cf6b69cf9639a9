//! Parameterized statements and the result shape they return.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use jsonapi_core::docid::DocIdTag;
use rust_decimal::Decimal;

/// One bound CQL value. Mirrors the column types in the row
/// schema plus the handful of scalar kinds needed to bind filter operands
/// and primary keys.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    Text(String),
    Decimal(Decimal),
    Bool(bool),
    TimestampMillis(i64),
    TinyInt(i8),
    Int(i32),
    Null,
    Vector(Vec<f32>),
    SetText(BTreeSet<String>),
    MapTextUsize(BTreeMap<String, usize>),
    MapTextBool(BTreeMap<String, bool>),
    MapTextDecimal(BTreeMap<String, Decimal>),
    MapTextText(BTreeMap<String, String>),
    MapTextTimestamp(BTreeMap<String, i64>),
}

impl BoundValue {
    pub fn id_tag(tag: DocIdTag) -> Self {
        BoundValue::TinyInt(tag as i8)
    }
}

/// What kind of round trip this statement represents. Every driver/ORM
/// that issues ad-hoc CQL still tags statements with an intent for
/// metrics and retry classification; here it additionally lets
/// [`crate::memory::InMemoryStoreExecutor`] interpret a statement without
/// parsing the CQL text back out.
#[derive(Debug, Clone)]
pub enum StatementIntent {
    /// `comment` mirrors the real JSON API's convention of stashing a
    /// collection's options (vector dimension, similarity function, ...)
    /// as a JSON blob in the CQL table's `WITH comment = '...'` clause —
    /// it is both a human-readable annotation and the only piece of table
    /// metadata `CreateCollection` needs to recover on a later call.
    CreateTable { comment: Option<String> },
    CreateIndex,
    DropTable,
    /// Fetch one table's comment, if the table exists. Used by
    /// `CreateCollection` to compare a pre-existing table's settings
    /// against the requested ones.
    DescribeTable,
    InsertIfNotExists { row: Row },
    ConditionalUpdate { expected_tx_id: i64, row: Row },
    ConditionalDelete { expected_tx_id: i64 },
    SelectById,
    SelectScan,
    CountScan,
    /// `ORDER BY query_vector_value ANN OF ? LIMIT ?` — the caller ranks
    /// and trims the returned rows itself (§4.6), the same "scan, then
    /// re-evaluate in memory" convention `SelectScan` already uses.
    VectorScan { query: Vec<f32>, limit: i32 },
}

/// A parameterized CQL statement. `paging_state` carries the opaque
/// continuation token for a follow-up page of a `Find`/`FindOne` read.
#[derive(Debug, Clone)]
pub struct Statement {
    pub cql: String,
    pub keyspace: String,
    pub table: String,
    pub intent: StatementIntent,
    pub params: Vec<BoundValue>,
    pub page_size: Option<i32>,
    pub paging_state: Option<Vec<u8>>,
}

impl Statement {
    pub fn new(
        keyspace: impl Into<String>,
        table: impl Into<String>,
        cql: impl Into<String>,
        intent: StatementIntent,
    ) -> Self {
        Self {
            cql: cql.into(),
            keyspace: keyspace.into(),
            table: table.into(),
            intent,
            params: Vec::new(),
            page_size: None,
            paging_state: None,
        }
    }

    pub fn bind(mut self, value: BoundValue) -> Self {
        self.params.push(value);
        self
    }

    pub fn with_page_size(mut self, size: i32) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn with_paging_state(mut self, state: Option<Vec<u8>>) -> Self {
        self.paging_state = state;
        self
    }
}

/// One returned row, column name -> value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub columns: HashMap<String, BoundValue>,
}

impl Row {
    pub fn get(&self, name: &str) -> Option<&BoundValue> {
        self.columns.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.columns.get(name) {
            Some(BoundValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        match self.columns.get(name) {
            Some(BoundValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }
}

/// A page of rows plus an optional continuation token, and whether a
/// conditional (CAS) statement was applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultPage {
    pub rows: Vec<Row>,
    pub paging_state: Option<Vec<u8>>,
    pub was_applied: bool,
}

impl ResultPage {
    pub fn single_row(row: Row, was_applied: bool) -> Self {
        Self {
            rows: vec![row],
            paging_state: None,
            was_applied,
        }
    }

    pub fn empty(was_applied: bool) -> Self {
        Self {
            rows: Vec::new(),
            paging_state: None,
            was_applied,
        }
    }
}
