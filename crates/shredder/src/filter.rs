//! Filter algebra: translate a filter clause into column
//! predicates for store-side pushdown, and provide an equivalent in-memory
//! evaluator over a raw document. Both paths must agree — the evaluator
//! here is also the thing operation executors use to confirm store-side
//! results before returning them to the caller.

use jsonapi_core::dotpath::DotPath;
use jsonapi_core::docid::DocIdTag;
use jsonapi_core::{DocId, JsonApiError};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

/// One of the ten supported filter operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    All,
    Size,
    Exists,
}

impl FilterOp {
    fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "$eq" => FilterOp::Eq,
            "$ne" => FilterOp::Ne,
            "$lt" => FilterOp::Lt,
            "$lte" => FilterOp::Lte,
            "$gt" => FilterOp::Gt,
            "$gte" => FilterOp::Gte,
            "$in" => FilterOp::In,
            "$all" => FilterOp::All,
            "$size" => FilterOp::Size,
            "$exists" => FilterOp::Exists,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

/// One parsed `{field: {$op: operand}}` predicate.
#[derive(Debug, Clone)]
pub struct FilterClause {
    pub path: DotPath,
    pub op: FilterOp,
    pub operand: JsonValue,
}

/// A fully parsed filter: an implicit AND across clauses (§4.4 — logical
/// combinators beyond that are out of scope).
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub clauses: Vec<FilterClause>,
}

impl Filter {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse `{field: value, ...}` / `{field: {$op: value, ...}, ...}`.
    pub fn parse(raw: &JsonValue) -> Result<Self, JsonApiError> {
        let obj = raw.as_object().ok_or_else(|| {
            JsonApiError::unsupported_filter_data_type("<filter>", "filter must be a JSON object")
        })?;
        let mut clauses = Vec::new();
        for (field, value) in obj.iter() {
            let path = DotPath::parse(field)
                .map_err(|_| JsonApiError::unsupported_filter_data_type(field, "invalid path"))?;
            if is_operator_object(value) {
                for (tag, operand) in value.as_object().unwrap().iter() {
                    let op = FilterOp::from_tag(tag).ok_or_else(|| {
                        JsonApiError::unsupported_filter_data_type(
                            field,
                            format!("unknown filter operator '{tag}'"),
                        )
                    })?;
                    clauses.push(FilterClause {
                        path: path.clone(),
                        op,
                        operand: operand.clone(),
                    });
                }
            } else {
                clauses.push(FilterClause {
                    path,
                    op: FilterOp::Eq,
                    operand: value.clone(),
                });
            }
        }
        Ok(Self { clauses })
    }

    /// Best-effort translation into column predicates for store pushdown.
    /// `$ne` can never be pushed down and
    /// always comes back as [`ColumnPredicate::PostRead`].
    pub fn predicates(&self) -> Result<Vec<ColumnPredicate>, JsonApiError> {
        self.clauses.iter().map(clause_to_predicate).collect()
    }

    /// In-memory evaluation against a raw (unshredded-shape) document —
    /// the authority the store-side predicates must agree with.
    pub fn matches(&self, doc: &JsonValue) -> Result<bool, JsonApiError> {
        for clause in &self.clauses {
            if !clause_matches(clause, doc)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// A single-key marker object recognized as a literal value rather than an
/// operator object — `{"$date": ...}` is an equality/comparison operand
/// shorthand (see `shred::as_extended_date`), not `{"$op": operand, ...}`.
fn is_extended_literal(value: &JsonValue) -> bool {
    matches!(value.as_object(), Some(map) if map.len() == 1 && map.contains_key("$date"))
}

fn is_operator_object(value: &JsonValue) -> bool {
    if is_extended_literal(value) {
        return false;
    }
    match value.as_object() {
        Some(map) if !map.is_empty() => map.keys().all(|k| k.starts_with('$')),
        _ => false,
    }
}

/// What a clause binds to on the store side. `PostRead` clauses are
/// evaluated in memory after the store returns candidate rows.
#[derive(Debug, Clone)]
pub enum ColumnPredicate {
    IdEq { tag: DocIdTag, text: String },
    Exists { path: String, expected: bool },
    ArraySizeEq { path: String, size: usize },
    ArrayContainsAny { path: String, entries: Vec<String> },
    ArrayContainsAll { path: String, entries: Vec<String> },
    BoolEq { path: String, value: bool },
    NullEq { path: String },
    TextEq { path: String, value: String },
    DblCompare { path: String, op: CompareOp, value: Decimal },
    /// Binds to `query_timestamp_values`, populated from `{"$date": ...}`
    /// leaves (mirrors `shred::as_extended_date`).
    TimestampEq { path: String, value: i64 },
    TimestampCompare { path: String, op: CompareOp, value: i64 },
    PostRead(FilterClause),
}

fn clause_to_predicate(clause: &FilterClause) -> Result<ColumnPredicate, JsonApiError> {
    let path = clause.path.to_string();
    if path == "_id" && clause.op == FilterOp::Eq {
        let id = DocId::from_json(Some(&clause.operand))?;
        let (tag, text) = id.to_key_tuple();
        return Ok(ColumnPredicate::IdEq { tag, text });
    }
    match clause.op {
        FilterOp::Exists => Ok(ColumnPredicate::Exists {
            path,
            expected: clause.operand.as_bool().unwrap_or(true),
        }),
        FilterOp::Size => {
            let size = clause
                .operand
                .as_u64()
                .ok_or_else(|| JsonApiError::unsupported_filter_data_type(&path, "$size requires an integer"))?;
            Ok(ColumnPredicate::ArraySizeEq {
                path,
                size: size as usize,
            })
        }
        FilterOp::In => Ok(ColumnPredicate::ArrayContainsAny {
            path: path.clone(),
            entries: operand_entries(&path, &clause.operand)?,
        }),
        FilterOp::All => Ok(ColumnPredicate::ArrayContainsAll {
            path: path.clone(),
            entries: operand_entries(&path, &clause.operand)?,
        }),
        FilterOp::Eq => Ok(scalar_eq_predicate(&path, &clause.operand)?),
        FilterOp::Lt | FilterOp::Lte | FilterOp::Gt | FilterOp::Gte => {
            let op = match clause.op {
                FilterOp::Lt => CompareOp::Lt,
                FilterOp::Lte => CompareOp::Lte,
                FilterOp::Gt => CompareOp::Gt,
                _ => CompareOp::Gte,
            };
            if let Some(millis) = crate::shred::as_extended_date(&clause.operand) {
                return Ok(ColumnPredicate::TimestampCompare { path, op, value: millis });
            }
            let value = clause.operand.as_number_decimal().ok_or_else(|| {
                JsonApiError::unsupported_filter_data_type(
                    &path,
                    "comparison operators require a number or a $date literal",
                )
            })?;
            Ok(ColumnPredicate::DblCompare { path, op, value })
        }
        FilterOp::Ne => Ok(ColumnPredicate::PostRead(clause.clone())),
    }
}

fn operand_entries(path: &str, operand: &JsonValue) -> Result<Vec<String>, JsonApiError> {
    let arr = operand.as_array().ok_or_else(|| {
        JsonApiError::unsupported_filter_data_type(path, "$in/$all require an array operand")
    })?;
    Ok(arr.iter().map(|v| crate::hash::array_entry_literal(path, v)).collect())
}

fn scalar_eq_predicate(path: &str, operand: &JsonValue) -> Result<ColumnPredicate, JsonApiError> {
    if let Some(millis) = crate::shred::as_extended_date(operand) {
        return Ok(ColumnPredicate::TimestampEq {
            path: path.to_string(),
            value: millis,
        });
    }
    Ok(match operand {
        JsonValue::Bool(b) => ColumnPredicate::BoolEq {
            path: path.to_string(),
            value: *b,
        },
        JsonValue::Null => ColumnPredicate::NullEq { path: path.to_string() },
        JsonValue::String(s) => ColumnPredicate::TextEq {
            path: path.to_string(),
            value: s.clone(),
        },
        JsonValue::Number(n) => {
            let value = Decimal::from_str_exact(&n.to_string()).map_err(|_| {
                JsonApiError::unsupported_filter_data_type(path, "number out of range for decimal")
            })?;
            ColumnPredicate::DblCompare {
                path: path.to_string(),
                op: CompareOp::Eq,
                value,
            }
        }
        JsonValue::Array(_) | JsonValue::Object(_) => {
            ColumnPredicate::ArrayContainsAny {
                path: path.to_string(),
                entries: vec![crate::hash::array_entry_literal(path, operand)],
            }
        }
    })
}

trait AsDecimal {
    fn as_number_decimal(&self) -> Option<Decimal>;
}

impl AsDecimal for JsonValue {
    fn as_number_decimal(&self) -> Option<Decimal> {
        match self {
            JsonValue::Number(n) => Decimal::from_str_exact(&n.to_string()).ok(),
            _ => None,
        }
    }
}

fn clause_matches(clause: &FilterClause, doc: &JsonValue) -> Result<bool, JsonApiError> {
    let found = clause.path.find_if_exists(doc);
    if clause.op == FilterOp::Exists {
        let expected = clause.operand.as_bool().unwrap_or(true);
        return Ok(found.exists() == expected);
    }
    let actual = match found.value() {
        Some(v) => v,
        None => return Ok(matches!(clause.op, FilterOp::Ne)),
    };
    Ok(match clause.op {
        FilterOp::Eq => match (
            crate::shred::as_extended_date(actual),
            crate::shred::as_extended_date(&clause.operand),
        ) {
            (Some(a), Some(b)) => a == b,
            _ => values_equal_or_contains(actual, &clause.operand),
        },
        FilterOp::Ne => match (
            crate::shred::as_extended_date(actual),
            crate::shred::as_extended_date(&clause.operand),
        ) {
            (Some(a), Some(b)) => a != b,
            _ => !values_equal_or_contains(actual, &clause.operand),
        },
        FilterOp::Size => match actual.as_array() {
            Some(arr) => clause.operand.as_u64() == Some(arr.len() as u64),
            None => false,
        },
        FilterOp::In => match actual.as_array() {
            Some(arr) => clause
                .operand
                .as_array()
                .map(|candidates| arr.iter().any(|e| candidates.contains(e)))
                .unwrap_or(false),
            None => clause
                .operand
                .as_array()
                .map(|candidates| candidates.contains(actual))
                .unwrap_or(false),
        },
        FilterOp::All => match (actual.as_array(), clause.operand.as_array()) {
            (Some(arr), Some(candidates)) => candidates.iter().all(|c| arr.contains(c)),
            _ => false,
        },
        FilterOp::Lt | FilterOp::Lte | FilterOp::Gt | FilterOp::Gte => {
            compare_numeric(actual, &clause.operand, clause.op)
        }
        FilterOp::Exists => unreachable!(),
    })
}

fn values_equal_or_contains(actual: &JsonValue, operand: &JsonValue) -> bool {
    if actual == operand {
        return true;
    }
    match actual.as_array() {
        Some(arr) => arr.contains(operand),
        None => false,
    }
}

fn compare_numeric(actual: &JsonValue, operand: &JsonValue, op: FilterOp) -> bool {
    if let (Some(a), Some(b)) = (
        crate::shred::as_extended_date(actual),
        crate::shred::as_extended_date(operand),
    ) {
        return match op {
            FilterOp::Lt => a < b,
            FilterOp::Lte => a <= b,
            FilterOp::Gt => a > b,
            FilterOp::Gte => a >= b,
            _ => false,
        };
    }
    let (a, b) = match (actual.as_number_decimal(), operand.as_number_decimal()) {
        (Some(a), Some(b)) => (a, b),
        _ => return false,
    };
    match op {
        FilterOp::Lt => a < b,
        FilterOp::Lte => a <= b,
        FilterOp::Gt => a > b,
        FilterOp::Gte => a >= b,
        _ => false,
    }
}
