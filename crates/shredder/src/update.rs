//! Update algebra: parse an update clause, validate it, and
//! apply it in place to a JSON document. The caller re-shreds the result.

use jsonapi_core::dotpath::DotPath;
use jsonapi_core::JsonApiError;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

/// One of the eleven supported update operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOperator {
    Set,
    Unset,
    Inc,
    Push,
    Pop,
    AddToSet,
    Rename,
    Mul,
    Min,
    Max,
    SetOnInsert,
}

impl UpdateOperator {
    fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "$set" => UpdateOperator::Set,
            "$unset" => UpdateOperator::Unset,
            "$inc" => UpdateOperator::Inc,
            "$push" => UpdateOperator::Push,
            "$pop" => UpdateOperator::Pop,
            "$addToSet" => UpdateOperator::AddToSet,
            "$rename" => UpdateOperator::Rename,
            "$mul" => UpdateOperator::Mul,
            "$min" => UpdateOperator::Min,
            "$max" => UpdateOperator::Max,
            "$setOnInsert" => UpdateOperator::SetOnInsert,
            _ => return None,
        })
    }
}

/// One `{path: operand}` entry under an operator.
#[derive(Debug, Clone)]
pub struct UpdateOp {
    pub path: DotPath,
    pub operator: UpdateOperator,
    pub operand: JsonValue,
}

/// A fully parsed update clause: `{$op: {path: operand, ...}, ...}`.
#[derive(Debug, Clone, Default)]
pub struct UpdateClause {
    pub ops: Vec<UpdateOp>,
}

impl UpdateClause {
    /// Parse `{"$set": {...}, "$inc": {...}, ...}`.
    ///
    /// Rejects a raw path `_id` under any operator, and rejects an
    /// operator set where two paths in the clause are ancestor/descendant
    /// of one another — the same non-overlap rule applies to every
    /// operator so two clauses can never race to write through the same
    /// subtree.
    pub fn parse(raw: &JsonValue) -> Result<Self, JsonApiError> {
        let obj = raw.as_object().ok_or_else(|| {
            JsonApiError::unsupported_update_operation_path("<update>", "update must be a JSON object")
        })?;
        let mut ops = Vec::new();
        for (tag, body) in obj.iter() {
            let operator = UpdateOperator::from_tag(tag).ok_or_else(|| {
                JsonApiError::unsupported_update_operation_path(
                    tag,
                    "unknown update operator",
                )
            })?;
            let body_obj = body.as_object().ok_or_else(|| {
                JsonApiError::unsupported_update_operation_path(
                    tag,
                    "operator body must be a JSON object of path -> operand",
                )
            })?;
            for (path_str, operand) in body_obj.iter() {
                if path_str == "_id" {
                    return Err(JsonApiError::unsupported_update_operation_path(
                        path_str,
                        "_id is immutable",
                    ));
                }
                let path = DotPath::parse(path_str)?;
                if operator == UpdateOperator::Rename {
                    let target = operand.as_str().ok_or_else(|| {
                        JsonApiError::unsupported_update_operation_path(
                            path_str,
                            "$rename target must be a string path",
                        )
                    })?;
                    if target == "_id" {
                        return Err(JsonApiError::unsupported_update_operation_path(
                            target,
                            "_id is immutable",
                        ));
                    }
                    DotPath::parse(target)?;
                }
                ops.push(UpdateOp {
                    path,
                    operator,
                    operand: operand.clone(),
                });
            }
        }
        check_no_overlap(&ops)?;
        Ok(Self { ops })
    }

    /// Apply every operator to `doc` in place. `is_upsert_insert` gates
    /// `$setOnInsert`: it only applies when this update is producing a
    /// brand-new document.
    pub fn apply(&self, doc: &mut JsonValue, is_upsert_insert: bool) -> Result<(), JsonApiError> {
        for op in &self.ops {
            match op.operator {
                UpdateOperator::Set => {
                    op.path.find_or_create(doc)?.set(op.operand.clone());
                }
                UpdateOperator::SetOnInsert => {
                    if is_upsert_insert {
                        op.path.find_or_create(doc)?.set(op.operand.clone());
                    }
                }
                UpdateOperator::Unset => {
                    if op.path.find_if_exists(doc).exists() {
                        let mut found = op.path.find_or_create(doc)?;
                        found.remove();
                    }
                }
                UpdateOperator::Inc => apply_numeric(doc, op, NumericFold::Add)?,
                UpdateOperator::Mul => apply_numeric(doc, op, NumericFold::Mul)?,
                UpdateOperator::Min => apply_numeric(doc, op, NumericFold::Min)?,
                UpdateOperator::Max => apply_numeric(doc, op, NumericFold::Max)?,
                UpdateOperator::Push => apply_push(doc, op)?,
                UpdateOperator::Pop => apply_pop(doc, op)?,
                UpdateOperator::AddToSet => apply_add_to_set(doc, op)?,
                UpdateOperator::Rename => apply_rename(doc, op)?,
            }
        }
        Ok(())
    }
}

/// Reject a clause where one path is an ancestor of another — applying
/// both could silently clobber one through the other depending on order.
fn check_no_overlap(ops: &[UpdateOp]) -> Result<(), JsonApiError> {
    for (i, a) in ops.iter().enumerate() {
        for b in ops.iter().skip(i + 1) {
            if a.path.is_sub_path_of(&b.path) || b.path.is_sub_path_of(&a.path) {
                return Err(JsonApiError::unsupported_update_operation_path(
                    a.path.to_string(),
                    format!("conflicts with '{}': paths overlap", b.path),
                ));
            }
        }
    }
    Ok(())
}

enum NumericFold {
    Add,
    Mul,
    Min,
    Max,
}

fn apply_numeric(doc: &mut JsonValue, op: &UpdateOp, fold: NumericFold) -> Result<(), JsonApiError> {
    let operand = as_decimal(&op.operand).ok_or_else(|| {
        JsonApiError::unsupported_update_operation_path(
            op.path.to_string(),
            "operand must be numeric",
        )
    })?;
    let mut found = op.path.find_or_create(doc)?;
    let current = found.get().cloned().unwrap_or(JsonValue::Null);
    let next = if current.is_null() {
        operand
    } else {
        let existing = as_decimal(&current).ok_or_else(|| {
            JsonApiError::unsupported_update_operation_path(
                op.path.to_string(),
                "existing value is not numeric",
            )
        })?;
        match fold {
            NumericFold::Add => existing + operand,
            NumericFold::Mul => existing * operand,
            NumericFold::Min => existing.min(operand),
            NumericFold::Max => existing.max(operand),
        }
    };
    found.set(decimal_to_json(next));
    Ok(())
}

fn apply_push(doc: &mut JsonValue, op: &UpdateOp) -> Result<(), JsonApiError> {
    let mut found = op.path.find_or_create(doc)?;
    let current = found.get().cloned().unwrap_or(JsonValue::Null);
    let mut arr = match current {
        JsonValue::Null => Vec::new(),
        JsonValue::Array(items) => items,
        _ => {
            return Err(JsonApiError::unsupported_update_operation_path(
                op.path.to_string(),
                "$push requires an array or absent field",
            ))
        }
    };
    arr.push(op.operand.clone());
    found.set(JsonValue::Array(arr));
    Ok(())
}

fn apply_pop(doc: &mut JsonValue, op: &UpdateOp) -> Result<(), JsonApiError> {
    let mut found = op.path.find_or_create(doc)?;
    let current = found.get().cloned().unwrap_or(JsonValue::Null);
    let mut arr = match current {
        JsonValue::Array(items) => items,
        _ => {
            return Err(JsonApiError::unsupported_update_operation_path(
                op.path.to_string(),
                "$pop requires an array",
            ))
        }
    };
    if arr.is_empty() {
        return Ok(());
    }
    if op.operand.as_i64() == Some(-1) {
        arr.remove(0);
    } else {
        arr.pop();
    }
    found.set(JsonValue::Array(arr));
    Ok(())
}

fn apply_add_to_set(doc: &mut JsonValue, op: &UpdateOp) -> Result<(), JsonApiError> {
    let mut found = op.path.find_or_create(doc)?;
    let current = found.get().cloned().unwrap_or(JsonValue::Null);
    let mut arr = match current {
        JsonValue::Null => Vec::new(),
        JsonValue::Array(items) => items,
        _ => {
            return Err(JsonApiError::unsupported_update_operation_path(
                op.path.to_string(),
                "$addToSet requires an array or absent field",
            ))
        }
    };
    if !arr.contains(&op.operand) {
        arr.push(op.operand.clone());
    }
    found.set(JsonValue::Array(arr));
    Ok(())
}

fn apply_rename(doc: &mut JsonValue, op: &UpdateOp) -> Result<(), JsonApiError> {
    if !op.path.find_if_exists(doc).exists() {
        return Ok(());
    }
    let target = op
        .operand
        .as_str()
        .expect("parse validated $rename operand is a string")
        .to_string();
    let target_path = DotPath::parse(&target)?;

    let mut source = op.path.find_or_create(doc)?;
    let value = source.remove().expect("existence just confirmed above");
    target_path.find_or_create(doc)?.set(value);
    Ok(())
}

fn as_decimal(value: &JsonValue) -> Option<Decimal> {
    match value {
        JsonValue::Number(n) => Decimal::from_str_exact(&n.to_string()).ok(),
        _ => None,
    }
}

fn decimal_to_json(value: Decimal) -> JsonValue {
    serde_json::from_str::<serde_json::Number>(&value.normalize().to_string())
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_creates_nested_path() {
        let clause = UpdateClause::parse(&json!({"$set": {"a.b": 1}})).unwrap();
        let mut doc = json!({});
        clause.apply(&mut doc, false).unwrap();
        assert_eq!(doc, json!({"a": {"b": 1}}));
    }

    #[test]
    fn unset_removes_field() {
        let clause = UpdateClause::parse(&json!({"$unset": {"a": ""}})).unwrap();
        let mut doc = json!({"a": 1, "b": 2});
        clause.apply(&mut doc, false).unwrap();
        assert_eq!(doc, json!({"b": 2}));
    }

    #[test]
    fn inc_on_missing_field_seeds_with_operand() {
        let clause = UpdateClause::parse(&json!({"$inc": {"n": 5}})).unwrap();
        let mut doc = json!({});
        clause.apply(&mut doc, false).unwrap();
        assert_eq!(doc["n"], json!(5));
    }

    #[test]
    fn inc_twice_accumulates() {
        let clause = UpdateClause::parse(&json!({"$inc": {"n": 1}})).unwrap();
        let mut doc = json!({"n": 0});
        clause.apply(&mut doc, false).unwrap();
        clause.apply(&mut doc, false).unwrap();
        assert_eq!(doc["n"], json!(2));
    }

    #[test]
    fn inc_on_non_numeric_existing_value_fails() {
        let clause = UpdateClause::parse(&json!({"$inc": {"n": 1}})).unwrap();
        let mut doc = json!({"n": "not a number"});
        assert!(clause.apply(&mut doc, false).is_err());
    }

    #[test]
    fn push_onto_absent_field_creates_array() {
        let clause = UpdateClause::parse(&json!({"$push": {"tags": "x"}})).unwrap();
        let mut doc = json!({});
        clause.apply(&mut doc, false).unwrap();
        assert_eq!(doc["tags"], json!(["x"]));
    }

    #[test]
    fn push_onto_non_array_fails() {
        let clause = UpdateClause::parse(&json!({"$push": {"tags": "x"}})).unwrap();
        let mut doc = json!({"tags": "not an array"});
        assert!(clause.apply(&mut doc, false).is_err());
    }

    #[test]
    fn add_to_set_is_idempotent() {
        let clause = UpdateClause::parse(&json!({"$addToSet": {"tags": "x"}})).unwrap();
        let mut doc = json!({"tags": ["x"]});
        clause.apply(&mut doc, false).unwrap();
        assert_eq!(doc["tags"], json!(["x"]));
    }

    #[test]
    fn pop_last_by_default() {
        let clause = UpdateClause::parse(&json!({"$pop": {"tags": 1}})).unwrap();
        let mut doc = json!({"tags": ["a", "b", "c"]});
        clause.apply(&mut doc, false).unwrap();
        assert_eq!(doc["tags"], json!(["a", "b"]));
    }

    #[test]
    fn pop_first_with_negative_one() {
        let clause = UpdateClause::parse(&json!({"$pop": {"tags": -1}})).unwrap();
        let mut doc = json!({"tags": ["a", "b", "c"]});
        clause.apply(&mut doc, false).unwrap();
        assert_eq!(doc["tags"], json!(["b", "c"]));
    }

    #[test]
    fn rename_moves_value() {
        let clause = UpdateClause::parse(&json!({"$rename": {"old": "new"}})).unwrap();
        let mut doc = json!({"old": 42});
        clause.apply(&mut doc, false).unwrap();
        assert_eq!(doc, json!({"new": 42}));
    }

    #[test]
    fn rename_to_id_is_rejected() {
        assert!(UpdateClause::parse(&json!({"$rename": {"old": "_id"}})).is_err());
    }

    #[test]
    fn set_on_id_is_rejected() {
        assert!(UpdateClause::parse(&json!({"$set": {"_id": "x"}})).is_err());
    }

    #[test]
    fn set_on_insert_applies_only_for_new_documents() {
        let clause = UpdateClause::parse(&json!({"$setOnInsert": {"created": true}})).unwrap();
        let mut existing = json!({});
        clause.apply(&mut existing, false).unwrap();
        assert_eq!(existing, json!({}));

        let mut inserted = json!({});
        clause.apply(&mut inserted, true).unwrap();
        assert_eq!(inserted, json!({"created": true}));
    }

    #[test]
    fn overlapping_paths_are_rejected() {
        let err = UpdateClause::parse(&json!({"$set": {"a": 1, "a.b": 2}})).unwrap_err();
        assert_eq!(
            err.error_code(),
            jsonapi_core::error::ErrorCode::UnsupportedUpdateOperationPath
        );
    }

    #[test]
    fn min_max_compare_against_existing() {
        let clause = UpdateClause::parse(&json!({"$min": {"n": 5}})).unwrap();
        let mut doc = json!({"n": 10});
        clause.apply(&mut doc, false).unwrap();
        assert_eq!(doc["n"], json!(5));
    }
}
