//! Maps a parsed [`CommandTag`] + its JSON params into a concrete
//! [`Operation`] ready to execute, given the [`CommandContext`] the
//! surrounding request already resolved (§4.7 step 2).
//!
//! This is also where bean-style constraint validation happens — document
//! size/depth limits are checked here, before a document ever reaches the
//! shredder, the same point the teacher validates primitives before
//! touching storage.

use jsonapi_core::limits::Limits;
use jsonapi_core::JsonApiError;
use jsonapi_shredder::{Filter, UpdateClause};
use serde_json::Value as JsonValue;

use jsonapi_operations::{
    CollectionSettings, CommandContext, Count, CreateCollection, Delete, DeleteMany,
    DropCollection, Find, FindCollections, FindOne, FindOneAndDelete, FindOneAndUpdate, Insert,
    InsertMany, Update, UpdateMany,
};

use crate::command::{
    CommandTag, CreateCollectionParams, FilterOnlyParams, FindOneParams, FindParams,
    InsertManyParams, InsertOneParams, NamedCollectionParams, UpdateParams,
};
use crate::envelope::PipelineError;

/// What shape of `data` section a resolved operation's output should be
/// folded into — determined by which command was asked for, not by
/// whether the operation happened to find anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataShape {
    None,
    SingleDocument,
    ManyDocuments,
}

/// A concrete, ready-to-run operation plus the shape its output should
/// take in the response envelope.
pub enum Operation {
    CreateCollection(CreateCollection),
    DropCollection(DropCollection),
    FindCollections(FindCollections),
    InsertOne(Insert),
    InsertMany(InsertMany),
    Find(Find),
    FindOne(FindOne),
    Count(Count),
    UpdateOne(Update),
    UpdateMany(UpdateMany),
    FindOneAndUpdate(FindOneAndUpdate),
    DeleteOne(Delete),
    DeleteMany(DeleteMany),
    FindOneAndDelete(FindOneAndDelete),
}

impl Operation {
    /// The `data` section shape fixed by the command, independent of the
    /// documents it actually returns (§4.7 step 3).
    pub fn data_shape(&self) -> DataShape {
        match self {
            Operation::CreateCollection(_)
            | Operation::DropCollection(_)
            | Operation::InsertOne(_)
            | Operation::InsertMany(_)
            | Operation::UpdateOne(_)
            | Operation::UpdateMany(_)
            | Operation::DeleteOne(_)
            | Operation::DeleteMany(_)
            | Operation::Count(_) => DataShape::None,
            Operation::FindCollections(_) => DataShape::None,
            Operation::FindOne(_) | Operation::FindOneAndUpdate(_) | Operation::FindOneAndDelete(_) => {
                DataShape::SingleDocument
            }
            Operation::Find(_) => DataShape::ManyDocuments,
        }
    }
}

fn validate_document(doc: &JsonValue, limits: &Limits) -> Result<(), PipelineError> {
    let doc_json = serde_json::to_string(doc)
        .map_err(|e| PipelineError::constraint_violation(format!("document is not serializable: {e}")))?;
    limits
        .validate_size(&doc_json)
        .map_err(PipelineError::constraint_violation)?;
    limits
        .validate_depth(doc)
        .map_err(PipelineError::constraint_violation)?;
    Ok(())
}

fn parse_filter(raw: &JsonValue, limits: &Limits) -> Result<Filter, JsonApiError> {
    let filter = Filter::parse(raw)?;
    for clause in &filter.clauses {
        limits
            .validate_path_length(clause.path.len())
            .map_err(|msg| JsonApiError::unsupported_filter_data_type(clause.path.to_string(), msg))?;
    }
    Ok(filter)
}

fn parse_update(raw: &JsonValue, limits: &Limits) -> Result<UpdateClause, JsonApiError> {
    let update = UpdateClause::parse(raw)?;
    for op in &update.ops {
        limits
            .validate_path_length(op.path.len())
            .map_err(|msg| JsonApiError::unsupported_update_operation_path(op.path.to_string(), msg))?;
    }
    Ok(update)
}

/// Pull a `$vector` query out of a `sort` clause (§4.6 — "vector operations
/// additionally append `ORDER BY query_vector_value ANN OF ?`"). Absent
/// `sort` means ordinary `_id` ordering; a `sort` present without
/// `$vector` is rejected rather than silently ignored.
fn parse_vector_sort(raw: Option<&JsonValue>) -> Result<Option<Vec<f32>>, JsonApiError> {
    let Some(sort) = raw else { return Ok(None) };
    let vector = sort
        .get("$vector")
        .ok_or_else(|| JsonApiError::unsupported_filter_data_type("sort", "sort requires a '$vector' clause"))?;
    let entries = vector
        .as_array()
        .ok_or_else(|| JsonApiError::unsupported_filter_data_type("sort.$vector", "must be an array of numbers"))?;
    let query = entries
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| JsonApiError::unsupported_filter_data_type("sort.$vector", "must contain only numbers"))
        })
        .collect::<Result<Vec<f32>, JsonApiError>>()?;
    Ok(Some(query))
}

/// Resolve one command into a runnable [`Operation`]. `context` must
/// already carry the right namespace/collection for the tag (schema
/// commands only need a namespace; every document command needs a
/// collection too — enforced by [`CommandContext::require_collection`]
/// inside each operation's own `execute`).
pub fn resolve(
    tag: CommandTag,
    params: JsonValue,
    context: CommandContext,
    limits: &Limits,
) -> Result<Operation, PipelineError> {
    match tag {
        CommandTag::CreateCollection => {
            let params: CreateCollectionParams = serde_json::from_value(params)
                .map_err(|e| PipelineError::constraint_violation(e.to_string()))?;
            let settings = match params.options.vector {
                Some(v) => CollectionSettings {
                    vector_enabled: v.enabled,
                    vector_size: v.size,
                    similarity_function: v.similarity_function,
                    comment: None,
                },
                None => CollectionSettings::default(),
            };
            Ok(Operation::CreateCollection(CreateCollection {
                context,
                name: params.name,
                settings,
            }))
        }
        CommandTag::DropCollection => {
            let params: NamedCollectionParams = serde_json::from_value(params)
                .map_err(|e| PipelineError::constraint_violation(e.to_string()))?;
            Ok(Operation::DropCollection(DropCollection {
                context,
                name: params.name,
            }))
        }
        CommandTag::FindCollections => Ok(Operation::FindCollections(FindCollections { context })),
        CommandTag::InsertOne => {
            let params: InsertOneParams = serde_json::from_value(params)
                .map_err(|e| PipelineError::constraint_violation(e.to_string()))?;
            validate_document(&params.document, limits)?;
            Ok(Operation::InsertOne(Insert {
                context,
                document: params.document,
            }))
        }
        CommandTag::InsertMany => {
            let params: InsertManyParams = serde_json::from_value(params)
                .map_err(|e| PipelineError::constraint_violation(e.to_string()))?;
            for doc in &params.documents {
                validate_document(doc, limits)?;
            }
            Ok(Operation::InsertMany(InsertMany {
                context,
                documents: params.documents,
            }))
        }
        CommandTag::Find => {
            let params: FindParams = serde_json::from_value(params)
                .map_err(|e| PipelineError::constraint_violation(e.to_string()))?;
            let filter =
                parse_filter(&params.filter, limits).map_err(|e| PipelineError::constraint_violation(e.to_string()))?;
            let vector_sort = parse_vector_sort(params.sort.as_ref())
                .map_err(|e| PipelineError::constraint_violation(e.to_string()))?;
            Ok(Operation::Find(Find {
                context,
                filter,
                limit: params.limit,
                page_state: params.page_state,
                vector_sort,
            }))
        }
        CommandTag::FindOne => {
            let params: FindOneParams = serde_json::from_value(params)
                .map_err(|e| PipelineError::constraint_violation(e.to_string()))?;
            let filter =
                parse_filter(&params.filter, limits).map_err(|e| PipelineError::constraint_violation(e.to_string()))?;
            let vector_sort = parse_vector_sort(params.sort.as_ref())
                .map_err(|e| PipelineError::constraint_violation(e.to_string()))?;
            Ok(Operation::FindOne(FindOne { context, filter, vector_sort }))
        }
        CommandTag::CountDocuments => {
            let params: FilterOnlyParams = serde_json::from_value(params)
                .map_err(|e| PipelineError::constraint_violation(e.to_string()))?;
            let filter =
                parse_filter(&params.filter, limits).map_err(|e| PipelineError::constraint_violation(e.to_string()))?;
            Ok(Operation::Count(Count { context, filter }))
        }
        CommandTag::UpdateOne => {
            let params: UpdateParams = serde_json::from_value(params)
                .map_err(|e| PipelineError::constraint_violation(e.to_string()))?;
            let filter =
                parse_filter(&params.filter, limits).map_err(|e| PipelineError::constraint_violation(e.to_string()))?;
            let update =
                parse_update(&params.update, limits).map_err(|e| PipelineError::constraint_violation(e.to_string()))?;
            Ok(Operation::UpdateOne(Update {
                context,
                filter,
                update,
                upsert: params.upsert,
            }))
        }
        CommandTag::UpdateMany => {
            let params: UpdateParams = serde_json::from_value(params)
                .map_err(|e| PipelineError::constraint_violation(e.to_string()))?;
            let filter =
                parse_filter(&params.filter, limits).map_err(|e| PipelineError::constraint_violation(e.to_string()))?;
            let update =
                parse_update(&params.update, limits).map_err(|e| PipelineError::constraint_violation(e.to_string()))?;
            Ok(Operation::UpdateMany(UpdateMany {
                context,
                filter,
                update,
            }))
        }
        CommandTag::FindOneAndUpdate => {
            let params: UpdateParams = serde_json::from_value(params)
                .map_err(|e| PipelineError::constraint_violation(e.to_string()))?;
            let filter =
                parse_filter(&params.filter, limits).map_err(|e| PipelineError::constraint_violation(e.to_string()))?;
            let update =
                parse_update(&params.update, limits).map_err(|e| PipelineError::constraint_violation(e.to_string()))?;
            Ok(Operation::FindOneAndUpdate(FindOneAndUpdate {
                context,
                filter,
                update,
                upsert: params.upsert,
            }))
        }
        CommandTag::DeleteOne => {
            let params: FilterOnlyParams = serde_json::from_value(params)
                .map_err(|e| PipelineError::constraint_violation(e.to_string()))?;
            let filter =
                parse_filter(&params.filter, limits).map_err(|e| PipelineError::constraint_violation(e.to_string()))?;
            Ok(Operation::DeleteOne(Delete { context, filter }))
        }
        CommandTag::DeleteMany => {
            let params: FilterOnlyParams = serde_json::from_value(params)
                .map_err(|e| PipelineError::constraint_violation(e.to_string()))?;
            let filter =
                parse_filter(&params.filter, limits).map_err(|e| PipelineError::constraint_violation(e.to_string()))?;
            Ok(Operation::DeleteMany(DeleteMany { context, filter }))
        }
        CommandTag::FindOneAndDelete => {
            let params: FilterOnlyParams = serde_json::from_value(params)
                .map_err(|e| PipelineError::constraint_violation(e.to_string()))?;
            let filter =
                parse_filter(&params.filter, limits).map_err(|e| PipelineError::constraint_violation(e.to_string()))?;
            Ok(Operation::FindOneAndDelete(FindOneAndDelete { context, filter }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> CommandContext {
        CommandContext::new(None, "ns", Some("c".to_string()))
    }

    #[test]
    fn insert_one_resolves_with_none_data_shape() {
        let op = resolve(
            CommandTag::InsertOne,
            json!({"document": {"a": 1}}),
            ctx(),
            &Limits::default(),
        )
        .unwrap();
        assert_eq!(op.data_shape(), DataShape::None);
    }

    #[test]
    fn find_one_resolves_with_single_document_shape() {
        let op = resolve(CommandTag::FindOne, json!({}), ctx(), &Limits::default()).unwrap();
        assert_eq!(op.data_shape(), DataShape::SingleDocument);
    }

    #[test]
    fn find_resolves_with_many_documents_shape() {
        let op = resolve(CommandTag::Find, json!({}), ctx(), &Limits::default()).unwrap();
        assert_eq!(op.data_shape(), DataShape::ManyDocuments);
    }

    #[test]
    fn oversized_document_is_rejected_before_shredding() {
        let huge = json!({"a": "x".repeat(100)});
        let limits = Limits {
            max_document_size_bytes: 10,
            ..Limits::default()
        };
        let err = resolve(
            CommandTag::InsertOne,
            json!({"document": huge}),
            ctx(),
            &limits,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::ConstraintViolation(_)));
    }

    #[test]
    fn find_with_sort_missing_vector_is_constraint_violation() {
        let err = resolve(
            CommandTag::Find,
            json!({"sort": {"field": "x"}}),
            ctx(),
            &Limits::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::ConstraintViolation(_)));
    }

    #[test]
    fn find_with_vector_sort_resolves() {
        let op = resolve(
            CommandTag::Find,
            json!({"sort": {"$vector": [0.1, 0.2, 0.3]}}),
            ctx(),
            &Limits::default(),
        )
        .unwrap();
        match op {
            Operation::Find(find) => assert_eq!(find.vector_sort, Some(vec![0.1, 0.2, 0.3])),
            _ => panic!("expected Find"),
        }
    }

    #[test]
    fn unknown_update_operator_is_constraint_violation() {
        let err = resolve(
            CommandTag::UpdateOne,
            json!({"filter": {}, "update": {"$bogus": {"a": 1}}}),
            ctx(),
            &Limits::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::ConstraintViolation(_)));
    }

    #[test]
    fn overlong_filter_path_is_rejected() {
        let limits = Limits {
            max_path_length: 2,
            ..Limits::default()
        };
        let err = resolve(
            CommandTag::FindOne,
            json!({"filter": {"a.b.c": 1}}),
            ctx(),
            &limits,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::ConstraintViolation(_)));
    }

    #[test]
    fn overlong_update_path_is_rejected() {
        let limits = Limits {
            max_path_length: 2,
            ..Limits::default()
        };
        let err = resolve(
            CommandTag::UpdateOne,
            json!({"filter": {}, "update": {"$set": {"a.b.c": 1}}}),
            ctx(),
            &limits,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::ConstraintViolation(_)));
    }
}
