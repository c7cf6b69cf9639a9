//! Ties the envelope parser, command resolver, and operation executors
//! into one end-to-end command handler (§4.7).
//!
//! A [`Pipeline`] never propagates an `Err` to its caller — every
//! failure, from a malformed body to a store timeout, is folded into a
//! [`CommandResult`] with a populated `errors` array (§6). Concurrency is
//! bounded the same way the teacher's executor dispatch loop bounds
//! in-flight work: a fixed-size [`tokio::sync::Semaphore`] rejects
//! anything past the configured inflight budget with `SERVER_BUSY`
//! rather than queueing unbounded, and `tokio::time::timeout` turns a
//! stuck command into `REQUEST_TIMEOUT` instead of hanging the caller.

use std::sync::Arc;
use std::time::Duration;

use jsonapi_core::config::JsonApiConfig;
use jsonapi_core::limits::Limits;
use jsonapi_core::JsonApiError;
use jsonapi_operations::OperationOutput;
use jsonapi_schema_cache::SchemaCache;
use jsonapi_store::StoreExecutor;
use serde_json::Value as JsonValue;
use tokio::sync::Semaphore;

use jsonapi_operations::CommandContext;

use crate::command::CommandTag;
use crate::envelope::{CommandEnvelope, CommandResult, PipelineError};
use crate::resolve::{resolve, Operation};

/// The assembled command pipeline. One instance is shared (behind an
/// `Arc`) across every request an embedding process handles.
pub struct Pipeline {
    executor: Arc<dyn StoreExecutor>,
    schema_cache: SchemaCache,
    config: JsonApiConfig,
    limits: Limits,
    inflight: Semaphore,
}

impl Pipeline {
    pub fn new(executor: Arc<dyn StoreExecutor>, config: JsonApiConfig) -> Self {
        let schema_cache = SchemaCache::new(
            Duration::from_secs(config.schema_cache.ttl_seconds),
            config.schema_cache.max_size,
        );
        let inflight = Semaphore::new(config.operations.max_inflight_requests);
        Self {
            executor,
            schema_cache,
            config,
            limits: Limits::default(),
            inflight,
        }
    }

    pub fn config(&self) -> &JsonApiConfig {
        &self.config
    }

    /// Parse, resolve, and execute a raw request body.
    pub async fn handle_str(&self, context: CommandContext, raw: &str) -> CommandResult {
        match CommandEnvelope::from_str(raw) {
            Ok(envelope) => self.handle(context, envelope).await,
            Err(err) => CommandResult::from_pipeline_error(&err),
        }
    }

    /// Parse, resolve, and execute an already-decoded request body.
    pub async fn handle_value(&self, context: CommandContext, raw: JsonValue) -> CommandResult {
        match CommandEnvelope::from_value(raw) {
            Ok(envelope) => self.handle(context, envelope).await,
            Err(err) => CommandResult::from_pipeline_error(&err),
        }
    }

    async fn handle(&self, context: CommandContext, envelope: CommandEnvelope) -> CommandResult {
        let _permit = match self.inflight.try_acquire() {
            Ok(permit) => permit,
            Err(_) => return CommandResult::from_error(&JsonApiError::ServerBusy),
        };

        let deadline = Duration::from_millis(self.config.operations.request_timeout_millis);
        match tokio::time::timeout(deadline, self.dispatch(context, envelope)).await {
            Ok(result) => result,
            Err(_) => CommandResult::from_error(&JsonApiError::RequestTimeout {
                elapsed_ms: self.config.operations.request_timeout_millis,
            }),
        }
    }

    async fn dispatch(&self, context: CommandContext, envelope: CommandEnvelope) -> CommandResult {
        let tag = match CommandTag::from_str(&envelope.tag) {
            Some(tag) => tag,
            None => {
                return CommandResult::from_pipeline_error(&PipelineError::UnknownCommand(
                    envelope.tag.clone(),
                ))
            }
        };

        let operation = match resolve(tag, envelope.params, context, &self.limits) {
            Ok(op) => op,
            Err(err) => return CommandResult::from_pipeline_error(&err),
        };
        let shape = operation.data_shape();

        match self.execute(operation).await {
            Ok(output) => CommandResult::from_output(output, shape),
            Err(err) => CommandResult::from_error(&err),
        }
    }

    async fn execute(&self, operation: Operation) -> Result<OperationOutput, JsonApiError> {
        let executor = self.executor.as_ref();
        match operation {
            Operation::CreateCollection(op) => {
                op.execute(executor, &self.schema_cache, &self.config).await
            }
            Operation::DropCollection(op) => op.execute(executor, &self.schema_cache).await,
            Operation::FindCollections(op) => op.execute(executor).await,
            Operation::InsertOne(op) => op.execute(executor).await,
            Operation::InsertMany(op) => op.execute(executor).await,
            Operation::Find(op) => op.execute(executor, &self.schema_cache, &self.config).await,
            Operation::FindOne(op) => op.execute(executor, &self.schema_cache).await,
            Operation::Count(op) => op.execute(executor).await,
            Operation::UpdateOne(op) => op.execute(executor, &self.config).await,
            Operation::UpdateMany(op) => op.execute(executor, &self.config).await,
            Operation::FindOneAndUpdate(op) => op.execute(executor, &self.config).await,
            Operation::DeleteOne(op) => op.execute(executor, &self.config).await,
            Operation::DeleteMany(op) => op.execute(executor, &self.config).await,
            Operation::FindOneAndDelete(op) => op.execute(executor, &self.config).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonapi_store::InMemoryStoreExecutor;
    use serde_json::json;

    fn ctx() -> CommandContext {
        CommandContext::new(None, "ns", Some("c".to_string()))
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(Arc::new(InMemoryStoreExecutor::new()), JsonApiConfig::default())
    }

    #[tokio::test]
    async fn insert_then_find_one_round_trips() {
        let pipeline = pipeline();
        let insert = pipeline
            .handle_value(ctx(), json!({"insertOne": {"document": {"_id": "a", "n": 1}}}))
            .await;
        assert!(insert.errors.is_empty());

        let found = pipeline
            .handle_value(ctx(), json!({"findOne": {"filter": {"_id": "a"}}}))
            .await;
        assert!(found.errors.is_empty());
        match found.data {
            Some(crate::envelope::DataSection::Document { document }) => {
                assert_eq!(document.unwrap()["n"], json!(1));
            }
            _ => panic!("expected a document data section"),
        }
    }

    #[tokio::test]
    async fn unknown_command_tag_reports_unknown_command() {
        let pipeline = pipeline();
        let result = pipeline.handle_value(ctx(), json!({"bogusCommand": {}})).await;
        assert_eq!(result.errors[0].exception_class, "JsonMappingException");
    }

    #[tokio::test]
    async fn malformed_body_reports_json_parse_exception() {
        let pipeline = pipeline();
        let result = pipeline.handle_str(ctx(), "{not json").await;
        assert_eq!(result.errors[0].exception_class, "JsonParseException");
    }

    #[tokio::test]
    async fn zero_inflight_budget_always_reports_server_busy() {
        let mut config = JsonApiConfig::default();
        config.operations.max_inflight_requests = 0;
        let pipeline = Pipeline::new(Arc::new(InMemoryStoreExecutor::new()), config);
        let result = pipeline
            .handle_value(ctx(), json!({"insertOne": {"document": {"n": 1}}}))
            .await;
        assert_eq!(result.errors[0].error_code, "SERVER_BUSY");
    }

    #[tokio::test]
    async fn vector_sort_against_non_vector_collection_is_rejected() {
        let pipeline = pipeline();
        pipeline
            .handle_value(
                CommandContext::new(None, "ns", None),
                json!({"createCollection": {"name": "c"}}),
            )
            .await;
        let result = pipeline
            .handle_value(ctx(), json!({"find": {"sort": {"$vector": [0.1, 0.2]}}}))
            .await;
        assert_eq!(result.errors[0].error_code, "UNSUPPORTED_FILTER_DATA_TYPE");
    }

    #[tokio::test]
    async fn vector_sort_ranks_results_by_similarity() {
        let pipeline = pipeline();
        pipeline
            .handle_value(
                CommandContext::new(None, "ns", None),
                json!({"createCollection": {"name": "c", "options": {"vector": {"enabled": true, "size": 2, "function": "cosine"}}}}),
            )
            .await;
        pipeline
            .handle_value(
                ctx(),
                json!({"insertOne": {"document": {"_id": "near", "$vector": [1.0, 0.0]}}}),
            )
            .await;
        pipeline
            .handle_value(
                ctx(),
                json!({"insertOne": {"document": {"_id": "far", "$vector": [0.0, 1.0]}}}),
            )
            .await;

        let result = pipeline
            .handle_value(ctx(), json!({"findOne": {"sort": {"$vector": [1.0, 0.0]}}}))
            .await;
        match result.data {
            Some(crate::envelope::DataSection::Document { document }) => {
                assert_eq!(document.unwrap()["_id"], json!("near"));
            }
            _ => panic!("expected a document data section"),
        }
    }

    #[tokio::test]
    async fn create_collection_then_find_collections_lists_it() {
        let pipeline = pipeline();
        pipeline
            .handle_value(
                CommandContext::new(None, "ns", None),
                json!({"createCollection": {"name": "c"}}),
            )
            .await;
        let result = pipeline
            .handle_value(CommandContext::new(None, "ns", None), json!({"findCollections": {}}))
            .await;
        assert!(result.errors.is_empty());
    }
}
