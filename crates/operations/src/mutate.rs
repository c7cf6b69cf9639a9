//! `Update`/`Delete` and their `FindOneAnd*`/`*Many` variants (§4.6):
//! read one matching document, apply the update/delete in-memory, then
//! CAS it back conditioned on the `tx_id` just read, retrying on conflict
//! up to `operations.max_retries`.

use std::collections::HashSet;

use jsonapi_core::config::JsonApiConfig;
use jsonapi_core::docid::DocIdTag;
use jsonapi_core::{DocId, JsonApiError};
use jsonapi_shredder::{Filter, FilterOp, Shredder, UpdateClause};
use jsonapi_store::{BoundValue, Statement, StatementIntent, StoreExecutor};
use serde_json::Value as JsonValue;

use crate::context::CommandContext;
use crate::insert::insert_cql;
use crate::output::OperationOutput;
use crate::read::{id_sort_key, matching_documents, select_by_id_cql};
use crate::row_codec;
use crate::tx_id::next_tx_id;

fn update_cql(keyspace: &str, table: &str) -> String {
    format!("UPDATE {keyspace}.{table} SET doc_json = ?, ... WHERE key_tag = ? AND key_text = ? IF tx_id = ?")
}

fn delete_cql(keyspace: &str, table: &str) -> String {
    format!("DELETE FROM {keyspace}.{table} WHERE key_tag = ? AND key_text = ? IF tx_id = ?")
}

fn key_of(doc: &JsonValue) -> Result<(DocIdTag, String), JsonApiError> {
    Ok(DocId::from_json(doc.get("_id"))?.to_key_tuple())
}

/// Build the seed document an upsert inserts when no row matched: the
/// equality clauses of the filter become the new document's fields, the
/// same convention Mongo-style upserts use so a subsequent lookup by the
/// filter's `_id` finds the document it just created.
fn seed_from_filter(filter: &Filter) -> Result<JsonValue, JsonApiError> {
    let mut doc = JsonValue::Object(serde_json::Map::new());
    for clause in &filter.clauses {
        if clause.op == FilterOp::Eq {
            clause.path.find_or_create(&mut doc)?.set(clause.operand.clone());
        }
    }
    Ok(doc)
}

enum UpdateAttempt {
    Modified { doc: JsonValue, upserted: bool },
    NoMatch,
}

/// The single-document read-modify-CAS loop shared by `updateOne` and
/// `findOneAndUpdate`.
async fn try_update_once(
    executor: &dyn StoreExecutor,
    context: &CommandContext,
    filter: &Filter,
    update: &UpdateClause,
    upsert: bool,
    max_retries: u32,
) -> Result<UpdateAttempt, JsonApiError> {
    let collection = context.require_collection()?;
    let keyspace = context.namespace.as_str();
    let mut last_id = String::new();

    for _ in 0..max_retries.max(1) {
        let found = matching_documents(executor, context, filter).await?.into_iter().next();
        if let Some((doc, tx_id)) = found {
            last_id = id_sort_key(&doc);
            let mut mutated = doc.clone();
            update.apply(&mut mutated, false)?;
            let shredded = Shredder::new().shred(&mutated)?;
            let (tag, text) = shredded.id.to_key_tuple();
            let row = row_codec::to_row(&shredded, next_tx_id());
            let stmt = Statement::new(
                keyspace,
                collection,
                update_cql(keyspace, collection),
                StatementIntent::ConditionalUpdate { expected_tx_id: tx_id, row },
            )
            .bind(BoundValue::id_tag(tag))
            .bind(BoundValue::Text(text));
            if executor.execute(stmt).await?.was_applied {
                return Ok(UpdateAttempt::Modified { doc: mutated, upserted: false });
            }
        } else if upsert {
            let mut new_doc = seed_from_filter(filter)?;
            update.apply(&mut new_doc, true)?;
            let shredded = Shredder::new().shred(&new_doc)?;
            let (tag, text) = shredded.id.to_key_tuple();
            let row = row_codec::to_row(&shredded, next_tx_id());
            let stmt = Statement::new(
                keyspace,
                collection,
                insert_cql(keyspace, collection),
                StatementIntent::InsertIfNotExists { row },
            )
            .bind(BoundValue::id_tag(tag))
            .bind(BoundValue::Text(text));
            if executor.execute(stmt).await?.was_applied {
                return Ok(UpdateAttempt::Modified { doc: new_doc, upserted: true });
            }
        } else {
            return Ok(UpdateAttempt::NoMatch);
        }
    }

    Err(JsonApiError::concurrent_update_limit_exceeded(collection, last_id, max_retries))
}

pub struct Update {
    pub context: CommandContext,
    pub filter: Filter,
    pub update: UpdateClause,
    pub upsert: bool,
}

impl Update {
    #[tracing::instrument(skip(self, executor, config), fields(collection = ?self.context.collection))]
    pub async fn execute(
        &self,
        executor: &dyn StoreExecutor,
        config: &JsonApiConfig,
    ) -> Result<OperationOutput, JsonApiError> {
        match try_update_once(
            executor,
            &self.context,
            &self.filter,
            &self.update,
            self.upsert,
            config.operations.max_retries,
        )
        .await?
        {
            UpdateAttempt::Modified { doc, upserted } => {
                let upserted_id = upserted.then(|| doc.get("_id").cloned()).flatten();
                Ok(OperationOutput::modify_result(1, 1, upserted_id))
            }
            UpdateAttempt::NoMatch => Ok(OperationOutput::modify_result(0, 0, None)),
        }
    }
}

pub struct FindOneAndUpdate {
    pub context: CommandContext,
    pub filter: Filter,
    pub update: UpdateClause,
    pub upsert: bool,
}

impl FindOneAndUpdate {
    #[tracing::instrument(skip(self, executor, config), fields(collection = ?self.context.collection))]
    pub async fn execute(
        &self,
        executor: &dyn StoreExecutor,
        config: &JsonApiConfig,
    ) -> Result<OperationOutput, JsonApiError> {
        match try_update_once(
            executor,
            &self.context,
            &self.filter,
            &self.update,
            self.upsert,
            config.operations.max_retries,
        )
        .await?
        {
            UpdateAttempt::Modified { doc, upserted } => {
                let upserted_id = upserted.then(|| doc.get("_id").cloned()).flatten();
                Ok(OperationOutput::modify_result(1, 1, upserted_id).with_document(Some(doc)))
            }
            UpdateAttempt::NoMatch => Ok(OperationOutput::modify_result(0, 0, None).with_document(None)),
        }
    }
}

/// Re-scans for an unprocessed match on every attempt (rather than
/// retrying the same document in place) so a CAS loss on one document
/// doesn't block progress on the rest of the batch.
async fn update_next_unprocessed(
    executor: &dyn StoreExecutor,
    context: &CommandContext,
    filter: &Filter,
    update: &UpdateClause,
    max_retries: u32,
    done_ids: &HashSet<String>,
) -> Result<Option<String>, JsonApiError> {
    let collection = context.require_collection()?;
    let keyspace = context.namespace.as_str();

    for _ in 0..max_retries.max(1) {
        let candidate = matching_documents(executor, context, filter)
            .await?
            .into_iter()
            .find(|(doc, _)| !done_ids.contains(&id_sort_key(doc)));
        let (doc, tx_id) = match candidate {
            Some(d) => d,
            None => return Ok(None),
        };
        let key = id_sort_key(&doc);
        let mut mutated = doc.clone();
        update.apply(&mut mutated, false)?;
        let shredded = Shredder::new().shred(&mutated)?;
        let (tag, text) = shredded.id.to_key_tuple();
        let row = row_codec::to_row(&shredded, next_tx_id());
        let stmt = Statement::new(
            keyspace,
            collection,
            update_cql(keyspace, collection),
            StatementIntent::ConditionalUpdate { expected_tx_id: tx_id, row },
        )
        .bind(BoundValue::id_tag(tag))
        .bind(BoundValue::Text(text));
        if executor.execute(stmt).await?.was_applied {
            return Ok(Some(key));
        }
    }

    Err(JsonApiError::concurrent_update_limit_exceeded(
        collection,
        "<update_many batch>",
        max_retries,
    ))
}

pub struct UpdateMany {
    pub context: CommandContext,
    pub filter: Filter,
    pub update: UpdateClause,
}

impl UpdateMany {
    #[tracing::instrument(skip(self, executor, config), fields(collection = ?self.context.collection))]
    pub async fn execute(
        &self,
        executor: &dyn StoreExecutor,
        config: &JsonApiConfig,
    ) -> Result<OperationOutput, JsonApiError> {
        let mut done_ids = HashSet::new();
        let cap = config.operations.max_documents_per_page;
        while done_ids.len() < cap {
            match update_next_unprocessed(
                executor,
                &self.context,
                &self.filter,
                &self.update,
                config.operations.max_retries,
                &done_ids,
            )
            .await?
            {
                Some(key) => {
                    done_ids.insert(key);
                }
                None => break,
            }
        }
        let modified = done_ids.len() as u64;
        Ok(OperationOutput::modify_result(modified, modified, None))
    }
}

enum DeleteAttempt {
    Deleted(JsonValue),
    NoMatch,
}

async fn try_delete_once(
    executor: &dyn StoreExecutor,
    context: &CommandContext,
    filter: &Filter,
    max_retries: u32,
) -> Result<DeleteAttempt, JsonApiError> {
    let collection = context.require_collection()?;
    let keyspace = context.namespace.as_str();
    let mut last_id = String::new();

    for _ in 0..max_retries.max(1) {
        let found = matching_documents(executor, context, filter).await?.into_iter().next();
        let (doc, tx_id) = match found {
            Some(d) => d,
            None => return Ok(DeleteAttempt::NoMatch),
        };
        last_id = id_sort_key(&doc);
        let (tag, text) = key_of(&doc)?;
        let stmt = Statement::new(
            keyspace,
            collection,
            delete_cql(keyspace, collection),
            StatementIntent::ConditionalDelete { expected_tx_id: tx_id },
        )
        .bind(BoundValue::id_tag(tag))
        .bind(BoundValue::Text(text));
        if executor.execute(stmt).await?.was_applied {
            return Ok(DeleteAttempt::Deleted(doc));
        }
    }

    Err(JsonApiError::concurrent_update_limit_exceeded(collection, last_id, max_retries))
}

pub struct Delete {
    pub context: CommandContext,
    pub filter: Filter,
}

impl Delete {
    #[tracing::instrument(skip(self, executor, config), fields(collection = ?self.context.collection))]
    pub async fn execute(
        &self,
        executor: &dyn StoreExecutor,
        config: &JsonApiConfig,
    ) -> Result<OperationOutput, JsonApiError> {
        match try_delete_once(executor, &self.context, &self.filter, config.operations.max_retries).await? {
            DeleteAttempt::Deleted(_) => Ok(OperationOutput::delete_result(1)),
            DeleteAttempt::NoMatch => Ok(OperationOutput::delete_result(0)),
        }
    }
}

pub struct FindOneAndDelete {
    pub context: CommandContext,
    pub filter: Filter,
}

impl FindOneAndDelete {
    #[tracing::instrument(skip(self, executor, config), fields(collection = ?self.context.collection))]
    pub async fn execute(
        &self,
        executor: &dyn StoreExecutor,
        config: &JsonApiConfig,
    ) -> Result<OperationOutput, JsonApiError> {
        match try_delete_once(executor, &self.context, &self.filter, config.operations.max_retries).await? {
            DeleteAttempt::Deleted(doc) => Ok(OperationOutput::delete_result(1).with_document(Some(doc))),
            DeleteAttempt::NoMatch => Ok(OperationOutput::delete_result(0).with_document(None)),
        }
    }
}

pub struct DeleteMany {
    pub context: CommandContext,
    pub filter: Filter,
}

impl DeleteMany {
    #[tracing::instrument(skip(self, executor, config), fields(collection = ?self.context.collection))]
    pub async fn execute(
        &self,
        executor: &dyn StoreExecutor,
        config: &JsonApiConfig,
    ) -> Result<OperationOutput, JsonApiError> {
        let cap = config.operations.max_documents_per_page;
        let mut deleted = 0u64;
        for _ in 0..cap {
            match try_delete_once(executor, &self.context, &self.filter, config.operations.max_retries).await? {
                DeleteAttempt::Deleted(_) => deleted += 1,
                DeleteAttempt::NoMatch => break,
            }
        }
        Ok(OperationOutput::delete_result(deleted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insert::Insert;
    use jsonapi_schema_cache::SchemaCache;
    use jsonapi_store::InMemoryStoreExecutor;
    use serde_json::json;

    fn ctx() -> CommandContext {
        CommandContext::new(None, "ns", Some("c".to_string()))
    }

    fn test_config() -> JsonApiConfig {
        JsonApiConfig::default()
    }

    fn cache() -> SchemaCache {
        SchemaCache::new(std::time::Duration::from_secs(600), 100)
    }

    async fn seed(store: &InMemoryStoreExecutor, docs: &[JsonValue]) {
        for doc in docs {
            Insert {
                context: ctx(),
                document: doc.clone(),
            }
            .execute(store)
            .await
            .unwrap();
        }
    }

    #[tokio::test]
    async fn update_one_applies_inc_and_advances_tx_id() {
        let store = InMemoryStoreExecutor::new();
        seed(&store, &[json!({"_id": "x", "n": 0})]).await;
        let config = test_config();

        let op = Update {
            context: ctx(),
            filter: Filter::parse(&json!({"_id": "x"})).unwrap(),
            update: UpdateClause::parse(&json!({"$inc": {"n": 1}})).unwrap(),
            upsert: false,
        };
        let first = op.execute(&store, &config).await.unwrap();
        assert_eq!(first.status.modified_count, Some(1));
        let second = op.execute(&store, &config).await.unwrap();
        assert_eq!(second.status.modified_count, Some(1));

        let fetched = crate::read::FindOne {
            context: ctx(),
            filter: Filter::parse(&json!({"_id": "x"})).unwrap(),
            vector_sort: None,
        }
        .execute(&store, &cache())
        .await
        .unwrap();
        assert_eq!(fetched.data_document.unwrap()["n"], json!(2));
    }

    #[tokio::test]
    async fn update_one_no_match_reports_zero_counts() {
        let store = InMemoryStoreExecutor::new();
        let config = test_config();
        let result = Update {
            context: ctx(),
            filter: Filter::parse(&json!({"_id": "missing"})).unwrap(),
            update: UpdateClause::parse(&json!({"$set": {"n": 1}})).unwrap(),
            upsert: false,
        }
        .execute(&store, &config)
        .await
        .unwrap();
        assert_eq!(result.status.matched_count, Some(0));
    }

    #[tokio::test]
    async fn upsert_creates_document_when_absent() {
        let store = InMemoryStoreExecutor::new();
        let config = test_config();
        let result = Update {
            context: ctx(),
            filter: Filter::parse(&json!({"_id": "new"})).unwrap(),
            update: UpdateClause::parse(&json!({"$set": {"n": 5}})).unwrap(),
            upsert: true,
        }
        .execute(&store, &config)
        .await
        .unwrap();
        assert_eq!(result.status.upserted_id, Some(json!("new")));
    }

    #[tokio::test]
    async fn find_one_and_delete_returns_the_removed_document() {
        let store = InMemoryStoreExecutor::new();
        seed(&store, &[json!({"_id": "x", "n": 1})]).await;
        let config = test_config();

        let result = FindOneAndDelete {
            context: ctx(),
            filter: Filter::parse(&json!({"_id": "x"})).unwrap(),
        }
        .execute(&store, &config)
        .await
        .unwrap();
        assert_eq!(result.data_document.unwrap()["n"], json!(1));

        let gone = crate::read::FindOne {
            context: ctx(),
            filter: Filter::parse(&json!({"_id": "x"})).unwrap(),
            vector_sort: None,
        }
        .execute(&store, &cache())
        .await
        .unwrap();
        assert!(gone.data_document.is_none());
    }

    #[tokio::test]
    async fn delete_many_removes_every_match() {
        let store = InMemoryStoreExecutor::new();
        seed(
            &store,
            &[
                json!({"_id": "a", "flag": true}),
                json!({"_id": "b", "flag": true}),
                json!({"_id": "c", "flag": false}),
            ],
        )
        .await;
        let config = test_config();

        let result = DeleteMany {
            context: ctx(),
            filter: Filter::parse(&json!({"flag": true})).unwrap(),
        }
        .execute(&store, &config)
        .await
        .unwrap();
        assert_eq!(result.status.deleted_count, Some(2));
    }

    #[tokio::test]
    async fn update_many_updates_every_match_once() {
        let store = InMemoryStoreExecutor::new();
        seed(
            &store,
            &[
                json!({"_id": "a", "grp": "x", "n": 0}),
                json!({"_id": "b", "grp": "x", "n": 0}),
                json!({"_id": "c", "grp": "y", "n": 0}),
            ],
        )
        .await;
        let config = test_config();

        let result = UpdateMany {
            context: ctx(),
            filter: Filter::parse(&json!({"grp": "x"})).unwrap(),
            update: UpdateClause::parse(&json!({"$inc": {"n": 1}})).unwrap(),
        }
        .execute(&store, &config)
        .await
        .unwrap();
        assert_eq!(result.status.modified_count, Some(2));
    }
}
