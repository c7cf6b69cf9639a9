//! `Insert`/`InsertMany` (§4.6): shred a document, then CAS-insert it.

use jsonapi_core::JsonApiError;
use jsonapi_shredder::Shredder;
use jsonapi_store::{BoundValue, Statement, StatementIntent, StoreExecutor};
use serde_json::Value as JsonValue;

use crate::context::CommandContext;
use crate::output::OperationOutput;
use crate::row_codec;
use crate::tx_id::next_tx_id;

pub(crate) fn insert_cql(keyspace: &str, table: &str) -> String {
    let cols = row_codec::columns::ALL.join(", ");
    let placeholders = row_codec::columns::ALL
        .iter()
        .map(|_| "?")
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {keyspace}.{table} ({cols}) VALUES ({placeholders}) IF NOT EXISTS")
}

/// Shred `doc`, assign it a fresh `tx_id`, and attempt a CAS insert.
/// Returns the document's `_id` (JSON form) on success.
async fn insert_one_document(
    executor: &dyn StoreExecutor,
    context: &CommandContext,
    doc: &JsonValue,
) -> Result<JsonValue, JsonApiError> {
    let collection = context.require_collection()?;
    let shredded = Shredder::new().shred(doc)?;
    let row = row_codec::to_row(&shredded, next_tx_id());
    let (tag, text) = shredded.id.to_key_tuple();

    let stmt = Statement::new(
        context.namespace.as_str(),
        collection,
        insert_cql(context.namespace.as_str(), collection),
        StatementIntent::InsertIfNotExists { row },
    )
    .bind(BoundValue::id_tag(tag))
    .bind(BoundValue::Text(text));

    let page = executor.execute(stmt).await?;
    if page.was_applied {
        Ok(shredded.id.to_json())
    } else {
        Err(JsonApiError::document_already_exists(collection, shredded.id.to_string()))
    }
}

pub struct Insert {
    pub context: CommandContext,
    pub document: JsonValue,
}

impl Insert {
    #[tracing::instrument(skip(self, executor), fields(collection = ?self.context.collection))]
    pub async fn execute(&self, executor: &dyn StoreExecutor) -> Result<OperationOutput, JsonApiError> {
        let id = insert_one_document(executor, &self.context, &self.document).await?;
        Ok(OperationOutput::inserted_ids(vec![id]))
    }
}

/// Per-document partial success: a conflicting document inside the batch
/// is reported in `errors` without aborting the siblings that still fit.
pub struct InsertMany {
    pub context: CommandContext,
    pub documents: Vec<JsonValue>,
}

impl InsertMany {
    #[tracing::instrument(skip(self, executor), fields(collection = ?self.context.collection, count = self.documents.len()))]
    pub async fn execute(&self, executor: &dyn StoreExecutor) -> Result<OperationOutput, JsonApiError> {
        let mut ids = Vec::new();
        let mut errors = Vec::new();
        for doc in &self.documents {
            match insert_one_document(executor, &self.context, doc).await {
                Ok(id) => ids.push(id),
                Err(err) => errors.push(err),
            }
        }
        let mut output = OperationOutput::inserted_ids(ids);
        output.errors = errors;
        Ok(output)
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

    #[tokio::test]
    async fn insert_assigns_random_id_when_absent() {
        let store = InMemoryStoreExecutor::new();
        let result = Insert {
            context: ctx(),
            document: json!({"name": "Bob"}),
        }
        .execute(&store)
        .await
        .unwrap();
        let ids = result.status.inserted_ids.unwrap();
        assert_eq!(ids.len(), 1);
        assert!(ids[0].is_string());
    }

    #[tokio::test]
    async fn insert_conflicting_id_reports_document_already_exists() {
        let store = InMemoryStoreExecutor::new();
        Insert {
            context: ctx(),
            document: json!({"_id": "x", "name": "Bob"}),
        }
        .execute(&store)
        .await
        .unwrap();

        let err = Insert {
            context: ctx(),
            document: json!({"_id": "x", "name": "Alice"}),
        }
        .execute(&store)
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), jsonapi_core::ErrorCode::DocumentAlreadyExists);
    }

    #[tokio::test]
    async fn insert_many_reports_partial_success() {
        let store = InMemoryStoreExecutor::new();
        let result = InsertMany {
            context: ctx(),
            documents: vec![json!({"_id": "a"}), json!({"_id": "a"}), json!({"_id": "b"})],
        }
        .execute(&store)
        .await
        .unwrap();
        assert_eq!(result.status.inserted_ids.unwrap().len(), 2);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].error_code(), jsonapi_core::ErrorCode::DocumentAlreadyExists);
    }
}
