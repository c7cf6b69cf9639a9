//! Collection lifecycle: `CreateCollection`, `DropCollection`,
//! `FindCollections` (§4.6).

use std::time::Duration;

use jsonapi_core::config::JsonApiConfig;
use jsonapi_core::JsonApiError;
use jsonapi_schema_cache::{CacheKey, SchemaCache};
use jsonapi_store::{Statement, StatementIntent, StoreExecutor};

use crate::context::{CollectionSettings, CommandContext};
use crate::output::OperationOutput;
use crate::row_codec::columns;

/// Build the fixed `CREATE TABLE` CQL for a collection's backing table —
/// the column shape in spec.md §3, unconditionally, regardless of vector
/// settings (the vector column is always present, just unindexed when
/// `vector_enabled` is false).
fn create_table_cql(keyspace: &str, table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {keyspace}.{table} (\
         key_tag tinyint, key_text text, tx_id bigint, doc_json text, \
         exist_keys set<text>, array_size map<text, int>, array_contains set<text>, \
         query_bool_values map<text, boolean>, query_dbl_values map<text, text>, \
         query_text_values map<text, text>, query_timestamp_values map<text, bigint>, \
         query_null_values set<text>, query_vector_value vector<float, 1536>, \
         PRIMARY KEY (key_tag, key_text))"
    )
}

fn create_index_cql(keyspace: &str, table: &str, column: &str) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {table}_{column} ON {keyspace}.{table} ({column}) \
         USING 'StorageAttachedIndex'"
    )
}

fn create_vector_index_cql(keyspace: &str, table: &str, similarity_function: &str) -> String {
    format!(
        "CREATE CUSTOM INDEX IF NOT EXISTS {table}_{col} ON {keyspace}.{table} ({col}) \
         USING 'StorageAttachedIndex' WITH OPTIONS = {{'similarity_function': '{similarity_function}'}}",
        col = columns::QUERY_VECTOR_VALUE,
    )
}

async fn describe_settings(
    executor: &dyn StoreExecutor,
    keyspace: &str,
    table: &str,
) -> Result<CollectionSettings, JsonApiError> {
    let stmt = Statement::new(keyspace, table, "", StatementIntent::DescribeTable);
    let page = executor.execute(stmt).await?;
    let comment = page
        .rows
        .first()
        .and_then(|row| row.text("comment").map(|s| s.to_string()));
    Ok(CollectionSettings::from_comment(comment.as_deref()))
}

pub struct CreateCollection {
    pub context: CommandContext,
    pub name: String,
    pub settings: CollectionSettings,
}

impl CreateCollection {
    /// Enforces `database.max_collections` and
    /// `database.indexes_available_per_database` before creating
    /// anything; idempotent re-creation with identical settings succeeds,
    /// re-creation with different settings fails with
    /// `INVALID_COLLECTION_NAME` (§4.6, scenario 4).
    #[tracing::instrument(skip(self, executor, schema_cache, config), fields(collection = %self.name))]
    pub async fn execute(
        &self,
        executor: &dyn StoreExecutor,
        schema_cache: &SchemaCache,
        config: &JsonApiConfig,
    ) -> Result<OperationOutput, JsonApiError> {
        let keyspace = self.context.namespace.as_str();
        let existing_tables = executor.list_tables(keyspace).await?;

        if existing_tables.iter().any(|t| t == &self.name) {
            let existing = describe_settings(executor, keyspace, &self.name).await?;
            return if existing == self.settings {
                Ok(OperationOutput::ack())
            } else {
                Err(JsonApiError::invalid_collection_name(
                    self.name.as_str(),
                    "a collection with this name already exists with different settings",
                ))
            };
        }

        if existing_tables.len() >= config.database.max_collections {
            return Err(JsonApiError::TooManyCollections {
                namespace: keyspace.to_string(),
                limit: config.database.max_collections,
            });
        }

        let indexes_per_collection =
            columns::INDEXABLE.len() + if self.settings.vector_enabled { 1 } else { 0 };
        let projected_total = (existing_tables.len() + 1) * indexes_per_collection;
        if projected_total > config.database.indexes_available_per_database {
            return Err(JsonApiError::TooManyIndexes {
                limit: config.database.indexes_available_per_database,
                requested: projected_total,
            });
        }

        let comment = self.settings.to_comment();
        executor
            .execute(Statement::new(
                keyspace,
                self.name.as_str(),
                create_table_cql(keyspace, &self.name),
                StatementIntent::CreateTable { comment: Some(comment) },
            ))
            .await?;

        let delay = Duration::from_millis(config.operations.ddl_delay_millis);
        for column in columns::INDEXABLE {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            executor
                .execute(Statement::new(
                    keyspace,
                    self.name.as_str(),
                    create_index_cql(keyspace, &self.name, column),
                    StatementIntent::CreateIndex,
                ))
                .await?;
        }

        if self.settings.vector_enabled {
            let similarity = self
                .settings
                .similarity_function
                .clone()
                .unwrap_or_else(|| "cosine".to_string());
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            executor
                .execute(Statement::new(
                    keyspace,
                    self.name.as_str(),
                    create_vector_index_cql(keyspace, &self.name, &similarity),
                    StatementIntent::CreateIndex,
                ))
                .await?;
        }

        schema_cache.invalidate(&CacheKey::new(
            self.context.tenant.clone(),
            keyspace.clone(),
            self.name.clone(),
        ));

        Ok(OperationOutput::ack())
    }
}

pub struct DropCollection {
    pub context: CommandContext,
    pub name: String,
}

impl DropCollection {
    /// Dropping a collection that does not exist also returns
    /// `status.ok=1` — Open Question (a), resolved idempotent (DESIGN.md).
    #[tracing::instrument(skip(self, executor, schema_cache), fields(collection = %self.name))]
    pub async fn execute(
        &self,
        executor: &dyn StoreExecutor,
        schema_cache: &SchemaCache,
    ) -> Result<OperationOutput, JsonApiError> {
        let keyspace = self.context.namespace.as_str();
        executor
            .execute(Statement::new(
                keyspace,
                self.name.as_str(),
                format!("DROP TABLE IF EXISTS {keyspace}.{}", self.name),
                StatementIntent::DropTable,
            ))
            .await?;
        schema_cache.invalidate(&CacheKey::new(
            self.context.tenant.clone(),
            keyspace.clone(),
            self.name.clone(),
        ));
        Ok(OperationOutput::ack())
    }
}

pub struct FindCollections {
    pub context: CommandContext,
}

impl FindCollections {
    #[tracing::instrument(skip(self, executor))]
    pub async fn execute(&self, executor: &dyn StoreExecutor) -> Result<OperationOutput, JsonApiError> {
        let mut names = executor.list_tables(&self.context.namespace).await?;
        names.sort();
        Ok(OperationOutput::collections(names))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonapi_store::InMemoryStoreExecutor;

    fn ctx() -> CommandContext {
        CommandContext::new(None, "ns", Some("c".to_string()))
    }

    fn test_config() -> JsonApiConfig {
        let mut config = JsonApiConfig::default();
        config.operations.ddl_delay_millis = 0;
        config
    }

    #[tokio::test]
    async fn create_then_recreate_same_settings_is_idempotent() {
        let store = InMemoryStoreExecutor::new();
        let cache = SchemaCache::new(Duration::from_secs(60), 10);
        let config = test_config();

        let op = CreateCollection {
            context: ctx(),
            name: "c".to_string(),
            settings: CollectionSettings::default(),
        };
        let first = op.execute(&store, &cache, &config).await.unwrap();
        assert_eq!(first.status.ok, Some(1));
        let second = op.execute(&store, &cache, &config).await.unwrap();
        assert_eq!(second.status.ok, Some(1));
    }

    #[tokio::test]
    async fn recreate_with_different_settings_is_rejected() {
        let store = InMemoryStoreExecutor::new();
        let cache = SchemaCache::new(Duration::from_secs(60), 10);
        let config = test_config();

        CreateCollection {
            context: ctx(),
            name: "c".to_string(),
            settings: CollectionSettings::default(),
        }
        .execute(&store, &cache, &config)
        .await
        .unwrap();

        let err = CreateCollection {
            context: ctx(),
            name: "c".to_string(),
            settings: CollectionSettings {
                vector_enabled: true,
                vector_size: Some(1536),
                ..Default::default()
            },
        }
        .execute(&store, &cache, &config)
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), jsonapi_core::ErrorCode::InvalidCollectionName);
    }

    #[tokio::test]
    async fn drop_missing_collection_is_idempotent_success() {
        let store = InMemoryStoreExecutor::new();
        let cache = SchemaCache::new(Duration::from_secs(60), 10);
        let result = DropCollection {
            context: ctx(),
            name: "missing".to_string(),
        }
        .execute(&store, &cache)
        .await
        .unwrap();
        assert_eq!(result.status.ok, Some(1));
    }

    #[tokio::test]
    async fn find_collections_lists_created_tables() {
        let store = InMemoryStoreExecutor::new();
        let cache = SchemaCache::new(Duration::from_secs(60), 10);
        let config = test_config();
        CreateCollection {
            context: ctx(),
            name: "c".to_string(),
            settings: CollectionSettings::default(),
        }
        .execute(&store, &cache, &config)
        .await
        .unwrap();

        let result = FindCollections { context: ctx() }.execute(&store).await.unwrap();
        assert_eq!(result.status.collections, Some(vec!["c".to_string()]));
    }

    #[tokio::test]
    async fn too_many_collections_is_rejected() {
        let store = InMemoryStoreExecutor::new();
        let cache = SchemaCache::new(Duration::from_secs(60), 10);
        let mut config = test_config();
        config.database.max_collections = 1;

        CreateCollection {
            context: ctx(),
            name: "a".to_string(),
            settings: CollectionSettings::default(),
        }
        .execute(&store, &cache, &config)
        .await
        .unwrap();

        let err = CreateCollection {
            context: ctx(),
            name: "b".to_string(),
            settings: CollectionSettings::default(),
        }
        .execute(&store, &cache, &config)
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), jsonapi_core::ErrorCode::TooManyCollections);
    }
}
