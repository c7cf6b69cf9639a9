//! `Find`/`FindOne`/`Count` (§4.6): predicate pushdown where the filter
//! reduces to an `_id` equality, a full scan plus in-memory re-evaluation
//! otherwise — the scan-side predicates and [`Filter::matches`] must agree
//! by construction (§8).

use jsonapi_core::config::JsonApiConfig;
use jsonapi_core::JsonApiError;
use jsonapi_schema_cache::{CacheKey, CollectionSchemaEntry, SchemaCache};
use jsonapi_shredder::{ColumnPredicate, CompareOp, Filter};
use jsonapi_store::{BoundValue, Row, Statement, StatementIntent, StoreExecutor};
use serde_json::Value as JsonValue;

use crate::context::{CollectionSettings, CommandContext};
use crate::output::OperationOutput;
use crate::row_codec::{self, columns};

pub(crate) fn select_by_id_cql(keyspace: &str, table: &str) -> String {
    format!("SELECT doc_json, tx_id FROM {keyspace}.{table} WHERE key_tag = ? AND key_text = ?")
}

fn select_scan_cql(keyspace: &str, table: &str) -> String {
    format!("SELECT doc_json, tx_id FROM {keyspace}.{table}")
}

fn count_scan_cql(keyspace: &str, table: &str) -> String {
    format!("SELECT COUNT(*) FROM {keyspace}.{table}")
}

fn cql_compare_op(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "=",
        CompareOp::Lt => "<",
        CompareOp::Lte => "<=",
        CompareOp::Gt => ">",
        CompareOp::Gte => ">=",
    }
}

/// Translate one non-`_id` [`ColumnPredicate`] into a `WHERE`-clause
/// fragment plus its bound values, against whichever
/// `StorageAttachedIndex`-backed column it addresses (§4.3's data-model
/// table). Returns `None` for predicates with no direct CQL shape
/// (`$exists: false` has no SAI negation, `$ne` is always `PostRead`) —
/// those still get checked in memory by [`Filter::matches`] afterward, so
/// omitting them from the `WHERE` clause costs selectivity, never
/// correctness.
fn render_predicate(predicate: &ColumnPredicate) -> Option<(String, Vec<BoundValue>)> {
    match predicate {
        ColumnPredicate::IdEq { .. } => None,
        ColumnPredicate::PostRead(_) => None,
        ColumnPredicate::Exists { path, expected } => expected.then(|| {
            (
                format!("{} CONTAINS ?", columns::EXIST_KEYS),
                vec![BoundValue::Text(path.clone())],
            )
        }),
        ColumnPredicate::ArraySizeEq { path, size } => Some((
            format!("{}[?] = ?", columns::ARRAY_SIZE),
            vec![BoundValue::Text(path.clone()), BoundValue::Int(*size as i32)],
        )),
        // SAI accepts one `CONTAINS` per indexed collection column per
        // statement; the first candidate entry narrows the scan and
        // `Filter::matches` confirms full `$in`/`$all` membership after.
        ColumnPredicate::ArrayContainsAny { entries, .. } | ColumnPredicate::ArrayContainsAll { entries, .. } => {
            entries.first().map(|entry| {
                (
                    format!("{} CONTAINS ?", columns::ARRAY_CONTAINS),
                    vec![BoundValue::Text(entry.clone())],
                )
            })
        }
        ColumnPredicate::BoolEq { path, value } => Some((
            format!("{}[?] = ?", columns::QUERY_BOOL_VALUES),
            vec![BoundValue::Text(path.clone()), BoundValue::Bool(*value)],
        )),
        ColumnPredicate::NullEq { path } => Some((
            format!("{} CONTAINS ?", columns::QUERY_NULL_VALUES),
            vec![BoundValue::Text(path.clone())],
        )),
        ColumnPredicate::TextEq { path, value } => Some((
            format!("{}[?] = ?", columns::QUERY_TEXT_VALUES),
            vec![BoundValue::Text(path.clone()), BoundValue::Text(value.clone())],
        )),
        ColumnPredicate::DblCompare { path, op, value } => Some((
            format!("{}[?] {} ?", columns::QUERY_DBL_VALUES, cql_compare_op(*op)),
            vec![BoundValue::Text(path.clone()), BoundValue::Decimal(*value)],
        )),
        ColumnPredicate::TimestampEq { path, value } => Some((
            format!("{}[?] = ?", columns::QUERY_TIMESTAMP_VALUES),
            vec![BoundValue::Text(path.clone()), BoundValue::TimestampMillis(*value)],
        )),
        ColumnPredicate::TimestampCompare { path, op, value } => Some((
            format!("{}[?] {} ?", columns::QUERY_TIMESTAMP_VALUES, cql_compare_op(*op)),
            vec![BoundValue::Text(path.clone()), BoundValue::TimestampMillis(*value)],
        )),
    }
}

/// Append a `WHERE ... AND ...` clause built from every pushable predicate
/// to `base_cql`, returning the full statement text and its bound values
/// in the order they must be appended to whatever primary-key params (if
/// any) already precede them.
fn build_scan_statement(base_cql: &str, predicates: &[ColumnPredicate]) -> (String, Vec<BoundValue>) {
    let fragments: Vec<(String, Vec<BoundValue>)> = predicates.iter().filter_map(render_predicate).collect();
    if fragments.is_empty() {
        return (base_cql.to_string(), Vec::new());
    }
    let mut cql = base_cql.to_string();
    cql.push_str(" WHERE ");
    cql.push_str(
        &fragments
            .iter()
            .map(|(clause, _)| clause.as_str())
            .collect::<Vec<_>>()
            .join(" AND "),
    );
    let params = fragments.into_iter().flat_map(|(_, values)| values).collect();
    (cql, params)
}

fn select_vector_cql(keyspace: &str, table: &str, limit: i32) -> String {
    format!(
        "SELECT doc_json, tx_id FROM {keyspace}.{table} ORDER BY {} ANN OF ? LIMIT {limit}",
        row_codec::columns::QUERY_VECTOR_VALUE
    )
}

/// Fetch the cached (or freshly-described) collection schema, used to
/// reject a `$vector` search against a non-vector-enabled collection
/// before it ever reaches the store (§4.5, §4.6).
async fn describe_for_cache(
    executor: &dyn StoreExecutor,
    keyspace: &str,
    table: &str,
) -> Result<CollectionSchemaEntry, JsonApiError> {
    let tables = executor.list_tables(keyspace).await?;
    if !tables.iter().any(|t| t == table) {
        return Ok(CollectionSchemaEntry::missing());
    }
    let stmt = Statement::new(keyspace, table, "", StatementIntent::DescribeTable);
    let page = executor.execute(stmt).await?;
    let comment = page
        .rows
        .first()
        .and_then(|row| row.text("comment").map(|s| s.to_string()));
    let settings = CollectionSettings::from_comment(comment.as_deref());
    Ok(CollectionSchemaEntry {
        table_exists: true,
        is_json_api_collection: true,
        vector_enabled: settings.vector_enabled,
        vector_dimension: settings.vector_size,
        similarity_function: settings.similarity_function,
        comment: settings.comment,
    })
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Rank documents carrying a stored `$vector` against `query` by cosine
/// similarity and keep the top `limit` — the store returns the scan
/// unordered (or, over a real cluster, already ANN-ordered; the in-memory
/// test double makes no such promise), so this re-ranking is always the
/// source of truth the same way [`Filter::matches`] is for predicate
/// filtering. Documents with no `$vector` field are dropped.
fn rank_by_similarity(docs: Vec<JsonValue>, query: &[f32], limit: usize) -> Vec<JsonValue> {
    let mut scored: Vec<(f32, JsonValue)> = docs
        .into_iter()
        .filter_map(|doc| {
            let vector = doc
                .get(jsonapi_shredder::VECTOR_FIELD)
                .and_then(|v| v.as_array())
                .map(|arr| arr.iter().filter_map(|v| v.as_f64()).map(|f| f as f32).collect::<Vec<f32>>())?;
            let score = cosine_similarity(query, &vector);
            Some((score, doc))
        })
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(limit).map(|(_, doc)| doc).collect()
}

/// Run `filter` against a vector-enabled collection's `ANN` scan, ranking
/// by cosine similarity against `query` and keeping the top `limit` —
/// rejects with `UNSUPPORTED_FILTER_DATA_TYPE` if the collection's cached
/// schema says it isn't vector-enabled (§4.5, §4.6).
async fn vector_ranked_documents(
    executor: &dyn StoreExecutor,
    schema_cache: &SchemaCache,
    context: &CommandContext,
    filter: &Filter,
    query: &[f32],
    limit: usize,
) -> Result<Vec<JsonValue>, JsonApiError> {
    let collection = context.require_collection()?.to_string();
    let keyspace = context.namespace.clone();
    let key = CacheKey::new(context.tenant.clone(), keyspace.clone(), collection.clone());

    let entry = schema_cache
        .get_or_populate(key, || describe_for_cache(executor, &keyspace, &collection))
        .await?;
    if !entry.vector_enabled {
        return Err(JsonApiError::unsupported_filter_data_type(
            jsonapi_shredder::VECTOR_FIELD,
            "collection is not vector-enabled",
        ));
    }

    let stmt = Statement::new(
        keyspace.as_str(),
        collection.as_str(),
        select_vector_cql(&keyspace, &collection, limit as i32),
        StatementIntent::VectorScan {
            query: query.to_vec(),
            limit: limit as i32,
        },
    )
    .bind(BoundValue::Vector(query.to_vec()));
    let rows = executor.execute(stmt).await?.rows;

    let mut candidates = Vec::with_capacity(rows.len());
    for row in &rows {
        let (doc, _) = row_codec::rehydrate(row)?;
        if filter.matches(&doc)? {
            candidates.push(doc);
        }
    }
    Ok(rank_by_similarity(candidates, query, limit))
}

fn id_predicate(predicates: &[ColumnPredicate]) -> Option<(jsonapi_core::docid::DocIdTag, String)> {
    predicates.iter().find_map(|p| match p {
        ColumnPredicate::IdEq { tag, text } => Some((*tag, text.clone())),
        _ => None,
    })
}

/// Run the filter's `_id` fast path if present, otherwise a scan —
/// non-`_id` predicates that bind to a `StorageAttachedIndex`-backed
/// column (§4.3) are pushed into the statement's `WHERE` clause; the
/// caller still re-evaluates every returned row's full document against
/// `doc_json` (§8), so a predicate that can't be pushed down (or a store
/// whose SAI selectivity differs from a literal reading of the CQL) never
/// produces a wrong answer, only a wider candidate scan.
async fn fetch_rows(
    executor: &dyn StoreExecutor,
    context: &CommandContext,
    filter: &Filter,
    scan_intent: StatementIntent,
    scan_cql: impl FnOnce(&str, &str) -> String,
) -> Result<Vec<Row>, JsonApiError> {
    let collection = context.require_collection()?;
    let keyspace = context.namespace.as_str();
    let predicates = filter.predicates()?;

    if let Some((tag, text)) = id_predicate(&predicates) {
        let stmt = Statement::new(
            keyspace,
            collection,
            select_by_id_cql(keyspace, collection),
            StatementIntent::SelectById,
        )
        .bind(BoundValue::id_tag(tag))
        .bind(BoundValue::Text(text));
        Ok(executor.execute(stmt).await?.rows)
    } else {
        let base_cql = scan_cql(keyspace, collection);
        let (cql, params) = build_scan_statement(&base_cql, &predicates);
        let mut stmt = Statement::new(keyspace, collection, cql, scan_intent);
        for param in params {
            stmt = stmt.bind(param);
        }
        Ok(executor.execute(stmt).await?.rows)
    }
}

/// Fetch and re-validate every document matching `filter`, in a stable
/// `_id`-ordered sequence so pages stay consistent across calls.
pub(crate) async fn matching_documents(
    executor: &dyn StoreExecutor,
    context: &CommandContext,
    filter: &Filter,
) -> Result<Vec<(JsonValue, i64)>, JsonApiError> {
    let rows = fetch_rows(
        executor,
        context,
        filter,
        StatementIntent::SelectScan,
        select_scan_cql,
    )
    .await?;

    let mut docs = Vec::with_capacity(rows.len());
    for row in &rows {
        let (doc, tx_id) = row_codec::rehydrate(row)?;
        if filter.matches(&doc)? {
            docs.push((doc, tx_id));
        }
    }
    docs.sort_by(|a, b| id_sort_key(&a.0).cmp(&id_sort_key(&b.0)));
    Ok(docs)
}

pub(crate) fn id_sort_key(doc: &JsonValue) -> String {
    doc.get("_id").map(|v| v.to_string()).unwrap_or_default()
}

fn encode_page_state(offset: usize) -> String {
    offset.to_string()
}

fn decode_page_state(state: Option<&str>) -> usize {
    state.and_then(|s| s.parse().ok()).unwrap_or(0)
}

pub struct Find {
    pub context: CommandContext,
    pub filter: Filter,
    pub limit: Option<u64>,
    pub page_state: Option<String>,
    /// `$vector` query from a `sort` clause (§4.6) — when present, the
    /// result is ANN-ordered and not paginated (no stable continuation
    /// token for a similarity ranking that can shift as the collection
    /// changes).
    pub vector_sort: Option<Vec<f32>>,
}

impl Find {
    #[tracing::instrument(skip(self, executor, schema_cache, config), fields(collection = ?self.context.collection))]
    pub async fn execute(
        &self,
        executor: &dyn StoreExecutor,
        schema_cache: &SchemaCache,
        config: &JsonApiConfig,
    ) -> Result<OperationOutput, JsonApiError> {
        let page_size = self
            .limit
            .map(|l| l as usize)
            .unwrap_or(config.operations.max_documents_per_page)
            .min(config.operations.max_documents_per_page);

        if let Some(query) = &self.vector_sort {
            let docs =
                vector_ranked_documents(executor, schema_cache, &self.context, &self.filter, query, page_size)
                    .await?;
            return Ok(OperationOutput::default().with_documents(docs, None));
        }

        let docs = matching_documents(executor, &self.context, &self.filter).await?;
        let offset = decode_page_state(self.page_state.as_deref());

        let remaining: Vec<_> = docs.into_iter().skip(offset).collect();
        let has_more = remaining.len() > page_size;
        let page: Vec<JsonValue> = remaining.into_iter().take(page_size).map(|(doc, _)| doc).collect();
        let next_page_state = has_more.then(|| encode_page_state(offset + page.len()));

        Ok(OperationOutput::default().with_documents(page, next_page_state))
    }
}

pub struct FindOne {
    pub context: CommandContext,
    pub filter: Filter,
    pub vector_sort: Option<Vec<f32>>,
}

impl FindOne {
    #[tracing::instrument(skip(self, executor, schema_cache), fields(collection = ?self.context.collection))]
    pub async fn execute(
        &self,
        executor: &dyn StoreExecutor,
        schema_cache: &SchemaCache,
    ) -> Result<OperationOutput, JsonApiError> {
        if let Some(query) = &self.vector_sort {
            let doc = vector_ranked_documents(executor, schema_cache, &self.context, &self.filter, query, 1)
                .await?
                .into_iter()
                .next();
            return Ok(OperationOutput::default().with_document(doc));
        }

        let doc = matching_documents(executor, &self.context, &self.filter)
            .await?
            .into_iter()
            .next()
            .map(|(doc, _)| doc);
        Ok(OperationOutput::default().with_document(doc))
    }
}

pub struct Count {
    pub context: CommandContext,
    pub filter: Filter,
}

impl Count {
    #[tracing::instrument(skip(self, executor), fields(collection = ?self.context.collection))]
    pub async fn execute(&self, executor: &dyn StoreExecutor) -> Result<OperationOutput, JsonApiError> {
        let rows = fetch_rows(
            executor,
            &self.context,
            &self.filter,
            StatementIntent::CountScan,
            count_scan_cql,
        )
        .await?;
        let mut total = 0u64;
        for row in &rows {
            let (doc, _) = row_codec::rehydrate(row)?;
            if self.filter.matches(&doc)? {
                total += 1;
            }
        }
        Ok(OperationOutput::count(total, false))
    }
}
