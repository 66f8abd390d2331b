//! Semantic vector backend over `SQLite` + sqlite-vec.
//!
//! Items live in a plain table (id, kind, content, metadata json,
//! created_at) and their embeddings in a companion vec0 virtual table with
//! cosine distance. Blocking rusqlite work is offloaded to the
//! connection's worker thread via `tokio-rusqlite`, so every operation is
//! a plain suspension point for the caller.
//!
//! Per the store contract, transient failures (embedding calls, SQL
//! errors) are logged and converted to `false`/empty results here; only
//! construction surfaces an error.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio_rusqlite::Connection;
use tracing::{debug, warn};
use zerocopy::IntoBytes;

use crate::core::config::VectorConfig;
use crate::core::errors::{MemoryError, MemoryResult};
use crate::core::ids::MemoryId;
use crate::core::item::{MemoryItem, MemoryQuery, QueryResult};
use crate::core::kinds::MemoryKind;
use crate::core::metadata::Metadata;
use crate::embedding::embedder::Embedder;
use crate::store::{MemoryStore, StoreFuture};

/// Register sqlite-vec as an auto-loaded extension for all future
/// connections.
///
/// Must be called once at startup, before any [`SqliteVectorStore`] is
/// constructed.
#[allow(unsafe_code)]
pub fn init_sqlite_vec_extension() {
    use rusqlite::ffi::sqlite3_auto_extension;
    use sqlite_vec::sqlite3_vec_init;

    // SAFETY: sqlite3_auto_extension is a stable SQLite API and
    // sqlite3_vec_init is the extension entry point exported by sqlite-vec.
    unsafe {
        #[allow(clippy::missing_transmute_annotations)]
        sqlite3_auto_extension(Some(std::mem::transmute(sqlite3_vec_init as *const ())));
    }
}

fn create_tables_sql(table: &str, ndims: usize) -> String {
    format!(
        r"
        CREATE TABLE IF NOT EXISTS {table} (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            content TEXT NOT NULL,
            metadata TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_kind ON {table}(kind);
        CREATE VIRTUAL TABLE IF NOT EXISTS {table}_vec USING vec0(
            item_id TEXT PRIMARY KEY,
            embedding float[{ndims}] distance_metric=cosine
        );
        "
    )
}

/// `SQLite`-backed semantic vector store.
pub struct SqliteVectorStore {
    conn: Connection,
    embedder: Arc<dyn Embedder>,
    table: String,
    path: String,
    ndims: usize,
}

impl SqliteVectorStore {
    /// Open (or create) the backing database and collection tables.
    ///
    /// # Errors
    /// Returns [`MemoryError::BackendUnavailable`] if the database cannot
    /// be opened or the sqlite-vec extension is not loaded. Call
    /// [`init_sqlite_vec_extension`] before constructing a store.
    pub async fn new(config: &VectorConfig, embedder: Arc<dyn Embedder>) -> MemoryResult<Self> {
        let conn = Connection::open(&config.sqlite_path)
            .await
            .map_err(|err| MemoryError::BackendUnavailable(err.to_string()))?;
        let path = config.sqlite_path.display().to_string();
        Self::init(conn, path, config.table.clone(), embedder).await
    }

    /// Open an in-memory store, used by tests and ephemeral sessions.
    ///
    /// # Errors
    /// Returns [`MemoryError::BackendUnavailable`] if the sqlite-vec
    /// extension is not loaded.
    pub async fn open_in_memory(
        table: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> MemoryResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|err| MemoryError::BackendUnavailable(err.to_string()))?;
        Self::init(conn, ":memory:".to_string(), table.into(), embedder).await
    }

    async fn init(
        conn: Connection,
        path: String,
        table: String,
        embedder: Arc<dyn Embedder>,
    ) -> MemoryResult<Self> {
        let ndims = embedder.ndims();
        let ddl = create_tables_sql(&table, ndims);
        conn.call(move |conn| {
            let version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
            debug!(version, "sqlite-vec extension available");
            conn.execute_batch(&ddl)?;
            Ok(())
        })
        .await
        .map_err(|err| MemoryError::BackendUnavailable(err.to_string()))?;

        Ok(Self {
            conn,
            embedder,
            table,
            path,
            ndims,
        })
    }

    async fn try_store(&self, item: &MemoryItem) -> MemoryResult<()> {
        let embedding = self.embedder.embed_text(&item.content).await?;

        let table = self.table.clone();
        let id = item.id.to_string();
        let kind = item.kind.as_str();
        let content = item.content.clone();
        let metadata = serde_json::to_string(&item.metadata.persistable())?;
        let created_at = item.created_at.to_rfc3339();
        let embedding_bytes = embedding.as_bytes().to_vec();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                // vec0 has no upsert; replace both rows explicitly
                tx.execute(
                    &format!("DELETE FROM {table} WHERE id = ?1"),
                    rusqlite::params![id],
                )?;
                tx.execute(
                    &format!("DELETE FROM {table}_vec WHERE item_id = ?1"),
                    rusqlite::params![id],
                )?;
                tx.execute(
                    &format!(
                        "INSERT INTO {table} (id, kind, content, metadata, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5)"
                    ),
                    rusqlite::params![id, kind, content, metadata, created_at],
                )?;
                tx.execute(
                    &format!("INSERT INTO {table}_vec (item_id, embedding) VALUES (?1, ?2)"),
                    rusqlite::params![id, embedding_bytes],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;

        Ok(())
    }

    async fn try_retrieve(&self, query: &MemoryQuery) -> MemoryResult<QueryResult> {
        if query.text.is_empty() {
            return self.list_items(query).await;
        }

        let start = Instant::now();
        let embedding = self.embedder.embed_text(&query.text).await?;

        let table = self.table.clone();
        let kinds: Option<Vec<String>> = query
            .kinds
            .as_ref()
            .map(|kinds| kinds.iter().map(|k| k.as_str().to_string()).collect());
        let limit = query.limit;
        let min_score = query.min_score;
        let embedding_bytes = embedding.as_bytes().to_vec();

        let rows: Vec<(String, String, String, String, String, f64)> = self
            .conn
            .call(move |conn| {
                // restrict KNN candidates to the requested kinds first
                let candidate_ids: Option<Vec<String>> = match &kinds {
                    Some(kinds) => {
                        let placeholders = (1..=kinds.len())
                            .map(|i| format!("?{i}"))
                            .collect::<Vec<_>>()
                            .join(", ");
                        let mut stmt = conn.prepare(&format!(
                            "SELECT id FROM {table} WHERE kind IN ({placeholders})"
                        ))?;
                        let ids = stmt
                            .query_map(rusqlite::params_from_iter(kinds.iter()), |row| {
                                row.get::<_, String>(0)
                            })?
                            .collect::<Result<Vec<_>, _>>()?;
                        Some(ids)
                    }
                    None => None,
                };

                let mut params: Vec<Box<dyn rusqlite::ToSql>> =
                    vec![Box::new(embedding_bytes), Box::new(limit as i64)];
                let knn_sql = match &candidate_ids {
                    Some(ids) => {
                        if ids.is_empty() {
                            return Ok(Vec::new());
                        }
                        // every candidate id becomes a host parameter;
                        // partitions beyond SQLITE_MAX_VARIABLE_NUMBER
                        // (32766 by default) fail the query and surface as
                        // an empty result
                        let placeholders = (0..ids.len())
                            .map(|i| format!("?{}", i + 3))
                            .collect::<Vec<_>>()
                            .join(", ");
                        for id in ids {
                            params.push(Box::new(id.clone()));
                        }
                        // with extra WHERE terms SQLite does not hand the
                        // LIMIT to vec0, so the KNN bound must be the
                        // explicit `k = ?` constraint instead
                        format!(
                            "SELECT item_id, distance FROM {table}_vec
                             WHERE embedding MATCH ?1 AND k = ?2
                             AND item_id IN ({placeholders})
                             ORDER BY distance"
                        )
                    }
                    None => format!(
                        "SELECT item_id, distance FROM {table}_vec
                         WHERE embedding MATCH ?1
                         ORDER BY distance LIMIT ?2"
                    ),
                };

                let param_refs: Vec<&dyn rusqlite::ToSql> =
                    params.iter().map(|p| p.as_ref()).collect();
                let mut stmt = conn.prepare(&knn_sql)?;
                let hits = stmt
                    .query_map(param_refs.as_slice(), |row| {
                        Ok((row.get::<_, String>(0)?, f64::from(row.get::<_, f32>(1)?)))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                let mut rows = Vec::with_capacity(hits.len());
                for (item_id, distance) in hits {
                    let row = conn.query_row(
                        &format!(
                            "SELECT id, kind, content, metadata, created_at
                             FROM {table} WHERE id = ?1"
                        ),
                        rusqlite::params![item_id],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, String>(2)?,
                                row.get::<_, String>(3)?,
                                row.get::<_, String>(4)?,
                            ))
                        },
                    )?;
                    rows.push((row.0, row.1, row.2, row.3, row.4, distance));
                }
                Ok(rows)
            })
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for (id, kind, content, metadata, created_at, distance) in rows {
            let similarity = 1.0 - distance;
            if similarity < min_score {
                continue;
            }
            let mut item = row_to_item(&id, &kind, content, &metadata, &created_at)?;
            item.metadata.set_similarity_score(similarity);
            items.push(item);
        }
        items.sort_by(|a, b| {
            b.metadata
                .ranking_score()
                .total_cmp(&a.metadata.ranking_score())
        });

        Ok(QueryResult::new(items, start.elapsed()))
    }

    /// List stored rows without semantic search, newest first.
    ///
    /// Serves match-all queries (empty query text); `min_score` does not
    /// apply because no similarity is computed.
    async fn list_items(&self, query: &MemoryQuery) -> MemoryResult<QueryResult> {
        let start = Instant::now();
        let table = self.table.clone();
        let kinds: Option<Vec<String>> = query
            .kinds
            .as_ref()
            .map(|kinds| kinds.iter().map(|k| k.as_str().to_string()).collect());
        let limit = query.limit;

        let rows: Vec<(String, String, String, String, String)> = self
            .conn
            .call(move |conn| {
                let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
                let sql = match &kinds {
                    Some(kinds) => {
                        let placeholders = (1..=kinds.len())
                            .map(|i| format!("?{i}"))
                            .collect::<Vec<_>>()
                            .join(", ");
                        for kind in kinds {
                            params.push(Box::new(kind.clone()));
                        }
                        params.push(Box::new(limit as i64));
                        format!(
                            "SELECT id, kind, content, metadata, created_at
                             FROM {table} WHERE kind IN ({placeholders})
                             ORDER BY created_at DESC LIMIT ?{}",
                            kinds.len() + 1
                        )
                    }
                    None => {
                        params.push(Box::new(limit as i64));
                        format!(
                            "SELECT id, kind, content, metadata, created_at
                             FROM {table} ORDER BY created_at DESC LIMIT ?1"
                        )
                    }
                };

                let param_refs: Vec<&dyn rusqlite::ToSql> =
                    params.iter().map(|p| p.as_ref()).collect();
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(param_refs.as_slice(), |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for (id, kind, content, metadata, created_at) in rows {
            items.push(row_to_item(&id, &kind, content, &metadata, &created_at)?);
        }
        Ok(QueryResult::new(items, start.elapsed()))
    }

    async fn try_delete(&self, id: MemoryId) -> MemoryResult<()> {
        let table = self.table.clone();
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    &format!("DELETE FROM {table} WHERE id = ?1"),
                    rusqlite::params![id],
                )?;
                tx.execute(
                    &format!("DELETE FROM {table}_vec WHERE item_id = ?1"),
                    rusqlite::params![id],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn try_clear(&self) -> MemoryResult<()> {
        let table = self.table.clone();
        let ddl = create_tables_sql(&self.table, self.ndims);
        self.conn
            .call(move |conn| {
                conn.execute_batch(&format!(
                    "DROP TABLE IF EXISTS {table}; DROP TABLE IF EXISTS {table}_vec;"
                ))?;
                conn.execute_batch(&ddl)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn count(&self) -> MemoryResult<usize> {
        let table = self.table.clone();
        let count: i64 = self
            .conn
            .call(move |conn| {
                Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })?)
            })
            .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

fn row_to_item(
    id: &str,
    kind: &str,
    content: String,
    metadata: &str,
    created_at: &str,
) -> MemoryResult<MemoryItem> {
    let id = MemoryId::from_str(id)
        .map_err(|err| MemoryError::InvalidMemoryItem(format!("invalid id: {err}")))?;
    let kind = MemoryKind::from_str(kind)?;
    let metadata: Metadata = serde_json::from_str(metadata)?;
    let created_at = DateTime::parse_from_rfc3339(created_at)
        .map_err(|err| MemoryError::InvalidMemoryItem(format!("invalid timestamp: {err}")))?
        .with_timezone(&Utc);

    Ok(MemoryItem {
        id,
        kind,
        content,
        metadata,
        created_at,
    })
}

impl MemoryStore for SqliteVectorStore {
    fn name(&self) -> &str {
        "vector_store"
    }

    fn store(&self, item: &MemoryItem) -> StoreFuture<'_, bool> {
        let item = item.clone();
        Box::pin(async move {
            match self.try_store(&item).await {
                Ok(()) => true,
                Err(err) => {
                    warn!(%err, id = %item.id, "Vector store write failed");
                    false
                }
            }
        })
    }

    fn retrieve(&self, query: &MemoryQuery) -> StoreFuture<'_, QueryResult> {
        let query = query.clone();
        Box::pin(async move {
            match self.try_retrieve(&query).await {
                Ok(result) => result,
                Err(err) => {
                    warn!(%err, "Vector store query failed");
                    QueryResult::empty()
                }
            }
        })
    }

    fn update(&self, id: MemoryId, item: &MemoryItem) -> StoreFuture<'_, bool> {
        let mut item = item.clone();
        Box::pin(async move {
            item.id = id;
            // content may have changed, so delete then store re-embeds
            let outcome = async {
                self.try_delete(id).await?;
                self.try_store(&item).await
            }
            .await;
            match outcome {
                Ok(()) => true,
                Err(err) => {
                    warn!(%err, %id, "Vector store update failed");
                    false
                }
            }
        })
    }

    fn delete(&self, id: MemoryId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            match self.try_delete(id).await {
                Ok(()) => true,
                Err(err) => {
                    warn!(%err, %id, "Vector store delete failed");
                    false
                }
            }
        })
    }

    fn clear(&self) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            match self.try_clear().await {
                Ok(()) => true,
                Err(err) => {
                    warn!(%err, "Vector store clear failed");
                    false
                }
            }
        })
    }

    fn stats(&self) -> StoreFuture<'_, serde_json::Value> {
        Box::pin(async move {
            let total = self.count().await.unwrap_or(0);
            json!({
                "total_items": total,
                "table": self.table,
                "sqlite_path": self.path,
                "embedding_model": self.embedder.model_name(),
                "embedding_ndims": self.ndims,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::Metadata;
    use crate::embedding::embedder::EmbedFuture;

    /// Deterministic embedder: maps a few keywords onto orthogonal unit
    /// vectors so cosine similarity is exactly 1.0 or 0.0.
    struct KeywordEmbedder;

    impl Embedder for KeywordEmbedder {
        fn embed_text(&self, text: &str) -> EmbedFuture<'_, MemoryResult<Vec<f32>>> {
            let text = text.to_lowercase();
            Box::pin(async move {
                let vec = if text.contains("cat") {
                    vec![1.0, 0.0, 0.0]
                } else if text.contains("dog") {
                    vec![0.0, 1.0, 0.0]
                } else {
                    vec![0.0, 0.0, 1.0]
                };
                Ok(vec)
            })
        }

        fn ndims(&self) -> usize {
            3
        }

        fn model_name(&self) -> &str {
            "keyword-test"
        }
    }

    /// Embedder that always fails, for degradation tests.
    struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn embed_text(&self, _text: &str) -> EmbedFuture<'_, MemoryResult<Vec<f32>>> {
            Box::pin(async {
                Err(MemoryError::InvalidConfig(
                    "embedding backend down".to_string(),
                ))
            })
        }

        fn ndims(&self) -> usize {
            3
        }

        fn model_name(&self) -> &str {
            "failing-test"
        }
    }

    async fn open_store() -> SqliteVectorStore {
        init_sqlite_vec_extension();
        SqliteVectorStore::open_in_memory("memory_items", Arc::new(KeywordEmbedder))
            .await
            .expect("store opens")
    }

    fn fact(content: &str) -> MemoryItem {
        MemoryItem::new(MemoryKind::Fact, content, Metadata::new()).expect("valid item")
    }

    #[tokio::test]
    async fn test_store_and_retrieve_roundtrip() {
        let store = open_store().await;
        let item = MemoryItem::new(
            MemoryKind::Fact,
            "cats are mammals",
            Metadata::new().with("topic", "biology"),
        )
        .expect("valid item");
        assert!(store.store(&item).await);

        let query = MemoryQuery::new("cat facts").with_min_score(0.9);
        let result = store.retrieve(&query).await;
        assert_eq!(result.total_count, 1);

        let got = &result.items[0];
        assert_eq!(got.id, item.id);
        assert_eq!(got.kind, MemoryKind::Fact);
        assert_eq!(got.content, "cats are mammals");
        assert_eq!(got.metadata.get_str("topic"), Some("biology"));
        let similarity = got.metadata.similarity_score().expect("score attached");
        assert!(similarity > 0.99);
    }

    #[tokio::test]
    async fn test_threshold_discards_dissimilar() {
        let store = open_store().await;
        store.store(&fact("dogs bark")).await;

        let query = MemoryQuery::new("cat facts").with_min_score(0.5);
        let result = store.retrieve(&query).await;
        assert!(result.items.is_empty());
    }

    #[tokio::test]
    async fn test_kind_filter_restricts_candidates() {
        let store = open_store().await;
        store.store(&fact("cats are mammals")).await;
        let convo = MemoryItem::new(MemoryKind::Conversation, "cats again", Metadata::new())
            .expect("valid item");
        store.store(&convo).await;

        let query = MemoryQuery::new("cat")
            .with_kinds(vec![MemoryKind::Conversation])
            .with_min_score(0.5);
        let result = store.retrieve(&query).await;
        assert_eq!(result.total_count, 1);
        assert_eq!(result.items[0].kind, MemoryKind::Conversation);
    }

    #[tokio::test]
    async fn test_empty_query_lists_by_kind_newest_first() {
        let store = open_store().await;
        store.store(&fact("first fact")).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.store(&fact("second fact")).await;
        let convo = MemoryItem::new(MemoryKind::Conversation, "a turn", Metadata::new())
            .expect("valid item");
        store.store(&convo).await;

        let facts = store.retrieve(&MemoryQuery::match_all(MemoryKind::Fact)).await;
        assert_eq!(facts.total_count, 2);
        assert_eq!(facts.items[0].content, "second fact");
        assert!(facts.items[0].metadata.similarity_score().is_none());

        let all = store
            .retrieve(&MemoryQuery::new("").with_limit(10).with_min_score(0.0))
            .await;
        assert_eq!(all.total_count, 3);
    }

    #[tokio::test]
    async fn test_kind_filter_with_no_candidates() {
        let store = open_store().await;
        store.store(&fact("cats are mammals")).await;

        let query = MemoryQuery::new("cat").with_kinds(vec![MemoryKind::Plan]);
        let result = store.retrieve(&query).await;
        assert!(result.items.is_empty());
    }

    #[tokio::test]
    async fn test_update_reembeds_content() {
        let store = open_store().await;
        let item = fact("cats purr");
        store.store(&item).await;

        let replacement = fact("dogs bark");
        assert!(store.update(item.id, &replacement).await);

        let cats = store
            .retrieve(&MemoryQuery::new("cat").with_min_score(0.5))
            .await;
        assert!(cats.items.is_empty());

        let dogs = store
            .retrieve(&MemoryQuery::new("dog").with_min_score(0.5))
            .await;
        assert_eq!(dogs.total_count, 1);
        assert_eq!(dogs.items[0].id, item.id);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = open_store().await;
        let item = fact("cats purr");
        store.store(&item).await;

        assert!(store.delete(item.id).await);
        assert!(store.delete(item.id).await);
        assert!(store.delete(MemoryId::new()).await);

        let result = store
            .retrieve(&MemoryQuery::new("cat").with_min_score(0.5))
            .await;
        assert!(result.items.is_empty());
    }

    #[tokio::test]
    async fn test_clear_drops_and_recreates() {
        let store = open_store().await;
        store.store(&fact("cats purr")).await;
        assert!(store.clear().await);

        let stats = store.stats().await;
        assert_eq!(stats["total_items"], 0);

        // collection is usable again after recreate
        assert!(store.store(&fact("cats are back")).await);
    }

    #[tokio::test]
    async fn test_stats_reports_backend_identity() {
        let store = open_store().await;
        store.store(&fact("cats purr")).await;

        let stats = store.stats().await;
        assert_eq!(stats["total_items"], 1);
        assert_eq!(stats["table"], "memory_items");
        assert_eq!(stats["embedding_model"], "keyword-test");
        assert_eq!(stats["embedding_ndims"], 3);
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_without_error() {
        init_sqlite_vec_extension();
        let store = SqliteVectorStore::open_in_memory("memory_items", Arc::new(FailingEmbedder))
            .await
            .expect("store opens");

        assert!(!store.store(&fact("cats purr")).await);
        let result = store.retrieve(&MemoryQuery::new("cat")).await;
        assert!(result.items.is_empty());
    }

    #[tokio::test]
    async fn test_transient_scores_not_persisted() {
        let store = open_store().await;
        let mut item = fact("cats purr");
        item.metadata.set_relevance_score(0.4);
        store.store(&item).await;

        let result = store
            .retrieve(&MemoryQuery::new("cat").with_min_score(0.5))
            .await;
        assert!(result.items[0].metadata.relevance_score().is_none());
        assert!(result.items[0].metadata.similarity_score().is_some());
    }
}
