//! TTL-indexed keyword cache backend.
//!
//! An in-process, expiring secondary index over memory items. Records are
//! keyed by id with a per-kind membership index for filtered queries, and
//! every record carries an expiry, default 24 hours, overridable through
//! the reserved `ttl` metadata key (seconds). Losing a cached copy to TTL
//! is normal; the vector store remains the durable record when enabled.
//!
//! Relevance is lexical term overlap between the query text and stored
//! content (see [`crate::retrieval::relevance`]), with an empty query
//! matching every candidate at relevance 1.0.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::json;
use tracing::debug;

use crate::core::config::CacheConfig;
use crate::core::ids::MemoryId;
use crate::core::item::{MemoryItem, MemoryQuery, QueryResult};
use crate::core::kinds::MemoryKind;
use crate::retrieval::relevance::term_overlap_score;
use crate::store::{MemoryStore, StoreFuture};

/// Cached item with its expiry.
#[derive(Clone)]
struct CacheRecord {
    item: MemoryItem,
    expires_at: Instant,
}

impl CacheRecord {
    fn new(item: MemoryItem, ttl: Duration) -> Self {
        Self {
            item,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-process TTL cache store.
pub struct TtlCacheStore {
    default_ttl: Duration,
    records: DashMap<MemoryId, CacheRecord>,
    kind_index: DashMap<MemoryKind, HashSet<MemoryId>>,
}

impl TtlCacheStore {
    /// Create a new cache store from config.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            default_ttl: Duration::from_secs(config.default_ttl_seconds),
            records: DashMap::new(),
            kind_index: DashMap::new(),
        }
    }

    fn insert_record(&self, item: &MemoryItem) {
        let ttl = item
            .metadata
            .ttl_seconds()
            .map_or(self.default_ttl, Duration::from_secs);

        let mut stored = item.clone();
        stored.metadata = stored.metadata.persistable();

        self.kind_index
            .entry(stored.kind)
            .or_default()
            .insert(stored.id);
        self.records
            .insert(stored.id, CacheRecord::new(stored, ttl));
    }

    fn remove_record(&self, id: MemoryId) {
        if let Some((_, record)) = self.records.remove(&id)
            && let Some(mut members) = self.kind_index.get_mut(&record.item.kind)
        {
            members.remove(&id);
        }
    }

    /// Candidate ids for a query: the union of the per-kind index sets, or
    /// every known id when no kind filter is given.
    fn candidate_ids(&self, query: &MemoryQuery) -> Vec<MemoryId> {
        match &query.kinds {
            Some(kinds) => {
                let mut ids = HashSet::new();
                for kind in kinds {
                    if let Some(members) = self.kind_index.get(kind) {
                        ids.extend(members.iter().copied());
                    }
                }
                ids.into_iter().collect()
            }
            None => self.records.iter().map(|entry| *entry.key()).collect(),
        }
    }

    /// Set the TTL of an existing record. Returns `false` if the record is
    /// missing or already expired.
    #[must_use]
    pub fn set_ttl(&self, id: MemoryId, ttl_seconds: u64) -> bool {
        match self.records.get_mut(&id) {
            Some(mut record) if !record.is_expired() => {
                record.expires_at = Instant::now() + Duration::from_secs(ttl_seconds);
                true
            }
            _ => false,
        }
    }

    /// Extend the remaining TTL of an existing record. A no-op returning
    /// `false` when the record has no remaining TTL.
    #[must_use]
    pub fn extend_ttl(&self, id: MemoryId, additional_seconds: u64) -> bool {
        match self.records.get_mut(&id) {
            Some(mut record) if !record.is_expired() => {
                record.expires_at += Duration::from_secs(additional_seconds);
                true
            }
            _ => false,
        }
    }

    /// Drop every expired record. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let expired: Vec<MemoryId> = self
            .records
            .iter()
            .filter(|entry| entry.value().is_expired())
            .map(|entry| *entry.key())
            .collect();

        for id in &expired {
            self.remove_record(*id);
        }

        if !expired.is_empty() {
            debug!(count = expired.len(), "Purged expired cache records");
        }
        expired.len()
    }

    /// Number of live (unexpired) records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .iter()
            .filter(|entry| !entry.value().is_expired())
            .count()
    }

    /// Whether the cache holds no live records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn retrieve_sync(&self, query: &MemoryQuery) -> QueryResult {
        let start = Instant::now();
        let mut scored = Vec::new();

        for id in self.candidate_ids(query) {
            let Some(record) = self.records.get(&id) else {
                continue;
            };
            if record.is_expired() {
                drop(record);
                self.remove_record(id);
                continue;
            }

            let relevance = term_overlap_score(&query.text, &record.item.content);
            if relevance < query.min_score {
                continue;
            }

            let mut item = record.item.clone();
            item.metadata.set_relevance_score(relevance);
            scored.push(item);
        }

        scored.sort_by(|a, b| {
            b.metadata
                .ranking_score()
                .total_cmp(&a.metadata.ranking_score())
        });
        scored.truncate(query.limit);

        QueryResult::new(scored, start.elapsed())
    }
}

impl MemoryStore for TtlCacheStore {
    fn name(&self) -> &str {
        "cache_store"
    }

    fn store(&self, item: &MemoryItem) -> StoreFuture<'_, bool> {
        let item = item.clone();
        Box::pin(async move {
            self.insert_record(&item);
            true
        })
    }

    fn retrieve(&self, query: &MemoryQuery) -> StoreFuture<'_, QueryResult> {
        let query = query.clone();
        Box::pin(async move { self.retrieve_sync(&query) })
    }

    fn update(&self, id: MemoryId, item: &MemoryItem) -> StoreFuture<'_, bool> {
        let mut item = item.clone();
        Box::pin(async move {
            self.remove_record(id);
            item.id = id;
            self.insert_record(&item);
            true
        })
    }

    fn delete(&self, id: MemoryId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            self.remove_record(id);
            true
        })
    }

    fn clear(&self) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            self.records.clear();
            self.kind_index.clear();
            true
        })
    }

    fn stats(&self) -> StoreFuture<'_, serde_json::Value> {
        Box::pin(async move {
            let kinds: Vec<&str> = self
                .kind_index
                .iter()
                .filter(|entry| !entry.value().is_empty())
                .map(|entry| entry.key().as_str())
                .collect();

            json!({
                "total_items": self.len(),
                "memory_kinds": kinds,
                "default_ttl_seconds": self.default_ttl.as_secs(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::{KEY_TTL, Metadata};

    fn cache() -> TtlCacheStore {
        TtlCacheStore::new(&CacheConfig::default())
    }

    fn fact(content: &str) -> MemoryItem {
        MemoryItem::new(MemoryKind::Fact, content, Metadata::new()).expect("valid item")
    }

    #[tokio::test]
    async fn test_store_and_retrieve_by_kind() {
        let store = cache();
        let item = fact("cats are mammals");
        assert!(store.store(&item).await);

        let query = MemoryQuery::new("mammals")
            .with_kinds(vec![MemoryKind::Fact])
            .with_min_score(0.5);
        let result = store.retrieve(&query).await;
        assert_eq!(result.total_count, 1);
        assert_eq!(result.items[0].id, item.id);
        assert_eq!(result.items[0].metadata.relevance_score(), Some(1.0));
    }

    #[tokio::test]
    async fn test_kind_filter_excludes_other_kinds() {
        let store = cache();
        store.store(&fact("cats are mammals")).await;

        let query = MemoryQuery::new("mammals")
            .with_kinds(vec![MemoryKind::Source])
            .with_min_score(0.0);
        let result = store.retrieve(&query).await;
        assert!(result.items.is_empty());
    }

    #[tokio::test]
    async fn test_threshold_filters_low_relevance() {
        let store = cache();
        store.store(&fact("cats are mammals")).await;

        let query = MemoryQuery::new("quantum physics").with_min_score(0.1);
        let result = store.retrieve(&query).await;
        assert!(result.items.is_empty());
    }

    #[tokio::test]
    async fn test_empty_query_matches_all() {
        let store = cache();
        store.store(&fact("alpha")).await;
        store.store(&fact("beta")).await;

        let query = MemoryQuery::match_all(MemoryKind::Fact);
        let result = store.retrieve(&query).await;
        assert_eq!(result.total_count, 2);
    }

    #[tokio::test]
    async fn test_ttl_metadata_override_expires_record() {
        let store = cache();
        let item = MemoryItem::new(
            MemoryKind::Fact,
            "short lived",
            Metadata::new().with(KEY_TTL, 0),
        )
        .expect("valid item");
        store.store(&item).await;

        let query = MemoryQuery::match_all(MemoryKind::Fact);
        let result = store.retrieve(&query).await;
        assert!(result.items.is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = cache();
        let item = fact("to delete");
        store.store(&item).await;

        assert!(store.delete(item.id).await);
        assert!(store.delete(item.id).await);

        let result = store.retrieve(&MemoryQuery::match_all(MemoryKind::Fact)).await;
        assert!(result.items.is_empty());
    }

    #[tokio::test]
    async fn test_update_replaces_content_under_same_id() {
        let store = cache();
        let item = fact("old content");
        store.store(&item).await;

        let replacement = fact("new content entirely");
        assert!(store.update(item.id, &replacement).await);

        let result = store.retrieve(&MemoryQuery::match_all(MemoryKind::Fact)).await;
        assert_eq!(result.total_count, 1);
        assert_eq!(result.items[0].id, item.id);
        assert_eq!(result.items[0].content, "new content entirely");
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let store = cache();
        store.store(&fact("one")).await;
        store.store(&fact("two")).await;

        assert!(store.clear().await);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_set_and_extend_ttl() {
        let store = cache();
        let item = fact("ttl adjustments");
        store.store(&item).await;

        assert!(store.set_ttl(item.id, 120));
        assert!(store.extend_ttl(item.id, 60));

        // expired record: extend is a no-op returning false
        assert!(store.set_ttl(item.id, 0));
        assert!(!store.extend_ttl(item.id, 60));
        // unknown id
        assert!(!store.set_ttl(MemoryId::new(), 10));
    }

    #[tokio::test]
    async fn test_purge_expired_sweeps_records() {
        let store = cache();
        let short = MemoryItem::new(
            MemoryKind::Conversation,
            "ephemeral",
            Metadata::new().with(KEY_TTL, 0),
        )
        .expect("valid item");
        let long = fact("durable");
        store.store(&short).await;
        store.store(&long).await;

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_transient_scores_not_persisted() {
        let store = cache();
        let mut item = fact("scored at retrieval");
        item.metadata.set_similarity_score(0.99);
        store.store(&item).await;

        let result = store.retrieve(&MemoryQuery::match_all(MemoryKind::Fact)).await;
        // stored copy dropped the transient similarity; only the fresh
        // relevance score is attached
        assert!(result.items[0].metadata.similarity_score().is_none());
        assert!(result.items[0].metadata.relevance_score().is_some());
    }

    #[tokio::test]
    async fn test_stats_reports_counts_and_kinds() {
        let store = cache();
        store.store(&fact("a fact")).await;

        let stats = store.stats().await;
        assert_eq!(stats["total_items"], 1);
        assert_eq!(stats["memory_kinds"][0], "fact");
    }

    #[tokio::test]
    async fn test_results_sorted_by_relevance() {
        let store = cache();
        store.store(&fact("cats")).await;
        store.store(&fact("cats and dogs and birds")).await;

        let query = MemoryQuery::new("cats dogs").with_min_score(0.0);
        let result = store.retrieve(&query).await;
        assert_eq!(result.items[0].content, "cats and dogs and birds");
    }
}
