//! Memory manager orchestrating the vector and cache backends.
//!
//! The manager is the single entry point callers interact with. It owns
//! zero, one, or two backends, each independently enabled, and applies:
//!
//! - a dual-write policy (vector always offered; cache only when the
//!   caching predicate holds; success = at least one write OR),
//! - concurrent fan-out reads merged with vector-wins dedup and
//!   descending-score ranking,
//! - AND-consistency for update/delete/clear (a partial success is a
//!   surfaced inconsistency, not silently absorbed),
//! - graceful degradation: a backend that fails to construct stays
//!   disabled for the manager's lifetime, and the manager keeps serving
//!   with whatever remains.
//!
//! No caller-facing operation here returns an error: backend trouble
//! surfaces as `None`, `false`, or empty results.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::core::config::MemoryConfig;
use crate::core::ids::MemoryId;
use crate::core::item::{MemoryItem, MemoryQuery, QueryResult};
use crate::core::kinds::{Importance, MemoryKind};
use crate::core::metadata::{KEY_PLAN, KEY_ROLE, KEY_SOURCE_TYPE, KEY_TITLE, KEY_URL, Metadata};
use crate::embedding::embedder::Embedder;
use crate::maintenance::cleanup::BackgroundCleanup;
use crate::retrieval::merge::merge_ranked;
use crate::store::vector::SqliteVectorStore;
use crate::store::{MemoryStore, TtlCacheStore};

/// A structured research plan stored as a plan item.
///
/// The flattened text form becomes the item's searchable content; the
/// structured payload is preserved verbatim under the `plan` metadata key.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanData {
    /// Research topic.
    pub topic: String,
    /// Plan overview.
    pub overview: String,
    /// Plan sections.
    pub sections: Vec<PlanSection>,
}

/// One section of a research plan.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanSection {
    /// Section title.
    pub title: String,
    /// Section description.
    pub description: String,
    /// Search queries planned for this section.
    pub queries: Vec<String>,
}

impl PlanData {
    /// Flatten the plan into a single searchable text blob.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut parts = Vec::new();

        if !self.topic.is_empty() {
            parts.push(format!("Topic: {}", self.topic));
        }
        if !self.overview.is_empty() {
            parts.push(format!("Overview: {}", self.overview));
        }
        for section in &self.sections {
            parts.push(format!("Section: {}", section.title));
            parts.push(format!("Description: {}", section.description));
            if !section.queries.is_empty() {
                parts.push(format!("Queries: {}", section.queries.join(", ")));
            }
        }

        parts.join("\n")
    }
}

/// Builder for injecting backends into a [`MemoryManager`].
#[derive(Default)]
pub struct MemoryManagerBuilder {
    vector_store: Option<Arc<dyn MemoryStore>>,
    cache_store: Option<Arc<dyn MemoryStore>>,
}

impl MemoryManagerBuilder {
    /// Use the given vector backend.
    #[must_use]
    pub fn vector_store(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Use the given cache backend.
    #[must_use]
    pub fn cache_store(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    /// Build the manager with whatever backends were provided.
    #[must_use]
    pub fn build(self) -> MemoryManager {
        MemoryManager {
            vector_store: self.vector_store,
            cache_store: self.cache_store,
            cleanup_shutdown: None,
        }
    }
}

/// Unified memory manager over the vector and cache backends.
pub struct MemoryManager {
    vector_store: Option<Arc<dyn MemoryStore>>,
    cache_store: Option<Arc<dyn MemoryStore>>,
    cleanup_shutdown: Option<Arc<Notify>>,
}

impl MemoryManager {
    /// Start building a manager with injected backends.
    #[must_use]
    pub fn builder() -> MemoryManagerBuilder {
        MemoryManagerBuilder::default()
    }

    /// Construct a manager with default backends from config.
    ///
    /// A default backend that fails to construct is logged and stays
    /// disabled for the manager's lifetime; the manager is usable with one
    /// backend or none. When the cache is enabled, a background TTL sweep
    /// worker is spawned (stopped by [`MemoryManager::close`]).
    ///
    /// # Errors
    /// Returns an error only for invalid configuration, never for backend
    /// unavailability.
    pub async fn with_defaults(
        config: &MemoryConfig,
        embedder: Arc<dyn Embedder>,
    ) -> crate::core::errors::MemoryResult<Self> {
        config.validate()?;

        let vector_store: Option<Arc<dyn MemoryStore>> = if config.vector.enabled {
            match SqliteVectorStore::new(&config.vector, embedder).await {
                Ok(store) => Some(Arc::new(store)),
                Err(err) => {
                    warn!(%err, "Vector store unavailable; continuing without it");
                    None
                }
            }
        } else {
            None
        };

        let mut cleanup_shutdown = None;
        let cache_store: Option<Arc<dyn MemoryStore>> = if config.cache.enabled {
            let cache = Arc::new(TtlCacheStore::new(&config.cache));
            let worker = BackgroundCleanup::new(Arc::clone(&cache), config.cleanup.clone());
            cleanup_shutdown = Some(worker.shutdown_notifier());
            drop(worker.spawn());
            Some(cache)
        } else {
            None
        };

        info!(
            vector_enabled = vector_store.is_some(),
            cache_enabled = cache_store.is_some(),
            "Memory manager initialized"
        );

        Ok(Self {
            vector_store,
            cache_store,
            cleanup_shutdown,
        })
    }

    /// Whether the vector backend is enabled.
    #[must_use]
    pub fn vector_enabled(&self) -> bool {
        self.vector_store.is_some()
    }

    /// Whether the cache backend is enabled.
    #[must_use]
    pub fn cache_enabled(&self) -> bool {
        self.cache_store.is_some()
    }

    /// Store a research fact. Facts default to medium importance; only
    /// high-importance facts are also cached.
    ///
    /// Returns the new item's id, or `None` if no backend accepted the
    /// write.
    pub async fn store_fact(&self, content: &str, mut metadata: Metadata) -> Option<MemoryId> {
        if metadata.importance().is_none() {
            metadata.set_importance(Importance::Medium);
        }
        self.create_and_store(MemoryKind::Fact, content, metadata)
            .await
    }

    /// Store a conversation turn under the given role.
    pub async fn store_conversation(
        &self,
        role: &str,
        content: &str,
        mut metadata: Metadata,
    ) -> Option<MemoryId> {
        metadata.insert(KEY_ROLE, role);
        self.create_and_store(MemoryKind::Conversation, content, metadata)
            .await
    }

    /// Store an external source with its descriptors.
    pub async fn store_source(
        &self,
        title: &str,
        content: &str,
        url: Option<&str>,
        source_type: &str,
        mut metadata: Metadata,
    ) -> Option<MemoryId> {
        metadata.insert(KEY_TITLE, title);
        if let Some(url) = url {
            metadata.insert(KEY_URL, url);
        }
        metadata.insert(KEY_SOURCE_TYPE, source_type);
        self.create_and_store(MemoryKind::Source, content, metadata)
            .await
    }

    /// Store a research plan.
    ///
    /// The flattened plan text is the stored content; the structured plan
    /// is preserved under the `plan` metadata key. Plans are never cached,
    /// so with the vector store disabled a stored plan is unretrievable
    /// even though this reports success. A known policy gap, kept as is.
    pub async fn store_plan(&self, plan: &PlanData, mut metadata: Metadata) -> Option<MemoryId> {
        let payload = match serde_json::to_value(plan) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%err, "Failed to serialize plan payload");
                return None;
            }
        };
        metadata.insert(KEY_PLAN, payload);
        self.create_and_store(MemoryKind::Plan, &plan.to_text(), metadata)
            .await
    }

    async fn create_and_store(
        &self,
        kind: MemoryKind,
        content: &str,
        metadata: Metadata,
    ) -> Option<MemoryId> {
        let item = match MemoryItem::new(kind, content, metadata) {
            Ok(item) => item,
            Err(err) => {
                warn!(%err, %kind, "Rejected invalid memory item");
                return None;
            }
        };

        let id = item.id;
        self.store_item(&item).await.then_some(id)
    }

    /// Whether an item qualifies for the cache backend.
    ///
    /// Conversations and sources are always cached; facts only at high
    /// importance; plans never.
    fn should_cache(item: &MemoryItem) -> bool {
        match item.kind {
            MemoryKind::Conversation | MemoryKind::Source => true,
            MemoryKind::Fact => item.metadata.importance() == Some(Importance::High),
            MemoryKind::Plan => false,
        }
    }

    /// Offer the item to the appropriate backends concurrently.
    ///
    /// Best-effort write: the item counts as stored if at least one
    /// attempted write succeeds. The only unconditional failure is having
    /// no backend to offer the item to.
    async fn store_item(&self, item: &MemoryItem) -> bool {
        let mut writes = Vec::new();
        if let Some(vector) = &self.vector_store {
            writes.push(vector.store(item));
        }
        if let Some(cache) = &self.cache_store {
            if Self::should_cache(item) {
                writes.push(cache.store(item));
            } else {
                debug!(id = %item.id, kind = %item.kind, "Item not eligible for cache");
            }
        }

        if writes.is_empty() {
            warn!(id = %item.id, "No backend available for write");
            return false;
        }

        let outcomes = futures::future::join_all(writes).await;
        outcomes.into_iter().any(|ok| ok)
    }

    /// Fan out a query to the enabled backends and merge the results.
    ///
    /// The vector store is skipped for empty query text (it has nothing to
    /// embed); the cache serves match-all queries. Vector results win on
    /// id collisions.
    async fn retrieve_items(&self, query: &MemoryQuery) -> Vec<MemoryItem> {
        let vector_results = async {
            match &self.vector_store {
                Some(store) if !query.text.is_empty() => store.retrieve(query).await,
                _ => QueryResult::empty(),
            }
        };
        let cache_results = async {
            match &self.cache_store {
                Some(store) => store.retrieve(query).await,
                None => QueryResult::empty(),
            }
        };

        let (vector_results, cache_results) = tokio::join!(vector_results, cache_results);
        merge_ranked(vector_results.items, cache_results.items, query.limit)
    }

    /// Retrieve relevant facts.
    pub async fn retrieve_facts(
        &self,
        query: &str,
        limit: usize,
        min_score: f64,
    ) -> Vec<MemoryItem> {
        let query = MemoryQuery::new(query)
            .with_kinds(vec![MemoryKind::Fact])
            .with_limit(limit)
            .with_min_score(min_score);
        self.retrieve_items(&query).await
    }

    /// Retrieve relevant sources, optionally post-filtered by source type.
    ///
    /// The backends cannot filter on nested metadata, so the `source_type`
    /// filter is applied here after retrieval.
    pub async fn retrieve_sources(
        &self,
        query: &str,
        source_types: Option<&[&str]>,
        limit: usize,
        min_score: f64,
    ) -> Vec<MemoryItem> {
        let query = MemoryQuery::new(query)
            .with_kinds(vec![MemoryKind::Source])
            .with_limit(limit)
            .with_min_score(min_score);
        let sources = self.retrieve_items(&query).await;

        match source_types {
            Some(types) => sources
                .into_iter()
                .filter(|item| {
                    item.metadata
                        .source_type()
                        .is_some_and(|st| types.contains(&st))
                })
                .collect(),
            None => sources,
        }
    }

    /// Retrieve conversation history, most recent first.
    ///
    /// Conversation recall is chronological, not relevance-ranked, so the
    /// merged result is re-sorted by timestamp. An optional role filter is
    /// applied here (backends cannot filter on metadata fields).
    pub async fn retrieve_conversation(
        &self,
        limit: usize,
        role: Option<&str>,
    ) -> Vec<MemoryItem> {
        let query = MemoryQuery::match_all(MemoryKind::Conversation).with_limit(limit);
        let mut turns = self.retrieve_items(&query).await;

        if let Some(role) = role {
            turns.retain(|item| item.metadata.role() == Some(role));
        }

        turns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        turns
    }

    /// Retrieve stored research plans.
    ///
    /// Issues a match-all query, which skips the vector store; since plans
    /// are never cached, only plans still present in an injected backend
    /// that serves match-all queries are returned (see [`Self::store_plan`]).
    pub async fn retrieve_plans(&self, limit: usize) -> Vec<MemoryItem> {
        let query = MemoryQuery::match_all(MemoryKind::Plan).with_limit(limit);
        self.retrieve_items(&query).await
    }

    /// Search across memory kinds.
    pub async fn search_all(
        &self,
        query: &str,
        kinds: Option<Vec<MemoryKind>>,
        limit: usize,
        min_score: f64,
    ) -> Vec<MemoryItem> {
        let mut query = MemoryQuery::new(query)
            .with_limit(limit)
            .with_min_score(min_score);
        query.kinds = kinds;
        self.retrieve_items(&query).await
    }

    /// Update the item stored under `id` in every enabled backend.
    ///
    /// Returns `true` only if every enabled backend succeeded. A partial
    /// success leaves a stale copy in one backend; it is reported as
    /// failure (no rollback is attempted) so the caller can retry or
    /// alert.
    pub async fn update_item(&self, id: MemoryId, item: &MemoryItem) -> bool {
        let mut ops = Vec::new();
        if let Some(vector) = &self.vector_store {
            ops.push(vector.update(id, item));
        }
        if let Some(cache) = &self.cache_store {
            ops.push(cache.update(id, item));
        }

        futures::future::join_all(ops).await.into_iter().all(|ok| ok)
    }

    /// Delete the item stored under `id` from every enabled backend.
    ///
    /// Success is the logical AND of each backend's outcome.
    pub async fn delete_item(&self, id: MemoryId) -> bool {
        let mut ops = Vec::new();
        if let Some(vector) = &self.vector_store {
            ops.push(vector.delete(id));
        }
        if let Some(cache) = &self.cache_store {
            ops.push(cache.delete(id));
        }

        futures::future::join_all(ops).await.into_iter().all(|ok| ok)
    }

    /// Clear every enabled backend.
    pub async fn clear_all(&self) -> bool {
        let mut ops = Vec::new();
        if let Some(vector) = &self.vector_store {
            ops.push(vector.clear());
        }
        if let Some(cache) = &self.cache_store {
            ops.push(cache.clear());
        }

        futures::future::join_all(ops).await.into_iter().all(|ok| ok)
    }

    /// Statistics per enabled backend, keyed by backend name.
    ///
    /// A disabled backend is absent from the map.
    pub async fn get_memory_stats(&self) -> Map<String, Value> {
        let mut stats = Map::new();
        if let Some(vector) = &self.vector_store {
            stats.insert(vector.name().to_string(), vector.stats().await);
        }
        if let Some(cache) = &self.cache_store {
            stats.insert(cache.name().to_string(), cache.stats().await);
        }
        stats
    }

    /// Stop the background cleanup worker, if this manager spawned one.
    pub fn close(&self) {
        if let Some(shutdown) = &self.cleanup_shutdown {
            shutdown.notify_one();
        }
    }
}
