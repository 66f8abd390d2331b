//! Backend store contract and the two concrete backends.

pub mod cache;
pub mod vector;

use std::future::Future;
use std::pin::Pin;

use crate::core::ids::MemoryId;
use crate::core::item::{MemoryItem, MemoryQuery, QueryResult};

pub use cache::TtlCacheStore;
pub use vector::{SqliteVectorStore, init_sqlite_vec_extension};

/// Boxed future type for store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Common capability contract implemented by both backends.
///
/// Transient I/O failures are caught at the store boundary, logged, and
/// converted into `false` / empty results; none of these operations
/// surface errors to the caller.
pub trait MemoryStore: Send + Sync {
    /// Store name for stats keys and logs.
    fn name(&self) -> &str;

    /// Persist a memory item. Returns `false` on any backend failure.
    fn store(&self, item: &MemoryItem) -> StoreFuture<'_, bool>;

    /// Retrieve items matching a query, ordered by descending score.
    ///
    /// A failed backend call yields an empty result, not an error.
    fn retrieve(&self, query: &MemoryQuery) -> StoreFuture<'_, QueryResult>;

    /// Replace the item stored under `id` (delete-then-store).
    fn update(&self, id: MemoryId, item: &MemoryItem) -> StoreFuture<'_, bool>;

    /// Delete by id. Idempotent: deleting a nonexistent id succeeds.
    fn delete(&self, id: MemoryId) -> StoreFuture<'_, bool>;

    /// Remove every item held by this store.
    fn clear(&self) -> StoreFuture<'_, bool>;

    /// Backend statistics (item count, identity, configuration).
    fn stats(&self) -> StoreFuture<'_, serde_json::Value>;
}
