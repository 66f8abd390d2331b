//! Core types: configuration, errors, ids, kinds, items, and metadata.

pub mod config;
pub mod errors;
pub mod ids;
pub mod item;
pub mod kinds;
pub mod metadata;

pub use config::{CacheConfig, CleanupConfig, EmbeddingConfig, MemoryConfig, VectorConfig};
pub use errors::{MemoryError, MemoryResult};
pub use ids::MemoryId;
pub use item::{MemoryItem, MemoryQuery, QueryResult};
pub use kinds::{Importance, MemoryKind};
pub use metadata::Metadata;
