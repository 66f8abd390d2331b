//! Hybrid memory subsystem: typed knowledge items persisted across a
//! semantic vector index and a TTL keyword cache behind one manager.
//!
//! The [`manager::MemoryManager`] is the single entry point. It applies a
//! dual-write policy on store, concurrent fan-out with ranked merging on
//! retrieval, and AND-consistency on update and delete, degrading
//! gracefully when a backend is unavailable.

// Style discipline
#![deny(nonstandard_style)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(non_upper_case_globals)]
#![forbid(unsafe_op_in_unsafe_fn)]
// Hygiene
#![warn(missing_docs)]
#![warn(unused_imports)]
#![warn(clippy::all)]

/// Core contracts: items, queries, errors, configuration.
pub mod core;
/// Text embedding via a local Ollama runtime.
pub mod embedding;
/// Background TTL sweeping for the cache backend.
pub mod maintenance;
/// The unified memory manager and its storage policies.
pub mod manager;
/// Result merging and lexical relevance scoring.
pub mod retrieval;
/// Storage backends behind the [`store::MemoryStore`] trait.
pub mod store;

pub use crate::core::config::MemoryConfig;
pub use crate::core::errors::{MemoryError, MemoryResult};
pub use crate::core::ids::MemoryId;
pub use crate::core::item::{MemoryItem, MemoryQuery, QueryResult};
pub use crate::core::kinds::{Importance, MemoryKind};
pub use crate::core::metadata::Metadata;
pub use crate::manager::{MemoryManager, PlanData, PlanSection};
