//! Configuration for the memory subsystem.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::errors::{MemoryError, MemoryResult};

/// Top-level configuration for the memory manager and its backends.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Vector backend settings.
    pub vector: VectorConfig,
    /// Cache backend settings.
    pub cache: CacheConfig,
    /// Embedding model settings.
    pub embedding: EmbeddingConfig,
    /// Background cleanup settings.
    pub cleanup: CleanupConfig,
}

impl MemoryConfig {
    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> MemoryResult<()> {
        if self.vector.table.is_empty() {
            return Err(MemoryError::InvalidConfig(
                "vector.table must not be empty".to_string(),
            ));
        }

        if self.embedding.ndims == 0 {
            return Err(MemoryError::InvalidConfig(
                "embedding.ndims must be > 0".to_string(),
            ));
        }

        if self.cache.default_ttl_seconds == 0 {
            return Err(MemoryError::InvalidConfig(
                "cache.default_ttl_seconds must be > 0".to_string(),
            ));
        }

        if self.cleanup.interval_seconds == 0 {
            return Err(MemoryError::InvalidConfig(
                "cleanup.interval_seconds must be > 0".to_string(),
            ));
        }

        if let Some(base_url) = &self.embedding.base_url {
            Url::parse(base_url)?;
        }

        Ok(())
    }
}

/// Vector backend settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VectorConfig {
    /// Path to the `SQLite` database file.
    pub sqlite_path: PathBuf,
    /// Base table name for items; embeddings live in `{table}_vec`.
    pub table: String,
    /// Whether the vector backend is enabled.
    pub enabled: bool,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("engram.db"),
            table: "memory_items".to_string(),
            enabled: true,
        }
    }
}

/// Cache backend settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Default record TTL in seconds when no per-item override is given.
    pub default_ttl_seconds: u64,
    /// Whether the cache backend is enabled.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 86_400, // 24 hours
            enabled: true,
        }
    }
}

/// Embedding model settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding model name.
    pub model: String,
    /// Embedding dimensionality.
    pub ndims: usize,
    /// Optional base URL override for the embedding service.
    pub base_url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "nomic-embed-text".to_string(),
            ndims: 768,
            base_url: None,
        }
    }
}

/// Background cleanup settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Interval between cache sweep runs, in seconds.
    pub interval_seconds: u64,
    /// Whether the background sweeper is enabled.
    pub enabled: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 300,
            enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = MemoryConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_ttl() {
        let mut config = MemoryConfig::default();
        config.cache.default_ttl_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let mut config = MemoryConfig::default();
        config.embedding.base_url = Some("not a url".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_table() {
        let mut config = MemoryConfig::default();
        config.vector.table = String::new();
        assert!(config.validate().is_err());
    }
}
