//! Memory item, query, and result contracts shared by all stores.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::{MemoryError, MemoryResult};
use crate::core::ids::MemoryId;
use crate::core::kinds::MemoryKind;
use crate::core::metadata::Metadata;

/// A typed unit of stored knowledge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Unique identifier, assigned once at creation.
    pub id: MemoryId,
    /// Semantic category; immutable after creation.
    pub kind: MemoryKind,
    /// Searchable text content.
    pub content: String,
    /// Ordered metadata map (reserved keys + caller-defined scalars).
    pub metadata: Metadata,
    /// Creation instant; not mutated by updates.
    pub created_at: DateTime<Utc>,
}

impl MemoryItem {
    /// Create a new memory item with a fresh id and the current timestamp.
    ///
    /// # Errors
    /// Returns an error if content is empty after trimming.
    pub fn new(
        kind: MemoryKind,
        content: impl Into<String>,
        metadata: Metadata,
    ) -> MemoryResult<Self> {
        let content = content.into();
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(MemoryError::InvalidMemoryItem(
                "content is empty".to_string(),
            ));
        }

        Ok(Self {
            id: MemoryId::new(),
            kind,
            content: trimmed.to_string(),
            metadata,
            created_at: Utc::now(),
        })
    }
}

/// A retrieval request evaluated against one or both backends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryQuery {
    /// Query text. Empty text means "match all".
    pub text: String,
    /// Optional kind filter; `None` searches every kind.
    pub kinds: Option<Vec<MemoryKind>>,
    /// Maximum number of items to return.
    pub limit: usize,
    /// Score cutoff in [0, 1]: similarity for the vector backend,
    /// relevance for the cache backend.
    pub min_score: f64,
}

impl MemoryQuery {
    /// Create a query over the given text with default limit and cutoff.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// The canonical "list all items of the given kind" query: empty text
    /// with a zero cutoff.
    #[must_use]
    pub fn match_all(kind: MemoryKind) -> Self {
        Self {
            text: String::new(),
            kinds: Some(vec![kind]),
            min_score: 0.0,
            ..Self::default()
        }
    }

    /// Restrict the query to the given kinds.
    #[must_use]
    pub fn with_kinds(mut self, kinds: Vec<MemoryKind>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    /// Set the result limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set the score cutoff.
    #[must_use]
    pub const fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    /// Whether a kind passes this query's filter.
    #[must_use]
    pub fn matches_kind(&self, kind: MemoryKind) -> bool {
        self.kinds.as_ref().is_none_or(|kinds| kinds.contains(&kind))
    }
}

impl Default for MemoryQuery {
    fn default() -> Self {
        Self {
            text: String::new(),
            kinds: None,
            limit: 10,
            min_score: 0.7,
        }
    }
}

/// Items returned by a single backend query, ordered by descending score.
#[derive(Clone, Debug, Default)]
pub struct QueryResult {
    /// Retrieved items in descending score order; ties are unordered.
    pub items: Vec<MemoryItem>,
    /// Number of items returned.
    pub total_count: usize,
    /// Wall-clock time the backend spent serving the query.
    pub query_time: Duration,
}

impl QueryResult {
    /// Build a result from items and a measured duration.
    #[must_use]
    pub fn new(items: Vec<MemoryItem>, query_time: Duration) -> Self {
        let total_count = items.len();
        Self {
            items,
            total_count,
            query_time,
        }
    }

    /// The empty result used when a backend fails or is disabled.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}
