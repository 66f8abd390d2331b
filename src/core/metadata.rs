//! Metadata associated with each memory item.
//!
//! Metadata is an ordered string-keyed map with a small closed set of
//! reserved, documented keys plus an open bag for caller-defined scalars.
//!
//! Reserved keys written by the typed constructors:
//! - `importance`: fact importance level (`low`/`medium`/`high`)
//! - `role`: conversation role (`user`, `assistant`, ...)
//! - `title`, `url`, `source_type`: source descriptors
//! - `plan`: the structured plan payload, preserved verbatim
//! - `ttl`: cache time-to-live override in seconds
//!
//! Retrieval-only keys, populated on result items and never persisted:
//! - `similarity_score`: vector similarity in [0, 1]
//! - `relevance_score`: lexical term-overlap relevance in [0, 1]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::kinds::Importance;

/// Fact importance level.
pub const KEY_IMPORTANCE: &str = "importance";
/// Conversation role.
pub const KEY_ROLE: &str = "role";
/// Source title.
pub const KEY_TITLE: &str = "title";
/// Source URL.
pub const KEY_URL: &str = "url";
/// Source type (e.g. `web`, `paper`).
pub const KEY_SOURCE_TYPE: &str = "source_type";
/// Structured plan payload.
pub const KEY_PLAN: &str = "plan";
/// Cache TTL override (seconds).
pub const KEY_TTL: &str = "ttl";
/// Retrieval-only: vector similarity score.
pub const KEY_SIMILARITY_SCORE: &str = "similarity_score";
/// Retrieval-only: lexical relevance score.
pub const KEY_RELEVANCE_SCORE: &str = "relevance_score";

/// Keys that are attached to result items only and must never be persisted.
const TRANSIENT_KEYS: [&str; 2] = [KEY_SIMILARITY_SCORE, KEY_RELEVANCE_SCORE];

/// Ordered metadata map for a memory item.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, Value>);

impl Metadata {
    /// Create an empty metadata map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get a raw value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Get a string value by key.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Insert a value under a key, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Remove a key, returning its value if present.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Whether a key is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Fact importance, if present and well-formed.
    #[must_use]
    pub fn importance(&self) -> Option<Importance> {
        self.get_str(KEY_IMPORTANCE).and_then(|s| s.parse().ok())
    }

    /// Set the fact importance.
    pub fn set_importance(&mut self, importance: Importance) {
        self.insert(KEY_IMPORTANCE, importance.as_str());
    }

    /// Conversation role, if present.
    #[must_use]
    pub fn role(&self) -> Option<&str> {
        self.get_str(KEY_ROLE)
    }

    /// Source type, if present.
    #[must_use]
    pub fn source_type(&self) -> Option<&str> {
        self.get_str(KEY_SOURCE_TYPE)
    }

    /// Cache TTL override in seconds, if present.
    ///
    /// Accepts either an integer or a numeric string.
    #[must_use]
    pub fn ttl_seconds(&self) -> Option<u64> {
        match self.get(KEY_TTL)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Vector similarity score attached at retrieval time, if any.
    #[must_use]
    pub fn similarity_score(&self) -> Option<f64> {
        self.get(KEY_SIMILARITY_SCORE).and_then(Value::as_f64)
    }

    /// Attach the vector similarity score to a result item.
    pub fn set_similarity_score(&mut self, score: f64) {
        self.insert(KEY_SIMILARITY_SCORE, score);
    }

    /// Lexical relevance score attached at retrieval time, if any.
    #[must_use]
    pub fn relevance_score(&self) -> Option<f64> {
        self.get(KEY_RELEVANCE_SCORE).and_then(Value::as_f64)
    }

    /// Attach the lexical relevance score to a result item.
    pub fn set_relevance_score(&mut self, score: f64) {
        self.insert(KEY_RELEVANCE_SCORE, score);
    }

    /// Ranking score for merged results: similarity if present, else
    /// relevance, else 0.
    ///
    /// The two scores are computed on different scales (cosine-derived vs
    /// term-count-derived); comparing them on one axis is a known
    /// ranking-quality limitation that is preserved deliberately.
    #[must_use]
    pub fn ranking_score(&self) -> f64 {
        self.similarity_score()
            .or_else(|| self.relevance_score())
            .unwrap_or(0.0)
    }

    /// Copy of this map with retrieval-only keys stripped.
    ///
    /// Backends persist this form so transient scores never round-trip
    /// into stored metadata.
    #[must_use]
    pub fn persistable(&self) -> Self {
        let mut out = self.clone();
        for key in TRANSIENT_KEYS {
            out.0.remove(key);
        }
        out
    }
}

impl FromIterator<(String, Value)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
