//! Memory item kinds.
//!
//! The kind classifies what a memory item *is*: a research fact, a
//! conversation turn, an external source, or a research plan. It is
//! immutable after creation and drives the manager's caching policy and
//! per-kind retrieval filters.
//!
//! Kinds use stable `snake_case` identifiers for storage and
//! interoperability.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::MemoryError;

/// Semantic category of a memory item.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// A standalone research fact.
    Fact,
    /// A single conversation turn.
    Conversation,
    /// An external source (web page, paper, document).
    Source,
    /// A structured research plan.
    Plan,
}

impl MemoryKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 4] = [Self::Fact, Self::Conversation, Self::Source, Self::Plan];

    /// Stable string representation (for storage and logs).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Conversation => "conversation",
            Self::Source => "source",
            Self::Plan => "plan",
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryKind {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fact" => Ok(Self::Fact),
            "conversation" => Ok(Self::Conversation),
            "source" => Ok(Self::Source),
            "plan" => Ok(Self::Plan),
            other => Err(MemoryError::InvalidMemoryItem(format!(
                "unknown memory kind: {other}"
            ))),
        }
    }
}

/// Importance level for fact items.
///
/// Stored under the reserved `importance` metadata key; only high-importance
/// facts are admitted to the cache backend.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    /// Low importance.
    Low,
    /// Medium importance (default for facts).
    Medium,
    /// High importance; qualifies a fact for caching.
    High,
}

impl Importance {
    /// Stable string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Importance {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(MemoryError::InvalidMemoryItem(format!(
                "unknown importance: {other}"
            ))),
        }
    }
}
