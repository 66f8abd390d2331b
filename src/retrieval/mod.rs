//! Scoring and result-merging helpers.

pub mod merge;
pub mod relevance;

pub use merge::merge_ranked;
pub use relevance::term_overlap_score;
