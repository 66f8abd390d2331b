//! Merging and ranking of fan-out results.

use std::collections::HashSet;

use crate::core::ids::MemoryId;
use crate::core::item::MemoryItem;

/// Merge primary (vector) and secondary (cache) results into one ranked
/// list.
///
/// Secondary items whose id already appeared in the primary list are
/// dropped; the vector store is the more authoritative source on an id
/// collision. The merged list is sorted by descending ranking score
/// (`similarity_score` if present, else `relevance_score`) and truncated
/// to `limit`.
///
/// The two scores are computed on different scales, so cross-backend
/// ordering is approximate; this mirrors the upstream merge policy and is
/// a known ranking-quality limitation, kept deliberately rather than
/// re-normalized here.
#[must_use]
pub fn merge_ranked(
    primary: Vec<MemoryItem>,
    secondary: Vec<MemoryItem>,
    limit: usize,
) -> Vec<MemoryItem> {
    let seen: HashSet<MemoryId> = primary.iter().map(|item| item.id).collect();

    let mut merged = primary;
    merged.extend(
        secondary
            .into_iter()
            .filter(|item| !seen.contains(&item.id)),
    );

    merged.sort_by(|a, b| {
        b.metadata
            .ranking_score()
            .total_cmp(&a.metadata.ranking_score())
    });
    merged.truncate(limit);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kinds::MemoryKind;
    use crate::core::metadata::Metadata;

    fn item_with_similarity(content: &str, score: f64) -> MemoryItem {
        let mut item =
            MemoryItem::new(MemoryKind::Fact, content, Metadata::new()).expect("valid item");
        item.metadata.set_similarity_score(score);
        item
    }

    fn item_with_relevance(content: &str, score: f64) -> MemoryItem {
        let mut item =
            MemoryItem::new(MemoryKind::Fact, content, Metadata::new()).expect("valid item");
        item.metadata.set_relevance_score(score);
        item
    }

    #[test]
    fn test_dedup_prefers_primary() {
        let primary = item_with_similarity("from vector", 0.3);
        let mut duplicate = item_with_relevance("from cache", 0.9);
        duplicate.id = primary.id;

        let merged = merge_ranked(vec![primary.clone()], vec![duplicate], 10);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].content, "from vector");
    }

    #[test]
    fn test_sorts_descending_across_score_kinds() {
        let a = item_with_similarity("a", 0.5);
        let b = item_with_relevance("b", 0.9);
        let c = item_with_similarity("c", 0.7);

        let merged = merge_ranked(vec![a, c], vec![b], 10);
        let contents: Vec<&str> = merged.iter().map(|i| i.content.as_str()).collect();
        assert_eq!(contents, ["b", "c", "a"]);
    }

    #[test]
    fn test_truncates_to_limit() {
        let items: Vec<MemoryItem> = (0..5)
            .map(|i| item_with_similarity(&format!("item {i}"), f64::from(i) / 10.0))
            .collect();

        let merged = merge_ranked(items, Vec::new(), 2);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].content, "item 4");
    }

    #[test]
    fn test_unscored_items_sink_to_bottom() {
        let scored = item_with_similarity("scored", 0.2);
        let unscored =
            MemoryItem::new(MemoryKind::Fact, "unscored", Metadata::new()).expect("valid item");

        let merged = merge_ranked(vec![unscored], vec![scored], 10);
        assert_eq!(merged[0].content, "scored");
    }
}
