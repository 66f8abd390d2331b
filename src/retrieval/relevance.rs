//! Lexical relevance scoring for the cache backend.

/// Score content against query text by term overlap.
///
/// The query is split into lowercase whitespace terms; each term
/// contributes its occurrence count within the lowercase content. The sum
/// is normalized by the number of terms and capped at 1.0.
///
/// An empty query matches everything with relevance 1.0.
#[must_use]
pub fn term_overlap_score(query: &str, content: &str) -> f64 {
    let terms: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if terms.is_empty() {
        return 1.0;
    }

    let content = content.to_lowercase();
    let mut hits = 0usize;
    for term in &terms {
        hits += count_occurrences(&content, term);
    }

    #[allow(clippy::cast_precision_loss)]
    let relevance = hits as f64 / terms.len() as f64;
    relevance.min(1.0)
}

/// Count non-overlapping occurrences of `needle` in `haystack`.
fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack.matches(needle).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_query_matches_everything() {
        assert_eq!(term_overlap_score("", "anything at all"), 1.0);
        assert_eq!(term_overlap_score("   ", "anything"), 1.0);
    }

    #[test]
    fn test_no_overlap_scores_zero() {
        assert_eq!(term_overlap_score("quantum physics", "cats are mammals"), 0.0);
    }

    #[test]
    fn test_single_term_match() {
        assert_eq!(term_overlap_score("mammals", "cats are mammals"), 1.0);
    }

    #[test]
    fn test_partial_overlap_is_normalized() {
        // one of two terms hits once: 1 / 2
        assert_eq!(term_overlap_score("cats physics", "cats are mammals"), 0.5);
    }

    #[test]
    fn test_score_is_capped_at_one() {
        let content = "cats cats cats cats";
        assert_eq!(term_overlap_score("cats", content), 1.0);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        assert_eq!(term_overlap_score("MAMMALS", "Cats are mammals"), 1.0);
    }
}
