//! Reciprocal Rank Fusion
//!
//! Each list is ranked 1..N by native score; a candidate accumulates
//! `1 / (k + rank)` for every list it appears in.

use std::cmp::Ordering;
use std::collections::HashMap;

use super::result::{FusedResult, RetrievalResult};

/// Default RRF constant
pub const DEFAULT_RRF_K: f64 = 60.0;

/// Fuse ranked lists into one deduplicated list, descending by fused score.
///
/// Ties break on the best raw rank across lists, then on document id.
pub fn reciprocal_rank_fusion(
    lists: &[Vec<RetrievalResult>],
    k: f64,
    top_n: usize,
) -> Vec<FusedResult> {
    let mut fused: Vec<FusedResult> = Vec::new();
    let mut positions: HashMap<(String, String), usize> = HashMap::new();

    for list in lists {
        let mut ranked: Vec<&RetrievalResult> = list.iter().collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut seen_in_list: Vec<usize> = Vec::new();

        for (index, candidate) in ranked.into_iter().enumerate() {
            let rank = index + 1;
            let key = (candidate.document_id.clone(), candidate.chunk_id.clone());

            match positions.get(&key) {
                Some(&position) => {
                    // Only the best rank within one list counts.
                    if seen_in_list.contains(&position) {
                        continue;
                    }
                    let entry = &mut fused[position];
                    entry.fused_score += 1.0 / (k + rank as f64);
                    entry.best_rank = entry.best_rank.min(rank);
                    if !entry.sources.contains(&candidate.source) {
                        entry.sources.push(candidate.source);
                    }
                    seen_in_list.push(position);
                }
                None => {
                    positions.insert(key, fused.len());
                    seen_in_list.push(fused.len());
                    fused.push(FusedResult {
                        result: candidate.clone(),
                        fused_score: 1.0 / (k + rank as f64),
                        sources: vec![candidate.source],
                        best_rank: rank,
                    });
                }
            }
        }
    }

    sort_fused(&mut fused);
    fused.truncate(top_n);
    fused
}

/// Union fused batches (one per sub-question), keeping the highest fused
/// score per identity. The output is re-sorted but not truncated.
pub fn merge_fused(batches: Vec<Vec<FusedResult>>) -> Vec<FusedResult> {
    let mut merged: Vec<FusedResult> = Vec::new();
    let mut positions: HashMap<(String, String), usize> = HashMap::new();

    for candidate in batches.into_iter().flatten() {
        let key = (
            candidate.document_id().to_string(),
            candidate.chunk_id().to_string(),
        );

        match positions.get(&key) {
            Some(&position) => {
                let entry = &mut merged[position];
                for source in &candidate.sources {
                    if !entry.sources.contains(source) {
                        entry.sources.push(*source);
                    }
                }
                entry.best_rank = entry.best_rank.min(candidate.best_rank);
                if candidate.fused_score > entry.fused_score {
                    entry.fused_score = candidate.fused_score;
                    entry.result = candidate.result;
                }
            }
            None => {
                positions.insert(key, merged.len());
                merged.push(candidate);
            }
        }
    }

    sort_fused(&mut merged);
    merged
}

fn sort_fused(results: &mut [FusedResult]) {
    results.sort_by(|a, b| {
        b.fused_score
            .total_cmp(&a.fused_score)
            .then_with(|| a.best_rank.cmp(&b.best_rank))
            .then_with(|| compare_identity(a, b))
    });
}

fn compare_identity(a: &FusedResult, b: &FusedResult) -> Ordering {
    a.document_id()
        .cmp(b.document_id())
        .then_with(|| a.chunk_id().cmp(b.chunk_id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::retrieval::RetrievalSource;
    use std::collections::HashSet;

    fn vector(doc: &str, score: f32) -> RetrievalResult {
        RetrievalResult::new(doc, doc, format!("text of {}", doc), score, RetrievalSource::Vector)
    }

    fn graph(doc: &str, score: f32) -> RetrievalResult {
        RetrievalResult::new(doc, doc, format!("entity {}", doc), score, RetrievalSource::Graph)
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_shared_candidate_sums_both_terms() {
        let vectors = vec![vector("a", 0.9), vector("b", 0.8), vector("c", 0.7)];
        let graphs = vec![graph("x", 1.0), graph("c", 0.5)];

        let fused = reciprocal_rank_fusion(&[vectors, graphs], 60.0, 10);
        let c = fused.iter().find(|r| r.document_id() == "c").unwrap();

        assert!(approx(c.fused_score, 1.0 / 63.0 + 1.0 / 62.0));
        assert_eq!(c.sources, vec![RetrievalSource::Vector, RetrievalSource::Graph]);
    }

    #[test]
    fn test_single_list_candidate_scores_one_term() {
        let vectors = vec![vector("a", 0.9), vector("b", 0.8)];
        let graphs = vec![graph("x", 1.0)];

        let fused = reciprocal_rank_fusion(&[vectors, graphs], 60.0, 10);
        let b = fused.iter().find(|r| r.document_id() == "b").unwrap();

        assert!(approx(b.fused_score, 1.0 / 62.0));
    }

    #[test]
    fn test_ranks_by_native_score_not_input_order() {
        let vectors = vec![vector("low", 0.1), vector("high", 0.9)];

        let fused = reciprocal_rank_fusion(&[vectors], 60.0, 10);

        assert_eq!(fused[0].document_id(), "high");
        assert!(approx(fused[0].fused_score, 1.0 / 61.0));
        assert!(approx(fused[1].fused_score, 1.0 / 62.0));
    }

    #[test]
    fn test_candidate_in_both_lists_ranks_first() {
        let vectors = vec![vector("doc1", 0.9), vector("doc2", 0.7)];
        let graphs = vec![graph("doc2", 1.0)];

        let fused = reciprocal_rank_fusion(&[vectors, graphs], DEFAULT_RRF_K, 10);

        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].document_id(), "doc2");
        assert!(approx(fused[0].fused_score, 1.0 / 62.0 + 1.0 / 61.0));
        assert_eq!(fused[1].document_id(), "doc1");
        assert!(approx(fused[1].fused_score, 1.0 / 61.0));
    }

    #[test]
    fn test_fusing_list_with_itself_doubles_scores() {
        let list = vec![vector("a", 0.9), vector("b", 0.5), vector("c", 0.7)];

        let single = reciprocal_rank_fusion(&[list.clone()], 60.0, 10);
        let doubled = reciprocal_rank_fusion(&[list.clone(), list], 60.0, 10);

        let single_order: Vec<&str> = single.iter().map(|r| r.document_id()).collect();
        let doubled_order: Vec<&str> = doubled.iter().map(|r| r.document_id()).collect();
        assert_eq!(single_order, doubled_order);

        for (s, d) in single.iter().zip(&doubled) {
            assert!(approx(d.fused_score, 2.0 * s.fused_score));
        }
    }

    #[test]
    fn test_no_duplicate_identities() {
        let vectors = vec![
            vector("a", 0.9),
            vector("a", 0.8),
            vector("b", 0.7),
            vector("c", 0.6),
        ];
        let graphs = vec![graph("b", 1.0), graph("a", 0.9), graph("d", 0.8)];

        let fused = reciprocal_rank_fusion(&[vectors, graphs], 60.0, 10);
        let identities: HashSet<(&str, &str)> = fused.iter().map(|r| r.identity()).collect();

        assert_eq!(identities.len(), fused.len());
        let a = fused.iter().find(|r| r.document_id() == "a").unwrap();
        assert!(approx(a.fused_score, 1.0 / 61.0 + 1.0 / 62.0));
    }

    #[test]
    fn test_ties_break_on_best_rank_then_document_id() {
        // Both appear once at rank 1 in different lists
        let vectors = vec![vector("zeta", 0.9)];
        let graphs = vec![graph("alpha", 1.0)];

        let fused = reciprocal_rank_fusion(&[vectors, graphs], 60.0, 10);

        assert_eq!(fused[0].document_id(), "alpha");
        assert_eq!(fused[1].document_id(), "zeta");
    }

    #[test]
    fn test_empty_inputs_yield_empty_output() {
        assert!(reciprocal_rank_fusion(&[], 60.0, 10).is_empty());
        assert!(reciprocal_rank_fusion(&[vec![], vec![]], 60.0, 10).is_empty());
    }

    #[test]
    fn test_truncates_to_top_n() {
        let vectors: Vec<_> = (0..20)
            .map(|i| vector(&format!("doc{:02}", i), 1.0 - i as f32 / 100.0))
            .collect();

        let fused = reciprocal_rank_fusion(&[vectors], 60.0, 5);

        assert_eq!(fused.len(), 5);
        assert_eq!(fused[0].document_id(), "doc00");
        assert_eq!(fused[4].document_id(), "doc04");
    }

    #[test]
    fn test_merge_keeps_max_score_per_identity() {
        let first = reciprocal_rank_fusion(&[vec![vector("a", 0.9), vector("b", 0.8)]], 60.0, 10);
        let second = reciprocal_rank_fusion(
            &[vec![vector("b", 0.9)], vec![graph("b", 1.0), graph("c", 0.5)]],
            60.0,
            10,
        );

        let merged = merge_fused(vec![first, second]);
        let identities: HashSet<(&str, &str)> = merged.iter().map(|r| r.identity()).collect();

        assert_eq!(merged.len(), 3);
        assert_eq!(identities.len(), 3);
        assert_eq!(merged[0].document_id(), "b");
        assert!(approx(merged[0].fused_score, 2.0 / 61.0));
        assert!(merged[0].found_in(RetrievalSource::Graph));
    }
}
