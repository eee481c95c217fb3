use docsearch_core::types::FusedResult;

/// Highest score first; equal scores keep their current relative order.
pub fn sort_by_score(results: &mut [FusedResult]) {
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
}

pub fn rank(mut results: Vec<FusedResult>, max: usize) -> Vec<FusedResult> {
    sort_by_score(&mut results);
    results.truncate(max);
    results
}
