//! Weighted score fusion across retrieval methods.
//!
//! Each method contributes `weight * raw_score` for every chunk it returned.
//! Contributions for the same chunk are summed. A method is tagged in
//! `found_by` only when its contribution is positive. Output keeps first-seen order (lists are walked in the order
//! given), leaving the final ordering to [`crate::ranking`].

use std::collections::{BTreeSet, HashMap};

use tracing::warn;

use docsearch_core::types::{Chunk, FusedResult, Method, SearchHit};

/// One method's ranked hits and the weight applied to their raw scores.
#[derive(Debug, Clone, Copy)]
pub struct RankedList<'a> {
    pub method: Method,
    pub weight: f32,
    pub hits: &'a [SearchHit],
}

impl<'a> RankedList<'a> {
    pub fn new(method: Method, weight: f32, hits: &'a [SearchHit]) -> Self {
        Self { method, weight, hits }
    }
}

/// `(semantic, keyword)` weights for a mixing constant `alpha`.
pub fn hybrid_weights(alpha: f32) -> (f32, f32) {
    (alpha, 1.0 - alpha)
}

pub fn fuse(chunks: &[Chunk], lists: &[RankedList<'_>]) -> Vec<FusedResult> {
    let mut fused: Vec<FusedResult> = Vec::new();
    let mut slot_of: HashMap<usize, usize> = HashMap::new();

    for list in lists {
        for hit in list.hits {
            let Some(chunk) = chunks.get(hit.index) else {
                warn!("Dropping {} hit for missing chunk {}", list.method.as_str(), hit.index);
                continue;
            };
            let contribution = list.weight * hit.score;
            let slot = *slot_of.entry(hit.index).or_insert_with(|| {
                fused.push(FusedResult {
                    text: chunk.text.clone(),
                    metadata: chunk.metadata.clone(),
                    score: 0.0,
                    found_by: BTreeSet::new(),
                });
                fused.len() - 1
            });
            let entry = &mut fused[slot];
            entry.score += contribution;
            if contribution > 0.0 {
                entry.found_by.insert(list.method);
            }
        }
    }
    fused
}

/// Fuse a semantic and a keyword list with mixing constant `alpha`.
pub fn fuse_hybrid(chunks: &[Chunk], alpha: f32, semantic: &[SearchHit], keyword: &[SearchHit]) -> Vec<FusedResult> {
    let (ws, wk) = hybrid_weights(alpha);
    fuse(chunks, &[RankedList::new(Method::Semantic, ws, semantic), RankedList::new(Method::Keyword, wk, keyword)])
}
