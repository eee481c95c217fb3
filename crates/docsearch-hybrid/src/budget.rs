//! Threshold plus cumulative-budget cutoff for self-scored candidates.
//!
//! Candidates below `min_score` are dropped, the rest are stably sorted by
//! score (highest first) and admitted while the running total stays within
//! `budget`. The walk stops at the first candidate that would overflow; the
//! first survivor is always admitted.

use docsearch_core::config::SearchSettings;
use docsearch_core::types::{Candidate, FusedResult};
use docsearch_provider::ModelPassage;

pub trait Scored {
    fn score(&self) -> f32;
}

impl Scored for Candidate {
    fn score(&self) -> f32 {
        self.raw_score
    }
}

impl Scored for FusedResult {
    fn score(&self) -> f32 {
        self.score
    }
}

impl Scored for ModelPassage {
    fn score(&self) -> f32 {
        self.score
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetFilter {
    pub min_score: f32,
    pub budget: f32,
}

impl BudgetFilter {
    pub fn new(min_score: f32, budget: f32) -> Self {
        Self { min_score, budget }
    }

    pub fn apply<T: Scored>(&self, items: Vec<T>) -> Vec<T> {
        // NaN never passes the threshold.
        let mut survivors: Vec<T> = items.into_iter().filter(|c| c.score() >= self.min_score).collect();
        survivors.sort_by(|a, b| b.score().total_cmp(&a.score()));

        let mut kept = Vec::with_capacity(survivors.len());
        let mut running = 0.0f32;
        for item in survivors {
            let score = item.score();
            if !kept.is_empty() && running + score > self.budget {
                break;
            }
            running += score;
            kept.push(item);
        }
        kept
    }
}

impl From<&SearchSettings> for BudgetFilter {
    fn from(s: &SearchSettings) -> Self {
        Self::new(s.min_score, s.budget)
    }
}
