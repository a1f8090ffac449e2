use std::collections::BTreeMap;

use crate::applicant::Pool;
use crate::config::*;
use crate::ledger::GradeLedger;

pub const NOT_AVAILABLE: &str = "NOT AVAILABLE";

/// How far one reviewer got through the pool.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ReviewerStats {
    pub reviewer: String,
    pub negative: usize,
    pub neutral: usize,
    pub positive: usize,
    pub todo: usize,
}

/// Statistics for all the reviewers of the ledger, plus `extra` reviewers that
/// may not have graded anybody yet.
pub fn grading_stats(ledger: &GradeLedger, pool: &Pool, extra: &[&str]) -> Vec<ReviewerStats> {
    let mut reviewers: Vec<&str> = ledger.reviewers().collect();
    for r in extra {
        if !reviewers.contains(r) {
            reviewers.push(*r);
        }
    }
    reviewers.sort_unstable();
    reviewers
        .into_iter()
        .map(|reviewer| {
            let mut stats = ReviewerStats {
                reviewer: reviewer.to_string(),
                negative: 0,
                neutral: 0,
                positive: 0,
                todo: 0,
            };
            for a in pool.iter() {
                match ledger.grade(reviewer, a.key()) {
                    Some(Score::Negative) => stats.negative += 1,
                    Some(Score::Neutral) => stats.neutral += 1,
                    Some(Score::Positive) => stats.positive += 1,
                    None => stats.todo += 1,
                }
            }
            stats
        })
        .collect()
}

/// Counts the resolved values of one field over the pool.
pub fn value_histogram(pool: &Pool, field: &str) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for a in pool.iter() {
        let value = match pool.resolve(a).get(field) {
            Some(v) if !v.is_empty() => v.to_string(),
            _ => NOT_AVAILABLE.to_string(),
        };
        *counts.entry(value).or_insert(0) += 1;
    }
    counts
}
