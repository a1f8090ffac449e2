use std::collections::BTreeMap;

use log::debug;

use crate::applicant::Applicant;
use crate::config::*;
use crate::ledger::GradeLedger;

/// Finds the applicants on which reviewers do not agree.
///
/// Two grades disagree when both exist and they are at least `min_gap` apart.
/// With the default gap of 1, any difference counts.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct DisagreementResolver {
    min_gap: i64,
}

impl Default for DisagreementResolver {
    fn default() -> DisagreementResolver {
        DisagreementResolver { min_gap: 1 }
    }
}

impl DisagreementResolver {
    pub fn new(min_gap: i64) -> DisagreementResolver {
        DisagreementResolver {
            min_gap: min_gap.max(1),
        }
    }

    pub fn min_gap(&self) -> i64 {
        self.min_gap
    }

    fn differ(&self, a: Score, b: Score) -> bool {
        (a.value() - b.value()).abs() >= self.min_gap
    }

    /// Decides on the grades of a single applicant.
    ///
    /// - both reviewers: their two grades disagree
    /// - one reviewer: some other reviewer disagrees with them
    /// - none: some pair of reviewers disagrees
    pub fn is_disagreement(
        &self,
        grades: &BTreeMap<&str, Score>,
        reviewer_a: Option<&str>,
        reviewer_b: Option<&str>,
    ) -> bool {
        match (reviewer_a, reviewer_b) {
            (Some(a), Some(b)) if a == b => false,
            (Some(a), Some(b)) => match (grades.get(a), grades.get(b)) {
                (Some(ga), Some(gb)) => self.differ(*ga, *gb),
                _ => false,
            },
            (Some(r), None) | (None, Some(r)) => match grades.get(r) {
                Some(gr) => grades
                    .iter()
                    .any(|(other, g)| *other != r && self.differ(*gr, *g)),
                None => false,
            },
            (None, None) => {
                let lo = grades.values().min();
                let hi = grades.values().max();
                match (lo, hi) {
                    (Some(lo), Some(hi)) => self.differ(*lo, *hi),
                    _ => false,
                }
            }
        }
    }

    /// The applicants of the pool in disagreement, in pool order.
    pub fn disagreements<'a, I>(
        &self,
        ledger: &GradeLedger,
        pool: I,
        reviewer_a: Option<&str>,
        reviewer_b: Option<&str>,
    ) -> Vec<&'a Applicant>
    where
        I: IntoIterator<Item = &'a Applicant>,
    {
        let res: Vec<&'a Applicant> = pool
            .into_iter()
            .filter(|a| {
                self.is_disagreement(&ledger.grades_for(a.key()), reviewer_a, reviewer_b)
            })
            .collect();
        debug!(
            "disagreements: {:?} vs {:?} (gap {}): {} applicants",
            reviewer_a,
            reviewer_b,
            self.min_gap,
            res.len()
        );
        res
    }
}
