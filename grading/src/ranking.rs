use std::cmp::Ordering;
use std::collections::BTreeSet;

use log::{debug, info, warn};

use crate::applicant::{Applicant, Pool};
use crate::config::*;
use crate::formula::Formula;
use crate::ledger::GradeLedger;

/// One line of a ranking.
#[derive(PartialEq, Debug, Clone)]
pub struct RankedApplicant<'a> {
    pub applicant: &'a Applicant,
    /// Dense position, starting at 1. Equal totals in the same category share it.
    pub position: usize,
    pub total_score: f64,
    /// The formula score without the motivation terms.
    pub base_score: f64,
    /// The part of the formula score coming from the motivation terms.
    pub motivation_component: f64,
    /// The aggregated grade, if anybody graded this applicant.
    pub motivation: Option<f64>,
    pub label_bonus: f64,
    pub highlander: bool,
    pub labels: BTreeSet<String>,
    pub warnings: Vec<EvaluationWarning>,
}

// Scores are rounded so that numerical noise does not reorder applicants:
// 1.26 and 1.2600000000002 are the same score.
fn round_score(x: f64) -> f64 {
    (x * 1e5).round() / 1e5
}

/// Highlanders first, then by decreasing total.
fn compare(a: &RankedApplicant, b: &RankedApplicant) -> Ordering {
    b.highlander
        .cmp(&a.highlander)
        .then_with(|| b.total_score.total_cmp(&a.total_score))
}

/// Ranks applicants by the formula and the grades of the ledger.
///
/// Arguments:
/// * `applicants` the applicants to rank, in their reference order. Applicants
/// with equal totals keep this order.
/// * `pool` provides the overrides, labels and ratings of the applicants
pub fn rank<'a, I>(
    applicants: I,
    pool: &'a Pool,
    formula: &Formula,
    ledger: &GradeLedger,
    options: &RankingOptions,
) -> Vec<RankedApplicant<'a>>
where
    I: IntoIterator<Item = &'a Applicant>,
{
    info!("Ranking with formula {} ({:?})", formula, options.aggregation);
    let mut ranked: Vec<RankedApplicant<'a>> = applicants
        .into_iter()
        .map(|a| {
            let motivation = ledger.aggregate(a.key(), options.aggregation);
            let eval = formula.evaluate(&pool.resolve(a).with_motivation(motivation));
            for w in eval.warnings.iter() {
                warn!("{}", w);
            }
            let motivation_component = eval.contribution_of(MOTIVATION);
            let labels = pool.labels(a);
            let label_bonus: f64 = if options.use_labels {
                labels
                    .iter()
                    .filter_map(|l| options.label_bonuses.get(l))
                    .sum()
            } else {
                0.0
            };
            RankedApplicant {
                applicant: a,
                position: 0,
                total_score: round_score(eval.score + label_bonus),
                base_score: eval.score - motivation_component,
                motivation_component,
                motivation,
                label_bonus,
                highlander: labels.contains(&options.highlander_label),
                labels,
                warnings: eval.warnings,
            }
        })
        .collect();

    // sort_by is stable: ties keep the input order.
    ranked.sort_by(compare);

    let mut position = 0;
    let mut previous: Option<(bool, f64)> = None;
    for r in ranked.iter_mut() {
        if previous != Some((r.highlander, r.total_score)) {
            position += 1;
        }
        previous = Some((r.highlander, r.total_score));
        r.position = position;
    }
    debug!("rank: {} applicants ranked", ranked.len());
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use proptest::prelude::*;

    fn names(r: &[RankedApplicant]) -> Vec<String> {
        r.iter().map(|r| r.applicant.name.clone()).collect()
    }

    fn abc() -> Pool {
        let mut b = Builder::new();
        b.add_applicant_simple("A", &[("programming", "0.8")]).unwrap();
        b.add_applicant_simple("B", &[("programming", "0.5")]).unwrap();
        b.add_applicant_simple("C", &[("programming", "0.2")]).unwrap();
        let mut pool = b.build().unwrap();
        pool.add_label("C", DEFAULT_HIGHLANDER_LABEL).unwrap();
        pool
    }

    #[test]
    fn highlander_first_then_score() {
        let _ = env_logger::builder().is_test(true).try_init();
        let pool = abc();
        let formula = Formula::parse("programming*1.0", &pool.schema()).unwrap();
        let ledger = GradeLedger::new();
        let r = rank(pool.iter(), &pool, &formula, &ledger, &RankingOptions::default());
        assert_eq!(names(&r), vec!["C", "A", "B"]);
        assert!(r.iter().all(|x| x.motivation_component == 0.0 && x.motivation.is_none()));
        assert_eq!(r[1].total_score, 0.8);
        assert_eq!(r.iter().map(|x| x.position).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn motivation_mean_enters_through_the_formula() {
        let pool = abc();
        let formula = Formula::parse("programming + motivation*0.5", &pool.schema()).unwrap();
        let mut ledger = GradeLedger::new();
        ledger.set_grade("r1", "B", 1).unwrap();
        ledger.set_grade("r2", "B", 1).unwrap();
        ledger.set_grade("r1", "A", -1).unwrap();
        ledger.set_grade("r2", "A", 0).unwrap();
        let r = rank(pool.iter(), &pool, &formula, &ledger, &RankingOptions::default());
        assert_eq!(names(&r), vec!["C", "B", "A"]);
        let b = &r[1];
        assert_eq!(b.motivation, Some(1.0));
        assert_eq!(b.motivation_component, 0.5);
        assert_eq!(b.base_score, 0.5);
        assert_eq!(b.total_score, 1.0);
        let a = &r[2];
        assert_eq!(a.motivation, Some(-0.5));
        assert_eq!(a.total_score, 0.55);

        let sum = RankingOptions {
            aggregation: Aggregation::Sum,
            ..RankingOptions::default()
        };
        let r = rank(pool.iter(), &pool, &formula, &ledger, &sum);
        assert_eq!(r[1].motivation, Some(2.0));
        assert_eq!(r[1].total_score, 1.5);
    }

    #[test]
    fn ties_keep_input_order() {
        let mut b = Builder::new();
        for name in ["P", "Q", "R", "S"] {
            b.add_applicant_simple(name, &[("x", "1")]).unwrap();
        }
        let pool = b.build().unwrap();
        let formula = Formula::parse("x*0.1 + x*0.2", &pool.schema()).unwrap();
        let r = rank(
            pool.iter(),
            &pool,
            &formula,
            &GradeLedger::new(),
            &RankingOptions::default(),
        );
        assert_eq!(names(&r), vec!["P", "Q", "R", "S"]);
        assert!(r.iter().all(|x| x.position == 1));
    }

    #[test]
    fn label_bonuses() {
        let mut pool = abc();
        pool.add_label("B", "CONFIRMED").unwrap();
        pool.add_label("A", "DECLINED").unwrap();
        let formula = Formula::parse("programming", &pool.schema()).unwrap();
        let mut options = RankingOptions::default();
        options.label_bonuses.insert("CONFIRMED".to_string(), 2000.0);
        options.label_bonuses.insert("DECLINED".to_string(), -650.0);
        let ledger = GradeLedger::new();

        let r = rank(pool.iter(), &pool, &formula, &ledger, &options);
        assert_eq!(names(&r), vec!["C", "B", "A"]);
        assert_eq!(r[1].label_bonus, 2000.0);
        assert_eq!(r[2].total_score, -649.2);

        options.use_labels = false;
        let r = rank(pool.iter(), &pool, &formula, &ledger, &options);
        assert_eq!(names(&r), vec!["C", "A", "B"]);
    }

    #[test]
    fn overrides_are_used() {
        let mut pool = abc();
        pool.set_override("B", "programming", AttributeValue::Number(0.9))
            .unwrap();
        let formula = Formula::parse("programming", &pool.schema()).unwrap();
        let r = rank(
            pool.iter(),
            &pool,
            &formula,
            &GradeLedger::new(),
            &RankingOptions::default(),
        );
        assert_eq!(names(&r), vec!["C", "B", "A"]);
    }

    proptest! {
        #[test]
        fn ranking_invariants(
            people in proptest::collection::vec((0u8..5, any::<bool>()), 1..30),
            grades in proptest::collection::vec((0usize..30, -1i64..=1), 0..30),
        ) {
            let mut b = Builder::new();
            for (idx, (x, _)) in people.iter().enumerate() {
                b.add_applicant_simple(&format!("P{}", idx), &[("x", &x.to_string())]).unwrap();
            }
            let mut pool = b.build().unwrap();
            for (idx, (_, h)) in people.iter().enumerate() {
                if *h {
                    pool.add_label(&format!("P{}", idx), DEFAULT_HIGHLANDER_LABEL).unwrap();
                }
            }
            let mut ledger = GradeLedger::new();
            for (idx, s) in grades {
                ledger.set_grade("r", &format!("P{}", idx % people.len()), s).unwrap();
            }
            let formula = Formula::parse("x + motivation", &pool.schema()).unwrap();
            let options = RankingOptions::default();
            let r1 = rank(pool.iter(), &pool, &formula, &ledger, &options);
            let r2 = rank(pool.iter(), &pool, &formula, &ledger, &options);
            prop_assert_eq!(&r1, &r2);
            prop_assert_eq!(r1.len(), people.len());

            // Import index of each applicant, to check the tie order.
            let index = |r: &RankedApplicant| -> usize {
                r.applicant.name[1..].parse().unwrap()
            };
            for w in r1.windows(2) {
                // Highlanders before everyone else.
                prop_assert!(w[0].highlander || !w[1].highlander);
                if w[0].highlander == w[1].highlander {
                    prop_assert!(w[0].total_score >= w[1].total_score);
                    if w[0].total_score == w[1].total_score {
                        prop_assert!(index(&w[0]) < index(&w[1]));
                    }
                }
            }
        }
    }
}
