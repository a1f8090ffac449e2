use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use snafu::prelude::*;

use crate::applicant::{applicant_key, Applicant};
use crate::config::*;

/// The motivation grades of all the reviewers.
///
/// Grades are keyed by (reviewer, applicant): setting a grade overwrites the
/// previous one of the same reviewer and never touches the grades of the
/// others. Skips and the grading history only live for the current session.
#[derive(Debug, Clone, Default)]
pub struct GradeLedger {
    grades: BTreeMap<String, BTreeMap<String, Score>>,
    skipped: BTreeMap<String, BTreeSet<String>>,
    history: BTreeMap<String, Vec<String>>,
}

impl GradeLedger {
    pub fn new() -> GradeLedger {
        GradeLedger::default()
    }

    /// Records a grade read back from the persisted state. It does not count as
    /// grading activity of the current session.
    pub fn load_grade(
        &mut self,
        reviewer: &str,
        applicant: &str,
        score: i64,
    ) -> Result<(), GradingError> {
        let score = Score::try_from(score)?;
        self.grades
            .entry(reviewer.to_string())
            .or_default()
            .insert(applicant_key(applicant), score);
        Ok(())
    }

    /// Sets the grade of a reviewer for an applicant, replacing any previous one.
    /// Returns the replaced grade.
    pub fn set_grade(
        &mut self,
        reviewer: &str,
        applicant: &str,
        score: i64,
    ) -> Result<Option<Score>, GradingError> {
        let score = Score::try_from(score)?;
        let key = applicant_key(applicant);
        debug!("set_grade: {} -> {}: {}", reviewer, key, score);
        let previous = self
            .grades
            .entry(reviewer.to_string())
            .or_default()
            .insert(key.clone(), score);
        let history = self.history.entry(reviewer.to_string()).or_default();
        history.retain(|k| *k != key);
        history.push(key);
        Ok(previous)
    }

    /// Defers an applicant for the rest of the session.
    pub fn skip(&mut self, reviewer: &str, applicant: &str) {
        self.skipped
            .entry(reviewer.to_string())
            .or_default()
            .insert(applicant_key(applicant));
    }

    /// The key of the applicant most recently graded by this reviewer in the session.
    pub fn previous(&self, reviewer: &str) -> Result<&str, GradingError> {
        self.history
            .get(reviewer)
            .and_then(|h| h.last())
            .map(|k| k.as_str())
            .context(NoPreviousSnafu { reviewer })
    }

    /// Forgets the skips and the history, as when the state is loaded again.
    pub fn new_session(&mut self) {
        self.skipped.clear();
        self.history.clear();
    }

    pub fn grade(&self, reviewer: &str, applicant: &str) -> Option<Score> {
        self.grades
            .get(reviewer)
            .and_then(|g| g.get(&applicant_key(applicant)))
            .cloned()
    }

    /// All the grades given to an applicant, by reviewer.
    pub fn grades_for(&self, applicant: &str) -> BTreeMap<&str, Score> {
        let key = applicant_key(applicant);
        self.grades
            .iter()
            .filter_map(|(reviewer, g)| g.get(&key).map(|s| (reviewer.as_str(), *s)))
            .collect()
    }

    /// The reviewers that graded at least once, in alphabetical order.
    pub fn reviewers(&self) -> impl Iterator<Item = &str> {
        self.grades.keys().map(|s| s.as_str())
    }

    /// All the grades of one reviewer, by applicant key.
    pub fn graded_by(&self, reviewer: &str) -> Option<&BTreeMap<String, Score>> {
        self.grades.get(reviewer)
    }

    pub fn is_skipped(&self, reviewer: &str, applicant: &str) -> bool {
        self.skipped
            .get(reviewer)
            .map_or(false, |s| s.contains(&applicant_key(applicant)))
    }

    /// Folds the grades of all the reviewers. None if nobody graded this applicant.
    pub fn aggregate(&self, applicant: &str, aggregation: Aggregation) -> Option<f64> {
        let grades = self.grades_for(applicant);
        if grades.is_empty() {
            return None;
        }
        let total: i64 = grades.values().map(|s| s.value()).sum();
        match aggregation {
            Aggregation::Sum => Some(total as f64),
            Aggregation::Mean => Some(total as f64 / grades.len() as f64),
        }
    }

    /// The applicants of the pool this reviewer still has to grade, in pool order.
    ///
    /// The sequence is lazy and reads the ledger as it is now: building it again
    /// after grading or skipping someone continues where the previous one stopped.
    pub fn ungraded_for<'a, I>(&'a self, reviewer: &'a str, pool: I) -> Ungraded<'a, I::IntoIter>
    where
        I: IntoIterator<Item = &'a Applicant>,
    {
        Ungraded {
            graded: self.grades.get(reviewer),
            skipped: self.skipped.get(reviewer),
            applicants: pool.into_iter(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ungraded<'a, It> {
    graded: Option<&'a BTreeMap<String, Score>>,
    skipped: Option<&'a BTreeSet<String>>,
    applicants: It,
}

impl<'a, It> Iterator for Ungraded<'a, It>
where
    It: Iterator<Item = &'a Applicant>,
{
    type Item = &'a Applicant;

    fn next(&mut self) -> Option<&'a Applicant> {
        let graded = self.graded;
        let skipped = self.skipped;
        self.applicants.find(|a| {
            !graded.map_or(false, |g| g.contains_key(a.key()))
                && !skipped.map_or(false, |s| s.contains(a.key()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;

    fn applicants() -> Vec<Applicant> {
        let mut b = Builder::new();
        for name in ["Ann A", "Bob B", "Cid C"] {
            b.add_applicant_simple(name, &[]).unwrap();
        }
        b.build().unwrap().applicants().to_vec()
    }

    fn names<'a>(it: impl Iterator<Item = &'a Applicant>) -> Vec<&'a str> {
        it.map(|a| a.name.as_str()).collect()
    }

    #[test]
    fn set_grade_overwrites() {
        let mut ledger = GradeLedger::new();
        assert_eq!(ledger.set_grade("r1", "Ann A", 1), Ok(None));
        assert_eq!(ledger.grades_for("ann a").get("r1"), Some(&Score::Positive));
        assert_eq!(ledger.set_grade("r1", "ann a", -1), Ok(Some(Score::Positive)));
        let grades = ledger.grades_for("Ann A");
        assert_eq!(grades.len(), 1);
        assert_eq!(grades.get("r1"), Some(&Score::Negative));
    }

    #[test]
    fn invalid_score_is_rejected() {
        let mut ledger = GradeLedger::new();
        assert_eq!(
            ledger.set_grade("r1", "Ann A", 3),
            Err(GradingError::InvalidScore { score: 3 })
        );
        assert!(ledger.grades_for("Ann A").is_empty());
        assert!(ledger.previous("r1").is_err());
    }

    #[test]
    fn reviewers_do_not_overwrite_each_other() {
        let mut ledger = GradeLedger::new();
        ledger.set_grade("r1", "Ann A", 1).unwrap();
        ledger.set_grade("r2", "Ann A", 0).unwrap();
        let grades = ledger.grades_for("Ann A");
        assert_eq!(grades.get("r1"), Some(&Score::Positive));
        assert_eq!(grades.get("r2"), Some(&Score::Neutral));
        assert_eq!(ledger.reviewers().collect::<Vec<_>>(), vec!["r1", "r2"]);
    }

    #[test]
    fn previous() {
        let mut ledger = GradeLedger::new();
        assert_eq!(
            ledger.previous("r1"),
            Err(GradingError::NoPrevious {
                reviewer: "r1".to_string()
            })
        );
        ledger.set_grade("r1", "Ann A", 1).unwrap();
        ledger.set_grade("r1", "Bob B", 0).unwrap();
        assert_eq!(ledger.previous("r1"), Ok("bob b"));
        // Re-grading moves the applicant back to the top of the history.
        ledger.set_grade("r1", "Ann A", 0).unwrap();
        assert_eq!(ledger.previous("r1"), Ok("ann a"));
        // Loaded grades are not part of the session.
        ledger.load_grade("r2", "Cid C", 1).unwrap();
        assert!(ledger.previous("r2").is_err());
    }

    #[test]
    fn ungraded_skips_graded_and_skipped() {
        let pool = applicants();
        let mut ledger = GradeLedger::new();
        assert_eq!(
            names(ledger.ungraded_for("r1", &pool)),
            vec!["Ann A", "Bob B", "Cid C"]
        );
        ledger.set_grade("r1", "Bob B", 1).unwrap();
        ledger.skip("r1", "Ann A");
        ledger.set_grade("r2", "Cid C", 1).unwrap();
        assert_eq!(names(ledger.ungraded_for("r1", &pool)), vec!["Cid C"]);
        // Idempotent without new grades.
        assert_eq!(names(ledger.ungraded_for("r1", &pool)), vec!["Cid C"]);
        assert_eq!(names(ledger.ungraded_for("r2", &pool)), vec!["Ann A", "Bob B"]);

        // Skips only last for the session.
        ledger.new_session();
        assert_eq!(names(ledger.ungraded_for("r1", &pool)), vec!["Ann A", "Cid C"]);
    }

    #[test]
    fn ungraded_is_restartable() {
        let pool = applicants();
        let ledger = GradeLedger::new();
        let mut it = ledger.ungraded_for("r1", &pool);
        let restarted = it.clone();
        assert_eq!(it.next().map(|a| a.key()), Some("ann a"));
        assert_eq!(names(restarted), vec!["Ann A", "Bob B", "Cid C"]);
    }

    #[test]
    fn aggregate() {
        let mut ledger = GradeLedger::new();
        assert_eq!(ledger.aggregate("Ann A", Aggregation::Mean), None);
        ledger.set_grade("r1", "Ann A", 1).unwrap();
        ledger.set_grade("r2", "Ann A", 0).unwrap();
        ledger.set_grade("r3", "Ann A", 1).unwrap();
        assert_eq!(ledger.aggregate("Ann A", Aggregation::Sum), Some(2.0));
        let mean = ledger.aggregate("Ann A", Aggregation::Mean).unwrap();
        assert!((mean - 2.0 / 3.0).abs() < 1e-12);
    }
}
