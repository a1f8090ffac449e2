// ********* Input data structures ***********

use std::collections::BTreeMap;
use std::fmt::Display;

use snafu::prelude::*;

/// The name of the pseudo-attribute that carries the aggregated motivation grade
/// of an applicant. It shadows any raw attribute with the same name.
pub const MOTIVATION: &str = "motivation";

/// The name of the attribute derived from the declared previous applications:
/// a count, or 0 and 1 for a no/yes answer. Present for every applicant.
pub const APPLIED: &str = "applied";

/// The label that places an applicant above everyone else in a ranking.
pub const DEFAULT_HIGHLANDER_LABEL: &str = "HIGHLANDER";

/// A motivation grade given by one reviewer to one applicant.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum Score {
    Negative,
    Neutral,
    Positive,
}

impl Score {
    /// All the valid grades, in increasing order.
    pub const RANGE: [Score; 3] = [Score::Negative, Score::Neutral, Score::Positive];

    pub fn value(self) -> i64 {
        match self {
            Score::Negative => -1,
            Score::Neutral => 0,
            Score::Positive => 1,
        }
    }
}

impl TryFrom<i64> for Score {
    type Error = GradingError;

    fn try_from(score: i64) -> Result<Score, GradingError> {
        match score {
            -1 => Ok(Score::Negative),
            0 => Ok(Score::Neutral),
            1 => Ok(Score::Positive),
            _ => InvalidScoreSnafu { score }.fail(),
        }
    }
}

impl Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// A value of an applicant attribute, as imported or as overridden by a reviewer.
#[derive(PartialEq, Debug, Clone)]
pub enum AttributeValue {
    Number(f64),
    Flag(bool),
    Text(String),
}

impl AttributeValue {
    /// Reads a raw cell. Anything that looks like a finite number becomes a number,
    /// the rest is kept as (trimmed) text.
    pub fn parse(raw: &str) -> AttributeValue {
        let s = raw.trim();
        match s.parse::<f64>() {
            Ok(x) if x.is_finite() => AttributeValue::Number(x),
            _ => AttributeValue::Text(s.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, AttributeValue::Text(s) if s.is_empty())
    }
}

impl Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::Number(x) => write!(f, "{}", x),
            AttributeValue::Flag(b) => write!(f, "{}", b),
            AttributeValue::Text(s) => write!(f, "{}", s),
        }
    }
}

// ******** Output data structures *********

/// A non-fatal problem found while evaluating a formula for one applicant.
/// The offending term contributes 0 to the score.
#[derive(PartialEq, Debug, Clone)]
pub enum EvaluationWarning {
    MissingAttribute {
        applicant: String,
        attribute: String,
    },
    NonNumeric {
        applicant: String,
        attribute: String,
        value: String,
    },
    MissingRating {
        applicant: String,
        attribute: String,
        key: String,
    },
}

impl Display for EvaluationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvaluationWarning::MissingAttribute {
                applicant,
                attribute,
            } => write!(f, "{}: missing value for {}", applicant, attribute),
            EvaluationWarning::NonNumeric {
                applicant,
                attribute,
                value,
            } => write!(f, "{}: {} = {:?} is not a number", applicant, attribute, value),
            EvaluationWarning::MissingRating {
                applicant,
                attribute,
                key,
            } => write!(f, "{}: {} not rated for {:?}", applicant, attribute, key),
        }
    }
}

/// Errors raised by the grading operations. None of them is fatal to a session.
#[derive(Debug, Snafu, PartialEq, Eq, Clone)]
#[snafu(visibility(pub(crate)))]
pub enum GradingError {
    #[snafu(display("invalid score {score}: expected one of -1, 0, 1"))]
    InvalidScore { score: i64 },

    #[snafu(display("nothing graded yet by {reviewer} in this session"))]
    NoPrevious { reviewer: String },

    #[snafu(display("no applicant named {name:?}"))]
    UnknownApplicant { name: String },

    #[snafu(display("applicant {applicant:?} has no field {field:?}"))]
    UnknownField { applicant: String, field: String },

    #[snafu(display("applicant {name:?} appears more than once"))]
    DuplicateApplicant { name: String },

    #[snafu(display("an applicant needs a name"))]
    EmptyName,

    #[snafu(display("empty label for {applicant:?}"))]
    EmptyLabel { applicant: String },

    #[snafu(display("rating {value} of {answer:?} for {field} is not a finite number"))]
    InvalidRating {
        field: String,
        answer: String,
        value: String,
    },
}

/// Errors raised when a formula is rejected. The previous formula stays in place.
#[derive(Debug, Snafu, PartialEq, Eq, Clone)]
#[snafu(visibility(pub(crate)))]
pub enum FormulaError {
    #[snafu(display("the formula is empty"))]
    EmptyFormula,

    #[snafu(display("cannot parse term {term:?}: {reason}"))]
    ParseError { term: String, reason: String },

    #[snafu(display("unknown attribute {attribute:?}"))]
    UnknownAttribute { attribute: String },
}

// ********* Configuration **********

/// How the grades of several reviewers are folded into a single number.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Aggregation {
    Mean,
    Sum,
}

#[derive(PartialEq, Debug, Clone)]
pub struct RankingOptions {
    pub aggregation: Aggregation,
    /// Applicants with this label are sorted before everyone else.
    pub highlander_label: String,
    /// Fixed bonuses (or penalties) added to the total for each label an applicant carries.
    pub label_bonuses: BTreeMap<String, f64>,
    pub use_labels: bool,
}

impl Default for RankingOptions {
    fn default() -> RankingOptions {
        RankingOptions {
            aggregation: Aggregation::Mean,
            highlander_label: DEFAULT_HIGHLANDER_LABEL.to_string(),
            label_bonuses: BTreeMap::new(),
            use_labels: true,
        }
    }
}
