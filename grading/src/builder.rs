use std::collections::BTreeMap;

use snafu::prelude::*;

use crate::applicant::{Applicant, Pool, Ratings};
pub use crate::config::*;

/// A builder for a pool of applicants.
///
/// ```
/// pub use grading::builder::Builder;
/// # use grading::GradingError;
///
/// let mut builder = Builder::new();
/// builder.add_applicant_simple("Anna Karenina", &[("programming", "expert"), ("born", "1990")])?;
/// builder.rating("programming", "expert", 1.0)?;
///
/// let pool = builder.build()?;
/// assert_eq!(pool.len(), 1);
///
/// # Ok::<(), GradingError>(())
/// ```
#[derive(Debug, Default)]
pub struct Builder {
    pub(crate) _applicants: Vec<Applicant>,
    pub(crate) _ratings: Ratings,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Adds an applicant. The field values are parsed as numbers when they look
    /// like numbers.
    pub fn add_applicant_simple(
        &mut self,
        name: &str,
        fields: &[(&str, &str)],
    ) -> Result<(), GradingError> {
        let attributes = fields
            .iter()
            .map(|(f, v)| (f.to_string(), AttributeValue::parse(v)))
            .collect();
        self.add_applicant(name, attributes)
    }

    /// Fails if the name is blank.
    pub fn add_applicant(
        &mut self,
        name: &str,
        attributes: BTreeMap<String, AttributeValue>,
    ) -> Result<(), GradingError> {
        ensure!(!name.trim().is_empty(), EmptyNameSnafu);
        self._applicants.push(Applicant::new(name, attributes));
        Ok(())
    }

    pub fn rating(&mut self, field: &str, answer: &str, value: f64) -> Result<(), GradingError> {
        self._ratings.set(field, answer, value)
    }

    /// Fails if two applicants share the same name.
    pub fn build(self) -> Result<Pool, GradingError> {
        Pool::new(self._applicants, self._ratings)
    }
}
