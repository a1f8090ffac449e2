//! The applicant pool: raw attributes as imported, reviewer overrides that
//! shadow them, labels, and the rating tables that turn categorical answers
//! into numbers.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::debug;
use snafu::prelude::*;

use crate::config::*;

/// The stable key of an applicant: the full name, lowercased, with the
/// whitespace collapsed. Grades, labels and overrides are stored under it.
pub fn applicant_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
        .to_lowercase()
}

#[derive(PartialEq, Debug, Clone)]
pub struct Applicant {
    pub name: String,
    key: String,
    attributes: BTreeMap<String, AttributeValue>,
}

impl Applicant {
    pub fn new(name: &str, attributes: BTreeMap<String, AttributeValue>) -> Applicant {
        let name = name.split_whitespace().collect::<Vec<&str>>().join(" ");
        Applicant {
            key: applicant_key(&name),
            name,
            attributes,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The value as submitted, ignoring overrides.
    pub fn raw(&self, field: &str) -> Option<&AttributeValue> {
        self.attributes.get(field)
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }
}

/// Why an attribute value could not be turned into a number.
#[derive(PartialEq, Debug, Clone)]
pub enum Uncoercible {
    NonNumeric(String),
    MissingRating(String),
}

/// Normalizes a categorical answer before looking up its rating.
///
/// Explanations in parentheses or after a slash or a comma are ignored, so that
/// `"Competent/Proficient"` and `"competent"` share one rating.
pub fn rating_key(raw: &str) -> String {
    let s = raw.trim();
    if s.is_empty() {
        return "(none)".to_string();
    }
    let s = s.split('(').next().unwrap_or("");
    let s = s.split('/').next().unwrap_or("").trim();
    let s = s.split(',').next().unwrap_or("").trim();
    s.to_lowercase()
}

/// Per-field tables mapping categorical answers to numbers.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Ratings {
    tables: BTreeMap<String, BTreeMap<String, f64>>,
}

impl Ratings {
    /// Rates one answer. Ratings must be finite numbers.
    pub fn set(&mut self, field: &str, answer: &str, value: f64) -> Result<(), GradingError> {
        ensure!(
            value.is_finite(),
            InvalidRatingSnafu {
                field,
                answer,
                value: value.to_string()
            }
        );
        self.tables
            .entry(field.to_string())
            .or_default()
            .insert(rating_key(answer), value);
        Ok(())
    }

    pub fn table(&self, field: &str) -> Option<&BTreeMap<String, f64>> {
        self.tables.get(field)
    }

    pub fn tables(&self) -> &BTreeMap<String, BTreeMap<String, f64>> {
        &self.tables
    }

    pub fn coerce(&self, field: &str, value: &AttributeValue) -> Result<f64, Uncoercible> {
        match value {
            AttributeValue::Number(x) => Ok(*x),
            AttributeValue::Flag(b) => Ok(if *b { 1.0 } else { 0.0 }),
            AttributeValue::Text(s) => {
                if let Some(table) = self.tables.get(field) {
                    let key = rating_key(s);
                    table
                        .get(&key)
                        .cloned()
                        .ok_or(Uncoercible::MissingRating(key))
                } else {
                    match s.trim().parse::<f64>() {
                        Ok(x) if x.is_finite() => Ok(x),
                        _ => Err(Uncoercible::NonNumeric(s.clone())),
                    }
                }
            }
        }
    }
}

/// The number of previous applications from the declared answer.
///
/// Numbers are counts. Text is a yes/no answer: anything but an empty answer
/// or one starting with `n` counts as one. Without an answer, 0.
pub fn previous_applications(value: Option<&AttributeValue>) -> f64 {
    match value {
        None => 0.0,
        Some(AttributeValue::Number(x)) => x.max(0.0),
        Some(AttributeValue::Flag(b)) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Some(AttributeValue::Text(s)) => match s.trim().chars().next() {
            None | Some('n') | Some('N') => 0.0,
            Some(_) => 1.0,
        },
    }
}

/// The values an attribute can take, as far as the score is concerned.
#[derive(PartialEq, Debug, Clone)]
pub enum Domain {
    Numeric { min: f64, max: f64 },
    Rated(Vec<f64>),
    /// Never numeric: contributes nothing.
    Text,
    Motivation,
}

impl Domain {
    /// The smallest and the largest numeric value of the domain.
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            Domain::Numeric { min, max } => (*min, *max),
            Domain::Rated(values) if !values.is_empty() => {
                let lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
                let hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                (lo, hi)
            }
            Domain::Rated(_) | Domain::Text => (0.0, 0.0),
            Domain::Motivation => (-1.0, 1.0),
        }
    }
}

/// All the attribute names a formula may refer to, with their domains.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Schema {
    attributes: BTreeMap<String, Domain>,
}

impl Schema {
    pub fn new(attributes: BTreeMap<String, Domain>) -> Schema {
        let mut attributes = attributes;
        attributes.insert(MOTIVATION.to_string(), Domain::Motivation);
        Schema { attributes }
    }

    pub fn contains(&self, attribute: &str) -> bool {
        self.attributes.contains_key(attribute)
    }

    pub fn domain(&self, attribute: &str) -> Option<&Domain> {
        self.attributes.get(attribute)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(|s| s.as_str())
    }
}

/// The attributes of one applicant as every computation sees them: overrides
/// first, then the raw values. The motivation pseudo-attribute is attached by
/// the caller; `applied` is derived from the declared answer.
#[derive(Debug, Clone)]
pub struct ResolvedAttributes<'a> {
    pub applicant: &'a Applicant,
    overrides: Option<&'a BTreeMap<String, AttributeValue>>,
    ratings: &'a Ratings,
    motivation: Option<f64>,
}

impl<'a> ResolvedAttributes<'a> {
    pub fn with_motivation(self, motivation: Option<f64>) -> ResolvedAttributes<'a> {
        ResolvedAttributes { motivation, ..self }
    }

    pub fn motivation(&self) -> Option<f64> {
        self.motivation
    }

    pub fn get(&self, field: &str) -> Option<&'a AttributeValue> {
        self.overrides
            .and_then(|o| o.get(field))
            .or_else(|| self.applicant.raw(field))
    }

    pub fn is_overridden(&self, field: &str) -> bool {
        self.overrides.map_or(false, |o| o.contains_key(field))
    }

    /// All the fields, in alphabetical order, with overrides applied.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a AttributeValue)> + '_ {
        self.applicant
            .attributes()
            .keys()
            .filter_map(move |k| self.get(k).map(|v| (k.as_str(), v)))
    }

    pub fn numeric(&self, field: &str) -> Option<Result<f64, Uncoercible>> {
        if field == APPLIED {
            return Some(Ok(previous_applications(self.get(field))));
        }
        self.get(field).map(|v| self.ratings.coerce(field, v))
    }
}

/// Selects applicants by labels: all the accepted labels must be present and
/// none of the denied ones.
///
/// The textual form is `A B - C D`: labeled A and B, but neither C nor D.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct LabelFilter {
    pub accept: BTreeSet<String>,
    pub deny: BTreeSet<String>,
}

impl LabelFilter {
    pub fn parse(words: &[String]) -> LabelFilter {
        let mut it = words.iter();
        let accept = it
            .by_ref()
            .take_while(|w| w.as_str() != "-")
            .cloned()
            .collect();
        let deny = it.cloned().collect();
        LabelFilter { accept, deny }
    }

    pub fn matches(&self, labels: &BTreeSet<String>) -> bool {
        self.accept.is_subset(labels) && self.deny.is_disjoint(labels)
    }
}

/// The applicants of one edition, in import order, with the reviewer state that
/// is attached to them.
#[derive(Debug, Clone, Default)]
pub struct Pool {
    applicants: Vec<Applicant>,
    index: HashMap<String, usize>,
    overrides: BTreeMap<String, BTreeMap<String, AttributeValue>>,
    labels: BTreeMap<String, BTreeSet<String>>,
    ratings: Ratings,
}

impl Pool {
    pub fn new(applicants: Vec<Applicant>, ratings: Ratings) -> Result<Pool, GradingError> {
        let mut index: HashMap<String, usize> = HashMap::new();
        for (idx, a) in applicants.iter().enumerate() {
            ensure!(
                index.insert(a.key().to_string(), idx).is_none(),
                DuplicateApplicantSnafu {
                    name: a.name.clone()
                }
            );
        }
        debug!("Pool::new: {} applicants", applicants.len());
        Ok(Pool {
            applicants,
            index,
            overrides: BTreeMap::new(),
            labels: BTreeMap::new(),
            ratings,
        })
    }

    pub fn len(&self) -> usize {
        self.applicants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applicants.is_empty()
    }

    pub fn applicants(&self) -> &[Applicant] {
        &self.applicants
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Applicant> {
        self.applicants.iter()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&applicant_key(name))
    }

    pub fn get(&self, name: &str) -> Result<&Applicant, GradingError> {
        self.index
            .get(&applicant_key(name))
            .map(|idx| &self.applicants[*idx])
            .context(UnknownApplicantSnafu { name })
    }

    pub fn ratings(&self) -> &Ratings {
        &self.ratings
    }

    pub fn ratings_mut(&mut self) -> &mut Ratings {
        &mut self.ratings
    }

    pub fn resolve<'a>(&'a self, applicant: &'a Applicant) -> ResolvedAttributes<'a> {
        ResolvedAttributes {
            applicant,
            overrides: self.overrides.get(applicant.key()),
            ratings: &self.ratings,
            motivation: None,
        }
    }

    // ******** Overrides *********

    /// Shadows one field of an applicant. Returns the override it replaced, if any.
    pub fn set_override(
        &mut self,
        name: &str,
        field: &str,
        value: AttributeValue,
    ) -> Result<Option<AttributeValue>, GradingError> {
        let applicant = self.get(name)?;
        ensure!(
            applicant.raw(field).is_some(),
            UnknownFieldSnafu {
                applicant: applicant.name.clone(),
                field
            }
        );
        let key = applicant.key().to_string();
        debug!("set_override: {} {} = {:?}", key, field, value);
        Ok(self
            .overrides
            .entry(key)
            .or_default()
            .insert(field.to_string(), value))
    }

    /// Removes an override. Returns true if there was one.
    pub fn clear_override(&mut self, name: &str, field: &str) -> Result<bool, GradingError> {
        let key = self.get(name)?.key().to_string();
        let removed = match self.overrides.get_mut(&key) {
            Some(fields) => fields.remove(field).is_some(),
            None => false,
        };
        if self.overrides.get(&key).map_or(false, |f| f.is_empty()) {
            self.overrides.remove(&key);
        }
        Ok(removed)
    }

    /// All the overrides, by applicant key.
    pub fn overrides(&self) -> &BTreeMap<String, BTreeMap<String, AttributeValue>> {
        &self.overrides
    }

    // ******** Labels *********

    /// Returns false if the applicant already had this label.
    pub fn add_label(&mut self, name: &str, label: &str) -> Result<bool, GradingError> {
        let applicant = self.get(name)?;
        let label = label.trim();
        ensure!(
            !label.is_empty(),
            EmptyLabelSnafu {
                applicant: applicant.name.clone()
            }
        );
        let key = applicant.key().to_string();
        Ok(self.labels.entry(key).or_default().insert(label.to_string()))
    }

    /// Returns false if the applicant did not have this label.
    pub fn remove_label(&mut self, name: &str, label: &str) -> Result<bool, GradingError> {
        let key = self.get(name)?.key().to_string();
        let removed = match self.labels.get_mut(&key) {
            Some(labels) => labels.remove(label),
            None => false,
        };
        if self.labels.get(&key).map_or(false, |l| l.is_empty()) {
            self.labels.remove(&key);
        }
        Ok(removed)
    }

    pub fn labels(&self, applicant: &Applicant) -> BTreeSet<String> {
        self.labels.get(applicant.key()).cloned().unwrap_or_default()
    }

    pub fn has_label(&self, applicant: &Applicant, label: &str) -> bool {
        self.labels
            .get(applicant.key())
            .map_or(false, |l| l.contains(label))
    }

    /// All the labels, by applicant key.
    pub fn all_labels(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.labels
    }

    /// The applicants matching the label filter, in import order.
    pub fn select(&self, filter: &LabelFilter) -> Vec<&Applicant> {
        self.applicants
            .iter()
            .filter(|a| filter.matches(&self.labels(a)))
            .collect()
    }

    /// The attribute schema seen by formulas: every raw attribute of the pool with
    /// the domain observed after overrides, the derived `applied` attribute and the
    /// motivation pseudo-attribute.
    pub fn schema(&self) -> Schema {
        let mut observed: BTreeMap<String, Option<(f64, f64)>> = BTreeMap::new();
        for a in self.applicants.iter() {
            let view = self.resolve(a);
            for (field, value) in view.iter() {
                let e = observed.entry(field.to_string()).or_insert(None);
                if let Ok(x) = self.ratings.coerce(field, value) {
                    *e = Some(match *e {
                        Some((lo, hi)) => (lo.min(x), hi.max(x)),
                        None => (x, x),
                    });
                }
            }
        }
        let mut attributes: BTreeMap<String, Domain> = observed
            .into_iter()
            .map(|(field, range)| {
                let domain = match (self.ratings.table(&field), range) {
                    (Some(table), _) => Domain::Rated(table.values().cloned().collect()),
                    (None, Some((min, max))) => Domain::Numeric { min, max },
                    (None, None) => Domain::Text,
                };
                (field, domain)
            })
            .collect();
        let applied_max = self
            .applicants
            .iter()
            .map(|a| previous_applications(self.resolve(a).get(APPLIED)))
            .fold(0.0, f64::max);
        attributes.insert(
            APPLIED.to_string(),
            Domain::Numeric {
                min: 0.0,
                max: applied_max,
            },
        );
        Schema::new(attributes)
    }
}
