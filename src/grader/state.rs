// The state file shared by all the reviewers.
//
// Every map is a BTreeMap and the file is pretty-printed, so that two reviewers
// working on copies of the same file can merge their work line by line.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use grading::{Aggregation, AttributeValue};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::grader::*;

/// The bonuses of the labels used by the selection committees.
pub fn default_label_bonuses() -> BTreeMap<String, f64> {
    [
        ("VIP", 1000.0),
        ("CONFIRMED", 2000.0),
        ("INVITE", 600.0),
        ("INVITESL", 200.0),
        ("SHORTLIST", 100.0),
        ("DECLINED", -650.0),
        ("NEXT-YEAR", -650.0),
        ("WITHDRAWN", -650.0),
        ("OVERQUALIFIED", -650.0),
    ]
    .iter()
    .map(|(l, b)| (l.to_string(), *b))
    .collect()
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationSetting {
    Mean,
    Sum,
}

impl Default for AggregationSetting {
    fn default() -> AggregationSetting {
        AggregationSetting::Mean
    }
}

impl From<AggregationSetting> for Aggregation {
    fn from(a: AggregationSetting) -> Aggregation {
        match a {
            AggregationSetting::Mean => Aggregation::Mean,
            AggregationSetting::Sum => Aggregation::Sum,
        }
    }
}

/// An overridden value, written as a plain JSON number, boolean or string.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredValue {
    Number(f64),
    Flag(bool),
    Text(String),
}

impl From<&AttributeValue> for StoredValue {
    fn from(v: &AttributeValue) -> StoredValue {
        match v {
            AttributeValue::Number(x) => StoredValue::Number(*x),
            AttributeValue::Flag(b) => StoredValue::Flag(*b),
            AttributeValue::Text(s) => StoredValue::Text(s.clone()),
        }
    }
}

impl From<&StoredValue> for AttributeValue {
    fn from(v: &StoredValue) -> AttributeValue {
        match v {
            StoredValue::Number(x) => AttributeValue::Number(*x),
            StoredValue::Flag(b) => AttributeValue::Flag(*b),
            StoredValue::Text(s) => AttributeValue::Text(s.clone()),
        }
    }
}

/// Applicants are referred to by their key (lowercased full name).
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    pub formula: Option<String>,
    /// field -> answer -> number
    pub ratings: BTreeMap<String, BTreeMap<String, f64>>,
    pub labels: BTreeMap<String, BTreeSet<String>>,
    /// applicant -> field -> value
    pub overrides: BTreeMap<String, BTreeMap<String, StoredValue>>,
    /// reviewer -> applicant -> -1, 0 or 1
    pub motivation_scores: BTreeMap<String, BTreeMap<String, i64>>,
    pub label_bonuses: BTreeMap<String, f64>,
    pub highlander_label: Option<String>,
    pub aggregation: AggregationSetting,
    /// normalized column name -> field name
    pub field_aliases: BTreeMap<String, String>,
    pub disagreement_gap: Option<i64>,
}

impl Default for PersistedState {
    fn default() -> PersistedState {
        PersistedState {
            formula: None,
            ratings: BTreeMap::new(),
            labels: BTreeMap::new(),
            overrides: BTreeMap::new(),
            motivation_scores: BTreeMap::new(),
            label_bonuses: default_label_bonuses(),
            highlander_label: None,
            aggregation: AggregationSetting::default(),
            field_aliases: BTreeMap::new(),
            disagreement_gap: None,
        }
    }
}

/// Reads the state file. A missing file is an empty state; a file that cannot
/// be read or parsed is an error.
pub fn load(path: &Path) -> AppResult<PersistedState> {
    let p = path.display().to_string();
    if !path.exists() {
        info!("No state file at {}: starting from an empty state", p);
        return Ok(PersistedState::default());
    }
    let contents = fs::read_to_string(path).context(ReadingStateSnafu { path: p.clone() })?;
    let state: PersistedState =
        serde_json::from_str(&contents).context(ParsingStateSnafu { path: p.clone() })?;
    debug!(
        "load: {}: {} reviewers, {} labeled applicants",
        p,
        state.motivation_scores.len(),
        state.labels.len()
    );
    Ok(state)
}

pub fn save(path: &Path, state: &PersistedState) -> AppResult<()> {
    let p = path.display().to_string();
    let mut js = serde_json::to_string_pretty(state).context(SerializingJsonSnafu {})?;
    js.push('\n');
    fs::write(path, js).context(WritingStateSnafu { path: p.clone() })?;
    info!("Saved state to {}", p);
    Ok(())
}
