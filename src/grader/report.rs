// Text and JSON output of the commands.

use std::collections::{BTreeMap, BTreeSet};

use grading::formula::{Formula, ScoreBounds};
use grading::stats::ReviewerStats;
use grading::{Applicant, RankedApplicant};
use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;

use crate::grader::Workspace;

fn join_labels(labels: &BTreeSet<String>) -> String {
    labels.iter().cloned().collect::<Vec<String>>().join(" ")
}

/// One applicant as shown while grading. The short form only shows the fields
/// used by the formula.
pub fn applicant_card(ws: &Workspace, applicant: &Applicant, long: bool) -> String {
    let mut lines: Vec<String> = Vec::new();
    let labels = ws.pool.labels(applicant);
    if labels.is_empty() {
        lines.push(format!("* {}", applicant.name));
    } else {
        lines.push(format!("* {}  [{}]", applicant.name, join_labels(&labels)));
    }

    let grades = ws.ledger.grades_for(applicant.key());
    if !grades.is_empty() {
        let g: Vec<String> = grades.iter().map(|(r, s)| format!("{} {}", r, s)).collect();
        lines.push(format!("   grades: {}", g.join(", ")));
    }

    let view = ws.pool.resolve(applicant);
    let shown = |field: &str| match (&ws.formula, long) {
        (Some(f), false) => f.references(field),
        _ => true,
    };
    for (field, value) in view.iter().filter(|(f, _)| shown(*f)) {
        let marker = if view.is_overridden(field) {
            format!(" (was {})", applicant.raw(field).map_or(String::new(), |v| v.to_string()))
        } else {
            String::new()
        };
        lines.push(format!("   {}: {}{}", field, value, marker));
    }

    if let Some(f) = &ws.formula {
        let motivation = ws.ledger.aggregate(applicant.key(), ws.options.aggregation);
        let eval = f.evaluate(&view.with_motivation(motivation));
        lines.push(format!("   score: {:.5}", eval.score));
        if long {
            for t in eval.terms.iter() {
                lines.push(format!(
                    "     {:<20} {:>8.3} x {:<8} = {:>9.5} ({:.0}%)",
                    t.attribute, t.value, t.weight, t.contribution, t.share
                ));
            }
        }
        for w in eval.warnings.iter() {
            lines.push(format!("   warning: {}", w));
        }
    }
    lines.push(String::new());
    lines.join("\n")
}

pub fn formula_report(formula: &Formula, bounds: &ScoreBounds) -> String {
    let mut lines: Vec<String> = vec![
        format!("formula = {}", formula),
        format!("score range: [{:.5}, {:.5}]", bounds.min, bounds.max),
    ];
    for (term, pc) in bounds.contributions.iter() {
        lines.push(format!("  {:>6.2}%  {}", pc, term));
    }
    lines.push(String::new());
    lines.join("\n")
}

fn motivation_cell(r: &RankedApplicant) -> String {
    match r.motivation {
        Some(m) => format!("{:+.2}", m),
        None => "-".to_string(),
    }
}

pub fn ranking_table(ranked: &[RankedApplicant]) -> String {
    let mut lines: Vec<String> = vec![format!(
        "{:>4} {:>12} {:>6}  {:<30} labels",
        "pos", "total", "mot", "name"
    )];
    for r in ranked.iter() {
        lines.push(format!(
            "{:>4} {:>12.5} {:>6}  {:<30} {}",
            r.position,
            r.total_score,
            motivation_cell(r),
            r.applicant.name,
            join_labels(&r.labels)
        ));
    }
    lines.push(String::new());
    lines.join("\n")
}

pub fn ranking_json(formula: &Formula, bounds: &ScoreBounds, ranked: &[RankedApplicant]) -> JSValue {
    let contributions: Vec<JSValue> = bounds
        .contributions
        .iter()
        .map(|(term, pc)| json!({"term": term, "percent": pc}))
        .collect();
    let entries: Vec<JSValue> = ranked
        .iter()
        .map(|r| {
            let mut entry: JSMap<String, JSValue> = JSMap::new();
            entry.insert("position".to_string(), json!(r.position));
            entry.insert("name".to_string(), json!(r.applicant.name));
            entry.insert("total".to_string(), json!(r.total_score));
            entry.insert("base".to_string(), json!(r.base_score));
            entry.insert("motivation".to_string(), json!(r.motivation));
            entry.insert("label_bonus".to_string(), json!(r.label_bonus));
            entry.insert("highlander".to_string(), json!(r.highlander));
            entry.insert("labels".to_string(), json!(r.labels));
            if !r.warnings.is_empty() {
                let warnings: Vec<String> = r.warnings.iter().map(|w| w.to_string()).collect();
                entry.insert("warnings".to_string(), json!(warnings));
            }
            JSValue::Object(entry)
        })
        .collect();
    json!({
        "formula": formula.to_string(),
        "bounds": {"min": bounds.min, "max": bounds.max, "contributions": contributions},
        "ranking": entries
    })
}

pub fn stats_table(pool_size: usize, stats: &[ReviewerStats]) -> String {
    let mut lines: Vec<String> = vec![
        format!("{} applicants", pool_size),
        format!("{:<20} {:>5} {:>5} {:>5} {:>6}", "reviewer", "-1", "0", "1", "todo"),
    ];
    for s in stats.iter() {
        lines.push(format!(
            "{:<20} {:>5} {:>5} {:>5} {:>6}",
            s.reviewer, s.negative, s.neutral, s.positive, s.todo
        ));
    }
    lines.push(String::new());
    lines.join("\n")
}

pub fn histogram(field: &str, counts: &BTreeMap<String, usize>) -> String {
    let mut sorted: Vec<(&String, &usize)> = counts.iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(a.1));
    let mut lines: Vec<String> = vec![format!("{}:", field)];
    for (value, count) in sorted {
        lines.push(format!("  {:>5}  {}", count, value));
    }
    lines.push(String::new());
    lines.join("\n")
}

/// The ratings of a field, followed by the answers that have no rating yet.
pub fn ratings_table(
    field: &str,
    table: &BTreeMap<String, f64>,
    answers: &BTreeSet<String>,
) -> String {
    let mut lines: Vec<String> = vec![format!("{}:", field)];
    for (answer, value) in table.iter() {
        lines.push(format!("  {} = {}", answer, value));
    }
    for answer in answers.iter().filter(|a| !table.contains_key(*a)) {
        lines.push(format!("  {} = ?", answer));
    }
    lines.push(String::new());
    lines.join("\n")
}
