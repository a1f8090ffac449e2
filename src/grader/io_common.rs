// Primitives shared by the readers of application files.

use std::collections::{BTreeMap, HashSet};

use grading::builder::Builder;
use grading::{AttributeValue, Pool};
use log::{debug, info, warn};
use snafu::prelude::*;

use crate::grader::*;

/// The applications as read from a file: the header and the data rows, with
/// their line numbers (starting at 1 for the header).
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct RawTable {
    pub header: Vec<String>,
    pub rows: Vec<(usize, Vec<String>)>,
}

/// Fields known to the grader, with phrases of the questions that fill them in
/// the usual application forms.
const KNOWN_FIELDS: &[(&str, &[&str])] = &[
    ("name", &["first name"]),
    ("lastname", &["last name", "surname"]),
    ("email", &["email address"]),
    ("born", &["year of birth"]),
    ("affiliation", &["country of affiliation"]),
    ("applied", &["did you already apply", "prev-application"]),
    ("programming", &["estimate your programming skills"]),
    ("programming_description", &["programming experience"]),
    ("python", &["python skills"]),
    ("open_source", &["exposure to open-source", "opensource"]),
    ("open_source_description", &["description of your contrib"]),
    ("cv", &["curriculum vitae"]),
    ("vcs", &["habitually use a version control system"]),
    ("travel_grant", &["travel grants"]),
];

// The question of a column title: lowercased, without quotes and colons, up
// to the first period.
fn question(raw: &str) -> String {
    let s = raw.trim_start_matches('\u{feff}').to_lowercase();
    let s: String = s
        .chars()
        .filter(|c| *c != ':' && *c != '"' && *c != '\'')
        .collect();
    let s = s.split('.').next().unwrap_or("");
    s.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Normalizes a column title into a field name that formulas can refer to.
///
/// `"Programming skills. How do you rate..."` becomes `programming_skills`.
pub fn normalize_header(raw: &str) -> String {
    question(raw)
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .collect::<Vec<&str>>()
        .join("_")
}

/// The field name of a column: the aliases of the state file first, then the
/// known fields.
pub fn header_to_field(raw: &str, aliases: &BTreeMap<String, String>) -> String {
    let field = normalize_header(raw);
    if let Some(alias) = aliases.get(&field) {
        return alias.clone();
    }
    if KNOWN_FIELDS.iter().any(|(known, _)| *known == field) {
        return field;
    }
    let q = question(raw);
    match KNOWN_FIELDS
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|p| q.contains(p)))
    {
        Some((known, _)) => {
            debug!("header_to_field: {:?} -> {}", raw, known);
            known.to_string()
        }
        None => field,
    }
}

// The columns holding the name of the applicant.
#[derive(Debug, Clone, Copy)]
enum Identity {
    NameLastname(usize, usize),
    Single(usize),
}

fn find_identity(fields: &[String]) -> Option<Identity> {
    let pos = |name: &str| fields.iter().position(|f| f == name);
    match (pos("name"), pos("lastname"), pos("fullname")) {
        (Some(n), Some(l), _) => Some(Identity::NameLastname(n, l)),
        (_, _, Some(f)) => Some(Identity::Single(f)),
        (Some(n), None, None) => Some(Identity::Single(n)),
        _ => None,
    }
}

/// Builds the pool from a table. Blank rows are skipped.
pub fn build_pool(
    path: &str,
    table: RawTable,
    aliases: &BTreeMap<String, String>,
    ratings: &BTreeMap<String, BTreeMap<String, f64>>,
) -> AppResult<Pool> {
    let fields: Vec<String> = table
        .header
        .iter()
        .map(|h| header_to_field(h, aliases))
        .collect();
    debug!("build_pool: {}: fields: {:?}", path, fields);
    let mut seen: HashSet<&str> = HashSet::new();
    for f in fields.iter() {
        ensure!(
            f.is_empty() || seen.insert(f.as_str()),
            DuplicateColumnSnafu {
                path,
                field: f.clone()
            }
        );
    }
    let identity = find_identity(&fields).context(MissingNameColumnSnafu { path })?;

    let mut builder = Builder::new();
    for (field, answers) in ratings.iter() {
        for (answer, value) in answers.iter() {
            builder.rating(field, answer, *value)?;
        }
    }

    for (lineno, row) in table.rows.into_iter() {
        if row.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        let cell = |idx: usize| row.get(idx).map(|s| s.trim()).unwrap_or("");
        let name = match identity {
            Identity::NameLastname(n, l) => format!("{} {}", cell(n), cell(l)),
            Identity::Single(idx) => cell(idx).to_string(),
        };
        if name.trim().is_empty() {
            warn!("{}:{}: no name, skipping the row", path, lineno);
            continue;
        }
        let attributes: BTreeMap<String, AttributeValue> = fields
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.is_empty())
            .map(|(idx, f)| (f.clone(), AttributeValue::parse(cell(idx))))
            .collect();
        builder.add_applicant(&name, attributes)?;
    }
    let pool = builder.build()?;
    info!("Read {} applications from {}", pool.len(), path);
    Ok(pool)
}

/// Reads the applications, in CSV or Excel format depending on the extension.
pub fn read_applications(
    path: &str,
    aliases: &BTreeMap<String, String>,
    ratings: &BTreeMap<String, BTreeMap<String, f64>>,
) -> AppResult<Pool> {
    let lower = path.to_lowercase();
    let table = if lower.ends_with(".xlsx") || lower.ends_with(".xlsm") {
        io_xlsx::read_excel_table(path)?
    } else {
        io_csv::read_csv_table(path)?
    };
    build_pool(path, table, aliases, ratings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use grading::GradingError;

    fn table(header: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable {
            header: header.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .enumerate()
                .map(|(idx, r)| (idx + 2, r.iter().map(|s| s.to_string()).collect()))
                .collect(),
        }
    }

    #[test]
    fn headers() {
        assert_eq!(normalize_header("Name:"), "name");
        assert_eq!(normalize_header("\u{feff}\"Last  Name\""), "last_name");
        assert_eq!(
            normalize_header("Programming. How would you rate yourself?"),
            "programming"
        );
        assert_eq!(normalize_header("Open Source"), "open_source");
        assert_eq!(normalize_header("Self-rating (1-5)?"), "self_rating_1_5");
        let mut aliases = BTreeMap::new();
        aliases.insert("first_name".to_string(), "surname".to_string());
        assert_eq!(header_to_field("First name:", &aliases), "surname");
    }

    #[test]
    fn known_fields() {
        let none = BTreeMap::new();
        assert_eq!(header_to_field("Did you already apply?", &none), "applied");
        assert_eq!(header_to_field("First name:", &none), "name");
        assert_eq!(header_to_field("Last Name", &none), "lastname");
        assert_eq!(
            header_to_field("Please estimate your programming skills. (1: novice)", &none),
            "programming"
        );
        assert_eq!(header_to_field("Python", &none), "python");
        assert_eq!(header_to_field("Favourite color?", &none), "favourite_color");
    }

    #[test]
    fn name_and_lastname() {
        let t = table(
            &["Name", "Lastname", "Born"],
            &[&["John", "Doe", "1990"], &["", "", ""], &["Mary", "Smith", "x"]],
        );
        let pool = build_pool("test.csv", t, &BTreeMap::new(), &BTreeMap::new()).unwrap();
        assert_eq!(pool.len(), 2);
        let john = pool.get("john doe").unwrap();
        assert_eq!(john.raw("born"), Some(&AttributeValue::Number(1990.0)));
        assert_eq!(
            pool.get("Mary Smith").unwrap().raw("born"),
            Some(&AttributeValue::Text("x".to_string()))
        );
    }

    #[test]
    fn fullname_and_ratings() {
        let t = table(&["Full name", "Python"], &[&["Ada Lovelace", "Expert"]]);
        let mut aliases = BTreeMap::new();
        aliases.insert("full_name".to_string(), "fullname".to_string());
        let mut ratings = BTreeMap::new();
        ratings.insert(
            "python".to_string(),
            [("expert".to_string(), 1.0)].into_iter().collect(),
        );
        let pool = build_pool("test.csv", t, &aliases, &ratings).unwrap();
        let ada = pool.get("Ada Lovelace").unwrap();
        assert_eq!(pool.resolve(ada).numeric("python"), Some(Ok(1.0)));
    }

    #[test]
    fn import_errors() {
        let t = table(&["Born"], &[&["1990"]]);
        assert!(matches!(
            build_pool("t.csv", t, &BTreeMap::new(), &BTreeMap::new()),
            Err(AppError::MissingNameColumn { .. })
        ));
        let t = table(&["Name", "Born", "born:"], &[&["A", "1", "2"]]);
        assert!(matches!(
            build_pool("t.csv", t, &BTreeMap::new(), &BTreeMap::new()),
            Err(AppError::DuplicateColumn { .. })
        ));
        let t = table(&["Name"], &[&["A B"], &["a  b"]]);
        assert!(matches!(
            build_pool("t.csv", t, &BTreeMap::new(), &BTreeMap::new()),
            Err(AppError::Grading {
                source: GradingError::DuplicateApplicant { .. }
            })
        ));
    }
}
