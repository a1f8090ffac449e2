use log::{debug, info, warn};

use grading::formula::Formula;
use grading::stats::{grading_stats, value_histogram};
use grading::*;
use snafu::{prelude::*, Snafu};

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use regex::RegexBuilder;

use crate::args::{Args, Command};
use crate::grader::session::{run_session, Queue};
use crate::grader::state::{PersistedState, StoredValue};

const INVITE_LABEL: &str = "INVITE";
const SHORTLIST_LABEL: &str = "SHORTLIST";

pub mod io_common;
pub mod io_csv;
pub mod io_xlsx;
pub mod report;
pub mod session;
pub mod state;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AppError {
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("The file {path} has no worksheet or no header"))]
    EmptyExcel { path: String },
    #[snafu(display("Error opening file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("{path}:{lineno}: could not read the line"))]
    CsvLineParse {
        source: csv::Error,
        path: String,
        lineno: usize,
    },
    #[snafu(display("The file {path} has no header"))]
    MissingHeader { path: String },
    #[snafu(display("In {path}, two columns are named {field:?}"))]
    DuplicateColumn { path: String, field: String },
    #[snafu(display(
        "In {path}, no column with the names: expected name and lastname, fullname or name"
    ))]
    MissingNameColumn { path: String },

    #[snafu(display("Error reading the state file {path}"))]
    ReadingState { source: io::Error, path: String },
    #[snafu(display("The state file {path} is corrupted"))]
    ParsingState {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("The state file {path} is corrupted: {reason}"))]
    InvalidState { path: String, reason: String },
    #[snafu(display("Error writing the state file {path}"))]
    WritingState { source: io::Error, path: String },
    #[snafu(display("Error writing to {path}"))]
    WritingOutput { source: io::Error, path: String },
    #[snafu(display("Error producing JSON"))]
    SerializingJson { source: serde_json::Error },
    #[snafu(display("Error with the terminal"))]
    Terminal { source: io::Error },

    #[snafu(display("Who is grading? Pass --identity NAME"))]
    MissingIdentity {},
    #[snafu(display("Invalid pattern {pattern:?}"))]
    InvalidPattern {
        source: regex::Error,
        pattern: String,
    },

    #[snafu(context(false), display("{source}"))]
    Grading { source: GradingError },
    #[snafu(context(false), display("{source}"))]
    Formula { source: FormulaError },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type AppResult<T> = Result<T, AppError>;

/// The pool and everything the reviewers have done with it.
#[derive(Debug)]
pub struct Workspace {
    pub pool: Pool,
    pub ledger: GradeLedger,
    /// None if unset, or if the formula of the state refers to unknown attributes.
    pub formula: Option<Formula>,
    pub options: RankingOptions,
    pub resolver: DisagreementResolver,
    // As loaded: keeps the settings and the entries on applicants that are
    // not in the pool anymore.
    state: PersistedState,
    state_path: PathBuf,
    modified: bool,
}

/// The state file next to the applications: `applications.csv` uses `applications.json`.
pub fn default_state_path(applications: &str) -> PathBuf {
    Path::new(applications).with_extension("json")
}

impl Workspace {
    pub fn open(args: &Args) -> AppResult<Workspace> {
        let state_path = match &args.state {
            Some(p) => PathBuf::from(p),
            None => default_state_path(&args.applications),
        };
        Workspace::load(&args.applications, &state_path)
    }

    pub fn load(applications: &str, state_path: &Path) -> AppResult<Workspace> {
        let state = state::load(state_path)?;
        let pool = io_common::read_applications(applications, &state.field_aliases, &state.ratings)?;
        Workspace::from_parts(pool, state, state_path)
    }

    /// Attaches a loaded state to the pool. Grades out of range or a formula
    /// that cannot be parsed make the state invalid.
    pub fn from_parts(
        mut pool: Pool,
        state: PersistedState,
        state_path: &Path,
    ) -> AppResult<Workspace> {
        let path = state_path.display().to_string();

        let mut ledger = GradeLedger::new();
        for (reviewer, grades) in state.motivation_scores.iter() {
            for (applicant, score) in grades.iter() {
                if let Err(e) = ledger.load_grade(reviewer, applicant, *score) {
                    return InvalidStateSnafu {
                        path,
                        reason: format!("{} for {} by {}", e, applicant, reviewer),
                    }
                    .fail();
                }
            }
        }

        for (applicant, labels) in state.labels.iter() {
            if !pool.contains(applicant) {
                warn!("Labels of unknown applicant {:?} are kept as they are", applicant);
                continue;
            }
            for l in labels.iter() {
                if l.trim().is_empty() {
                    warn!("Dropping an empty label of {:?}", applicant);
                    continue;
                }
                pool.add_label(applicant, l)?;
            }
        }

        for (applicant, fields) in state.overrides.iter() {
            for (field, value) in fields.iter() {
                if is_orphan_override(&pool, applicant, field) {
                    warn!(
                        "Override of {:?} for {:?} does not apply to the applications, it is kept as it is",
                        field, applicant
                    );
                    continue;
                }
                pool.set_override(applicant, field, value.into())?;
            }
        }

        let formula = match &state.formula {
            None => None,
            Some(text) => {
                let f: Formula = match text.parse() {
                    Ok(f) => f,
                    Err(e) => {
                        return InvalidStateSnafu {
                            path,
                            reason: format!("formula {:?}: {}", text, e),
                        }
                        .fail()
                    }
                };
                match f.validate(&pool.schema()) {
                    Ok(()) => Some(f),
                    Err(e) => {
                        warn!("The formula {:?} cannot be used: {}", text, e);
                        None
                    }
                }
            }
        };

        let options = RankingOptions {
            aggregation: state.aggregation.into(),
            highlander_label: state
                .highlander_label
                .clone()
                .unwrap_or_else(|| DEFAULT_HIGHLANDER_LABEL.to_string()),
            label_bonuses: state.label_bonuses.clone(),
            use_labels: true,
        };
        let gap = state.disagreement_gap.unwrap_or(1);
        // Grades are at most 2 apart.
        if !(1..=2).contains(&gap) {
            return InvalidStateSnafu {
                path,
                reason: format!("disagreement_gap is {}, expected 1 or 2", gap),
            }
            .fail();
        }
        let resolver = DisagreementResolver::new(gap);
        debug!(
            "Workspace: {} applicants, formula {:?}, {:?}",
            pool.len(),
            state.formula,
            options
        );
        Ok(Workspace {
            pool,
            ledger,
            formula,
            options,
            resolver,
            state,
            state_path: state_path.to_path_buf(),
            modified: false,
        })
    }

    pub fn mark_modified(&mut self) {
        self.modified = true;
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Replaces the formula. On error, the previous formula stays.
    pub fn set_formula(&mut self, expression: &str) -> Result<&Formula, FormulaError> {
        let f = Formula::parse(expression, &self.pool.schema())?;
        info!("New formula: {}", f);
        self.state.formula = Some(f.to_string());
        self.modified = true;
        Ok(self.formula.insert(f))
    }

    pub fn formula_text(&self) -> Option<&str> {
        self.state.formula.as_deref()
    }

    /// The formula, or an error telling how to set one.
    pub fn formula(&self) -> AppResult<&Formula> {
        match (&self.formula, &self.state.formula) {
            (Some(f), _) => Ok(f),
            (None, Some(text)) => {
                whatever!("The formula {:?} does not match the applications: set a new one", text)
            }
            (None, None) => whatever!("No formula: set one with `grader formula EXPRESSION`"),
        }
    }

    /// The state to write back: the loaded one, updated with the work done on
    /// the applicants of the pool.
    pub fn to_state(&self) -> PersistedState {
        let mut state = self.state.clone();

        state.ratings = self.pool.ratings().tables().clone();

        state.motivation_scores = self
            .ledger
            .reviewers()
            .filter_map(|r| self.ledger.graded_by(r).map(|g| (r, g)))
            .map(|(r, grades)| {
                let grades: BTreeMap<String, i64> =
                    grades.iter().map(|(k, s)| (k.clone(), s.value())).collect();
                (r.to_string(), grades)
            })
            .collect();

        state.labels.retain(|k, _| !self.pool.contains(k));
        for (k, labels) in self.pool.all_labels().iter() {
            state.labels.insert(k.clone(), labels.clone());
        }

        let mut overrides: BTreeMap<String, BTreeMap<String, StoredValue>> = BTreeMap::new();
        for (k, fields) in self.state.overrides.iter() {
            for (field, value) in fields.iter() {
                if is_orphan_override(&self.pool, k, field) {
                    overrides
                        .entry(k.clone())
                        .or_default()
                        .insert(field.clone(), value.clone());
                }
            }
        }
        for (k, fields) in self.pool.overrides().iter() {
            for (field, value) in fields.iter() {
                overrides
                    .entry(k.clone())
                    .or_default()
                    .insert(field.clone(), value.into());
            }
        }
        state.overrides = overrides;
        state
    }

    pub fn save_if_modified(&self) -> AppResult<()> {
        if !self.modified {
            debug!("save_if_modified: nothing to save");
            return Ok(());
        }
        state::save(&self.state_path, &self.to_state())
    }
}

fn is_orphan_override(pool: &Pool, applicant: &str, field: &str) -> bool {
    pool.get(applicant)
        .map_or(true, |a| a.raw(field).is_none())
}

fn identity(args: &Args) -> AppResult<&str> {
    args.identity.as_deref().context(MissingIdentitySnafu {})
}

/// Runs one command. The state is saved if the command changed it, even if
/// the command failed halfway.
pub fn run(args: &Args) -> AppResult<()> {
    let mut ws = Workspace::open(args)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let res = run_command(&mut ws, args, &mut io::stdin().lock(), &mut out);
    ws.save_if_modified()?;
    res
}

pub fn run_command<R: BufRead, W: Write>(
    ws: &mut Workspace,
    args: &Args,
    input: &mut R,
    out: &mut W,
) -> AppResult<()> {
    match &args.command {
        Command::Grade {
            graded,
            label,
            disagreement,
            name,
        } => {
            let reviewer = identity(args)?;
            let queue = grading_queue(ws, reviewer, name, graded, label, disagreement)?;
            run_session(ws, reviewer, queue, input, out)
        }
        Command::Formula { expression } => formula_command(ws, expression, out),
        Command::Rank {
            no_labels,
            label,
            out: out_path,
        } => rank_command(ws, *no_labels, label, out_path.as_deref(), out),
        Command::Dump {
            attribute,
            disagreements,
            long,
            name,
        } => dump_command(ws, attribute, *disagreements, *long, name, out),
        Command::Stat { detailed } => stat_command(ws, args.identity.as_deref(), *detailed, out),
        Command::Label {
            remove,
            label,
            name,
        } => label_command(ws, *remove, label, &name.join(" "), out),
        Command::Rate { field, answer } => rate_command(ws, field.as_deref(), answer, out),
        Command::Autolabel { shortlist } => autolabel_command(ws, *shortlist, out),
    }
}

fn grading_queue(
    ws: &Workspace,
    reviewer: &str,
    name: &[String],
    graded: &Option<Option<i64>>,
    label: &[String],
    disagreement: &Option<Option<String>>,
) -> AppResult<Queue> {
    if !name.is_empty() {
        let a = ws.pool.get(&name.join(" "))?;
        return Ok(Queue::Fixed(vec![a.key().to_string()]));
    }
    let filter = LabelFilter::parse(label);
    let selected = ws.pool.select(&filter);
    let keys = |v: Vec<&Applicant>| -> Vec<String> { v.iter().map(|a| a.key().to_string()).collect() };
    match (graded, disagreement) {
        (Some(score), _) => {
            if let Some(s) = score {
                Score::try_from(*s)?;
            }
            let regrade: Vec<&Applicant> = selected
                .into_iter()
                .filter(|a| match (ws.ledger.grade(reviewer, a.key()), score) {
                    (Some(g), Some(s)) => g.value() == *s,
                    (Some(_), None) => true,
                    (None, _) => false,
                })
                .collect();
            Ok(Queue::Fixed(keys(regrade)))
        }
        (None, Some(other)) => Ok(Queue::Fixed(keys(ws.resolver.disagreements(
            &ws.ledger,
            selected,
            Some(reviewer),
            other.as_deref(),
        )))),
        (None, None) => Ok(Queue::Ungraded(filter)),
    }
}

fn formula_command<W: Write>(ws: &mut Workspace, expression: &[String], out: &mut W) -> AppResult<()> {
    if !expression.is_empty() {
        if let Err(e) = ws.set_formula(&expression.join(" ")) {
            writeln!(out, "Formula rejected, keeping the previous one: {}", e).context(TerminalSnafu)?;
            return Err(e.into());
        }
    }
    match &ws.formula {
        Some(f) => {
            let bounds = f.score_bounds(&ws.pool.schema());
            write!(out, "{}", report::formula_report(f, &bounds)).context(TerminalSnafu)?;
        }
        None => match ws.formula_text() {
            Some(text) => writeln!(out, "formula = {} (unusable)", text).context(TerminalSnafu)?,
            None => writeln!(out, "No formula set").context(TerminalSnafu)?,
        },
    }
    Ok(())
}

fn rank_command<W: Write>(
    ws: &Workspace,
    no_labels: bool,
    label: &[String],
    out_path: Option<&str>,
    out: &mut W,
) -> AppResult<()> {
    let formula = ws.formula()?;
    let mut options = ws.options.clone();
    options.use_labels = !no_labels;
    let selected = ws.pool.select(&LabelFilter::parse(label));
    let ranked = rank(selected, &ws.pool, formula, &ws.ledger, &options);

    let bounds = formula.score_bounds(&ws.pool.schema());
    let js = report::ranking_json(formula, &bounds, &ranked);
    match out_path {
        Some("stdout") => {
            let pretty = serde_json::to_string_pretty(&js).context(SerializingJsonSnafu {})?;
            writeln!(out, "{}", pretty).context(TerminalSnafu)?;
        }
        Some(path) => {
            let pretty = serde_json::to_string_pretty(&js).context(SerializingJsonSnafu {})?;
            fs::write(path, pretty).context(WritingOutputSnafu { path })?;
            write!(out, "{}", report::ranking_table(&ranked)).context(TerminalSnafu)?;
            info!("Wrote the ranking to {}", path);
        }
        None => write!(out, "{}", report::ranking_table(&ranked)).context(TerminalSnafu)?,
    }
    Ok(())
}

fn dump_command<W: Write>(
    ws: &Workspace,
    attribute: &[String],
    disagreements: bool,
    long: bool,
    name: &[String],
    out: &mut W,
) -> AppResult<()> {
    if !name.is_empty() {
        let a = ws.pool.get(&name.join(" "))?;
        write!(out, "{}", report::applicant_card(ws, a, true)).context(TerminalSnafu)?;
        return Ok(());
    }
    let mut selected: Vec<&Applicant> = ws.pool.iter().collect();
    if let [field, pattern] = attribute {
        let re = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .context(InvalidPatternSnafu { pattern })?;
        selected.retain(|a| {
            ws.pool
                .resolve(a)
                .get(field)
                .map_or(false, |v| re.is_match(&v.to_string()))
        });
    }
    if disagreements {
        selected = ws
            .resolver
            .disagreements(&ws.ledger, selected, None, None);
    }
    for a in selected.iter() {
        write!(out, "{}", report::applicant_card(ws, a, long)).context(TerminalSnafu)?;
    }
    writeln!(out, "{} applicants", selected.len()).context(TerminalSnafu)?;
    Ok(())
}

fn stat_command<W: Write>(
    ws: &Workspace,
    identity: Option<&str>,
    detailed: bool,
    out: &mut W,
) -> AppResult<()> {
    let extra: Vec<&str> = identity.into_iter().collect();
    let stats = grading_stats(&ws.ledger, &ws.pool, &extra);
    write!(out, "{}", report::stats_table(ws.pool.len(), &stats)).context(TerminalSnafu)?;
    if detailed {
        let schema = ws.pool.schema();
        // Only the columns of the applications.
        for field in schema
            .names()
            .filter(|f| ws.pool.iter().any(|a| a.raw(f).is_some()))
        {
            let counts = value_histogram(&ws.pool, field);
            write!(out, "{}", report::histogram(field, &counts)).context(TerminalSnafu)?;
        }
    }
    Ok(())
}

fn label_command<W: Write>(
    ws: &mut Workspace,
    remove: bool,
    label: &str,
    name: &str,
    out: &mut W,
) -> AppResult<()> {
    let changed = if remove {
        ws.pool.remove_label(name, label)?
    } else {
        ws.pool.add_label(name, label)?
    };
    if changed {
        ws.mark_modified();
    }
    let a = ws.pool.get(name)?;
    let labels: Vec<String> = ws.pool.labels(a).into_iter().collect();
    writeln!(out, "{}: {}", a.name, labels.join(" ")).context(TerminalSnafu)?;
    Ok(())
}

fn rate_command<W: Write>(
    ws: &mut Workspace,
    field: Option<&str>,
    answer: &[String],
    out: &mut W,
) -> AppResult<()> {
    let field = match field {
        Some(f) => f,
        None => {
            for (field, table) in ws.pool.ratings().tables().iter() {
                write!(out, "{}", report::ratings_table(field, table, &BTreeSet::new()))
                    .context(TerminalSnafu)?;
            }
            return Ok(());
        }
    };
    if let [words @ .., value] = answer {
        ensure_whatever!(!words.is_empty(), "Usage: rate FIELD ANSWER VALUE");
        let value: f64 = match value.parse() {
            Ok(x) => x,
            Err(_) => whatever!("{:?} is not a number", value),
        };
        ws.pool.ratings_mut().set(field, &words.join(" "), value)?;
        ws.mark_modified();
    }
    // The answers found in the applications, to see what is left to rate.
    let answers: BTreeSet<String> = ws
        .pool
        .iter()
        .filter_map(|a| ws.pool.resolve(a).get(field).map(|v| applicant::rating_key(&v.to_string())))
        .collect();
    let empty: BTreeMap<String, f64> = BTreeMap::new();
    let table = ws.pool.ratings().table(field).unwrap_or(&empty);
    write!(out, "{}", report::ratings_table(field, table, &answers)).context(TerminalSnafu)?;
    Ok(())
}

// The labels to add, in ranking order.
fn autolabel_plan(ws: &Workspace, shortlist: usize) -> AppResult<Vec<(String, &'static str)>> {
    let formula = ws.formula()?;
    let ranked = rank(ws.pool.iter(), &ws.pool, formula, &ws.ledger, &ws.options);
    let (highlanders, others): (Vec<&RankedApplicant>, Vec<&RankedApplicant>) =
        ranked.iter().partition(|r| r.highlander);
    let plan: Vec<(String, &'static str)> = highlanders
        .into_iter()
        .map(|r| (r.applicant.key().to_string(), INVITE_LABEL))
        .chain(
            others
                .into_iter()
                .take(shortlist)
                .map(|r| (r.applicant.key().to_string(), SHORTLIST_LABEL)),
        )
        .collect();
    Ok(plan)
}

/// Labels the highlanders of the ranking INVITE and the `shortlist` applicants
/// ranked after them SHORTLIST.
fn autolabel_command<W: Write>(ws: &mut Workspace, shortlist: usize, out: &mut W) -> AppResult<()> {
    let plan = autolabel_plan(ws, shortlist)?;
    for (key, label) in plan.iter() {
        if ws.pool.add_label(key, label)? {
            ws.mark_modified();
        }
        let a = ws.pool.get(key)?;
        writeln!(out, "{:<10} {}", label, a.name).context(TerminalSnafu)?;
    }
    info!("autolabel: {} applicants labeled", plan.len());
    Ok(())
}
