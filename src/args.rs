use clap::{Parser, Subcommand};

/// This is a program to grade and rank applications with several reviewers.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, default applications.csv) The applications, in CSV or Excel (.xlsx) format.
    /// The first row holds the names of the fields.
    #[clap(short, long, value_parser, default_value = "applications.csv")]
    pub applications: String,

    /// (file path, optional) The file with the work of all the reviewers: grades, labels, overrides,
    /// ratings and formula. Defaults to the applications file with a .json extension.
    #[clap(short, long, value_parser)]
    pub state: Option<String>,

    /// (name) The reviewer doing the grading.
    #[clap(short, long, value_parser)]
    pub identity: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Grade the motivation of applicants. Without options, goes through the applicants not graded yet.
    Grade {
        /// Grade again the applicants already graded, optionally only those with this score.
        #[clap(short, long, value_parser, allow_hyphen_values = true, value_name = "SCORE")]
        graded: Option<Option<i64>>,

        /// Only the applicants with all of those labels. Use `A B - C` to exclude C.
        #[clap(short, long, value_parser, multiple_values = true)]
        label: Vec<String>,

        /// Grade again the applicants on which another reviewer (or this one) disagrees.
        #[clap(short, long, value_parser, value_name = "REVIEWER")]
        disagreement: Option<Option<String>>,

        /// The full name of one applicant to grade.
        #[clap(value_parser)]
        name: Vec<String>,
    },

    /// Show the formula, or set it, with its range and the contribution of each term.
    Formula {
        /// The new formula, for example `programming*0.5 + motivation*0.5`.
        #[clap(value_parser)]
        expression: Vec<String>,
    },

    /// Print the applicants sorted by ranking.
    Rank {
        /// Do not use label bonuses.
        #[clap(short, long, takes_value = false)]
        no_labels: bool,

        /// Only the applicants with all of those labels.
        #[clap(short, long, value_parser, multiple_values = true)]
        label: Vec<String>,

        /// (file path or 'stdout') Also write the ranking in JSON format.
        #[clap(short, long, value_parser)]
        out: Option<String>,
    },

    /// Show applicants.
    Dump {
        /// Only the applicants whose FIELD matches PATTERN (case-insensitive regular expression).
        #[clap(short, long, value_parser, number_of_values = 2, value_names = &["FIELD", "PATTERN"])]
        attribute: Vec<String>,

        /// Only the applicants on which at least two reviewers disagree.
        #[clap(short = 'D', long, takes_value = false)]
        disagreements: bool,

        /// Show all the fields.
        #[clap(long, takes_value = false)]
        long: bool,

        /// The full name of one applicant.
        #[clap(value_parser)]
        name: Vec<String>,
    },

    /// Display statistics about the grading.
    Stat {
        /// Also count the values of the fields.
        #[clap(short, long, takes_value = false)]
        detailed: bool,
    },

    /// Add a label to an applicant, or remove it.
    Label {
        #[clap(short, long, takes_value = false)]
        remove: bool,

        #[clap(value_parser)]
        label: String,

        /// The full name of the applicant.
        #[clap(value_parser, required = true)]
        name: Vec<String>,
    },

    /// Show the ratings of a field, or rate one answer: `rate programming expert 1.0`.
    Rate {
        #[clap(value_parser)]
        field: Option<String>,

        /// The answer followed by its rating.
        #[clap(value_parser, allow_hyphen_values = true)]
        answer: Vec<String>,
    },

    /// Label the highlanders of the ranking INVITE and the next applicants SHORTLIST.
    Autolabel {
        /// (number) How many applicants to shortlist after the highlanders.
        #[clap(value_parser)]
        shortlist: usize,
    },
}
