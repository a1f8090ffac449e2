//! Collaborative grading of applications.
//!
//! Several reviewers grade the motivation of applicants with -1, 0 or 1. The
//! grades are merged with a weighted formula over the applicants' attributes
//! into a single ranking. See the [manual] for the details.
//!
//! ```
//! use grading::builder::Builder;
//! use grading::formula::Formula;
//! use grading::{rank, GradeLedger, RankingOptions};
//!
//! let mut builder = Builder::new();
//! builder.add_applicant_simple("Ada Lovelace", &[("programming", "0.9")])?;
//! builder.add_applicant_simple("Charles Babbage", &[("programming", "0.7")])?;
//! let pool = builder.build()?;
//!
//! let mut ledger = GradeLedger::new();
//! ledger.set_grade("reviewer1", "Charles Babbage", 1)?;
//!
//! let formula = Formula::parse("programming + motivation*0.5", &pool.schema())?;
//! let ranking = rank(pool.iter(), &pool, &formula, &ledger, &RankingOptions::default());
//! assert_eq!(ranking[0].applicant.name, "Charles Babbage");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod config;

pub mod applicant;
pub mod builder;
pub mod disagreement;
pub mod formula;
pub mod ledger;
pub mod manual;
pub mod ranking;
pub mod stats;

pub use crate::applicant::{applicant_key, Applicant, LabelFilter, Pool, Schema};
pub use crate::config::*;
pub use crate::disagreement::DisagreementResolver;
pub use crate::ledger::GradeLedger;
pub use crate::ranking::{rank, RankedApplicant};
