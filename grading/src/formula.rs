//! Weighted linear formulas over applicant attributes.
//!
//! A formula is written as a sum of terms separated by `+`, each term being
//! `attribute * weight` or a bare `attribute` (weight 1):
//!
//! ```
//! use grading::formula::Formula;
//!
//! let f: Formula = "programming*0.3 + open_source * 0.2 + motivation".parse()?;
//! assert_eq!(f.terms().len(), 3);
//! assert_eq!(f.to_string(), "programming*0.3 + open_source*0.2 + motivation");
//! # Ok::<(), grading::FormulaError>(())
//! ```
//!
//! Formulas are data, never code: the only operations are a weighted sum, so
//! they can be validated and written back exactly.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use log::debug;
use snafu::prelude::*;

use crate::applicant::{ResolvedAttributes, Schema, Uncoercible};
use crate::config::*;

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum Weight {
    /// No weight was written: the attribute counts once.
    Default,
    Literal(f64),
}

impl Weight {
    pub fn value(self) -> f64 {
        match self {
            Weight::Default => 1.0,
            Weight::Literal(w) => w,
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Term {
    pub attribute: String,
    pub weight: Weight,
}

impl Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.weight {
            Weight::Default => write!(f, "{}", self.attribute),
            Weight::Literal(w) => write!(f, "{}*{}", self.attribute, w),
        }
    }
}

// Invariant: there is at least one term.
#[derive(PartialEq, Debug, Clone)]
pub struct Formula {
    terms: Vec<Term>,
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn parse_term(raw: &str) -> Result<Term, FormulaError> {
    let term = raw.trim();
    let parts: Vec<&str> = term.split('*').map(|p| p.trim()).collect();
    let (attribute, weight) = match parts.as_slice() {
        [attribute] => (*attribute, Weight::Default),
        [attribute, weight] => {
            let w = weight.parse::<f64>().ok().context(ParseSnafu {
                term,
                reason: format!("{:?} is not a number", weight),
            })?;
            ensure!(
                w.is_finite(),
                ParseSnafu {
                    term,
                    reason: "the weight must be finite"
                }
            );
            (*attribute, Weight::Literal(w))
        }
        _ => {
            return ParseSnafu {
                term,
                reason: "expected attribute*weight",
            }
            .fail()
        }
    };
    ensure!(
        is_identifier(attribute),
        ParseSnafu {
            term,
            reason: format!("{:?} is not an attribute name", attribute),
        }
    );
    Ok(Term {
        attribute: attribute.to_string(),
        weight,
    })
}

impl FromStr for Formula {
    type Err = FormulaError;

    /// Checks the syntax only. Use [`Formula::parse`] to also check the attributes.
    fn from_str(expression: &str) -> Result<Formula, FormulaError> {
        ensure!(!expression.trim().is_empty(), EmptyFormulaSnafu);
        let terms = expression
            .split('+')
            .map(parse_term)
            .collect::<Result<Vec<Term>, FormulaError>>()?;
        Ok(Formula { terms })
    }
}

impl Display for Formula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let terms: Vec<String> = self.terms.iter().map(|t| t.to_string()).collect();
        write!(f, "{}", terms.join(" + "))
    }
}

/// What one term brought to the score of one applicant.
#[derive(PartialEq, Debug, Clone)]
pub struct TermContribution {
    pub attribute: String,
    pub weight: f64,
    pub value: f64,
    pub contribution: f64,
    /// Percentage of this term in the sum of the absolute contributions.
    pub share: f64,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Evaluation {
    pub score: f64,
    pub terms: Vec<TermContribution>,
    pub warnings: Vec<EvaluationWarning>,
}

impl Evaluation {
    /// The summed contribution of all the terms on this attribute.
    pub fn contribution_of(&self, attribute: &str) -> f64 {
        self.terms
            .iter()
            .filter(|t| t.attribute == attribute)
            .map(|t| t.contribution)
            .sum()
    }
}

/// The range of scores a formula can produce, and how much of that range each
/// term accounts for.
#[derive(PartialEq, Debug, Clone)]
pub struct ScoreBounds {
    pub min: f64,
    pub max: f64,
    /// (term, percentage of the full range), in formula order.
    pub contributions: Vec<(String, f64)>,
}

impl Formula {
    /// Parses an expression and checks that every attribute exists in the schema.
    pub fn parse(expression: &str, schema: &Schema) -> Result<Formula, FormulaError> {
        let formula: Formula = expression.parse()?;
        formula.validate(schema)?;
        Ok(formula)
    }

    pub fn validate(&self, schema: &Schema) -> Result<(), FormulaError> {
        for t in self.terms.iter() {
            ensure!(
                schema.contains(&t.attribute),
                UnknownAttributeSnafu {
                    attribute: t.attribute.clone()
                }
            );
        }
        Ok(())
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn references(&self, attribute: &str) -> bool {
        self.terms.iter().any(|t| t.attribute == attribute)
    }

    /// Computes the score of one applicant.
    ///
    /// A missing or non-numeric attribute contributes 0 and is reported as a
    /// warning. The motivation pseudo-attribute takes the value attached to the
    /// view, and 0 if nobody graded the applicant.
    pub fn evaluate(&self, attributes: &ResolvedAttributes) -> Evaluation {
        let applicant = &attributes.applicant.name;
        let mut warnings: Vec<EvaluationWarning> = Vec::new();
        let mut values: Vec<(f64, f64)> = Vec::new();
        for t in self.terms.iter() {
            let value = if t.attribute == MOTIVATION {
                attributes.motivation().unwrap_or(0.0)
            } else {
                match attributes.numeric(&t.attribute) {
                    Some(Ok(x)) => x,
                    Some(Err(Uncoercible::NonNumeric(value))) => {
                        warnings.push(EvaluationWarning::NonNumeric {
                            applicant: applicant.clone(),
                            attribute: t.attribute.clone(),
                            value,
                        });
                        0.0
                    }
                    Some(Err(Uncoercible::MissingRating(key))) => {
                        warnings.push(EvaluationWarning::MissingRating {
                            applicant: applicant.clone(),
                            attribute: t.attribute.clone(),
                            key,
                        });
                        0.0
                    }
                    None => {
                        warnings.push(EvaluationWarning::MissingAttribute {
                            applicant: applicant.clone(),
                            attribute: t.attribute.clone(),
                        });
                        0.0
                    }
                }
            };
            values.push((t.weight.value(), value));
        }

        let total_abs: f64 = values.iter().map(|(w, v)| (w * v).abs()).sum();
        let terms: Vec<TermContribution> = self
            .terms
            .iter()
            .zip(values.iter())
            .map(|(t, (w, v))| TermContribution {
                attribute: t.attribute.clone(),
                weight: *w,
                value: *v,
                contribution: w * v,
                share: if total_abs > 0.0 {
                    (w * v).abs() / total_abs * 100.0
                } else {
                    0.0
                },
            })
            .collect();
        let score = terms.iter().map(|t| t.contribution).sum();
        Evaluation {
            score,
            terms,
            warnings,
        }
    }

    /// The theoretical range of the score, from the weights and the attribute
    /// domains only.
    pub fn score_bounds(&self, schema: &Schema) -> ScoreBounds {
        let range = |attribute: &str, weight: f64| -> (f64, f64) {
            let (lo, hi) = schema.domain(attribute).map_or((0.0, 0.0), |d| d.bounds());
            let (a, b) = (weight * lo, weight * hi);
            (a.min(b), a.max(b))
        };

        // Terms on the same attribute move together.
        let mut weights: BTreeMap<&str, f64> = BTreeMap::new();
        for t in self.terms.iter() {
            *weights.entry(t.attribute.as_str()).or_insert(0.0) += t.weight.value();
        }
        let (min, max) = weights
            .iter()
            .map(|(attribute, w)| range(attribute, *w))
            .fold((0.0, 0.0), |(lo, hi), (a, b)| (lo + a, hi + b));

        let contributions = self
            .terms
            .iter()
            .map(|t| {
                let (a, b) = range(&t.attribute, t.weight.value());
                let pc = if max > min {
                    (b - a) * 100.0 / (max - min)
                } else {
                    0.0
                };
                (t.to_string(), pc)
            })
            .collect();
        debug!("score_bounds: {} in [{}, {}]", self, min, max);
        ScoreBounds {
            min,
            max,
            contributions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use proptest::prelude::*;

    fn pool() -> crate::applicant::Pool {
        let mut b = Builder::new();
        b.add_applicant_simple(
            "Ann A",
            &[("programming", "expert"), ("open_source", "0.5"), ("born", "1990")],
        )
        .unwrap();
        b.add_applicant_simple(
            "Bob B",
            &[("programming", "novice"), ("open_source", "n/a"), ("born", "1980")],
        )
        .unwrap();
        b.rating("programming", "novice", 0.0).unwrap();
        b.rating("programming", "competent", 0.5).unwrap();
        b.rating("programming", "expert", 1.0).unwrap();
        b.build().unwrap()
    }

    #[test]
    fn parse_syntax() {
        let f: Formula = " python * 0.2+open_source*0.2 + motivation ".parse().unwrap();
        assert_eq!(
            f.terms(),
            &[
                Term {
                    attribute: "python".to_string(),
                    weight: Weight::Literal(0.2)
                },
                Term {
                    attribute: "open_source".to_string(),
                    weight: Weight::Literal(0.2)
                },
                Term {
                    attribute: "motivation".to_string(),
                    weight: Weight::Default
                },
            ]
        );
        assert_eq!(f.to_string(), "python*0.2 + open_source*0.2 + motivation");
        let f: Formula = "born*-0.01".parse().unwrap();
        assert_eq!(f.terms()[0].weight, Weight::Literal(-0.01));
    }

    #[test]
    fn parse_errors() {
        assert_eq!("".parse::<Formula>(), Err(FormulaError::EmptyFormula));
        assert_eq!("  ".parse::<Formula>(), Err(FormulaError::EmptyFormula));
        for bad in [
            "python*",
            "python +",
            "python*0.2*2",
            "python*abc",
            "0.2*python",
            "open source*1",
            "python*inf",
            "__import__('os')",
        ] {
            assert!(
                matches!(bad.parse::<Formula>(), Err(FormulaError::ParseError { .. })),
                "{}",
                bad
            );
        }
    }

    #[test]
    fn unknown_attribute() {
        let schema = pool().schema();
        assert_eq!(
            Formula::parse("python*0.2 + open_source*0.2", &schema),
            Err(FormulaError::UnknownAttribute {
                attribute: "python".to_string()
            })
        );
        assert!(Formula::parse("programming*0.2 + open_source*0.2 + motivation", &schema).is_ok());
    }

    #[test]
    fn evaluate_with_degraded_values() {
        let p = pool();
        let f = Formula::parse("programming*2 + open_source + motivation*0.5", &p.schema()).unwrap();

        let ann = p.get("Ann A").unwrap();
        let e = f.evaluate(&p.resolve(ann).with_motivation(Some(1.0)));
        assert_eq!(e.score, 2.0 + 0.5 + 0.5);
        assert!(e.warnings.is_empty());
        assert_eq!(e.contribution_of(MOTIVATION), 0.5);
        let shares: f64 = e.terms.iter().map(|t| t.share).sum();
        assert!((shares - 100.0).abs() < 1e-9);

        let bob = p.get("Bob B").unwrap();
        let e = f.evaluate(&p.resolve(bob));
        assert_eq!(e.score, 0.0);
        assert_eq!(
            e.warnings,
            vec![EvaluationWarning::NonNumeric {
                applicant: "Bob B".to_string(),
                attribute: "open_source".to_string(),
                value: "n/a".to_string()
            }]
        );
        assert!(e.terms.iter().all(|t| t.share == 0.0));
    }

    #[test]
    fn evaluate_missing_rating() {
        let mut p = pool();
        p.set_override("Bob B", "programming", AttributeValue::parse("guru"))
            .unwrap();
        let f = Formula::parse("programming", &p.schema()).unwrap();
        let bob = p.get("Bob B").unwrap();
        let e = f.evaluate(&p.resolve(bob));
        assert_eq!(e.score, 0.0);
        assert!(matches!(
            e.warnings.as_slice(),
            [EvaluationWarning::MissingRating { key, .. }] if key == "guru"
        ));
    }

    #[test]
    fn bounds_and_contributions() {
        let p = pool();
        let schema = p.schema();
        let f = Formula::parse("programming*3 + open_source*2 + motivation", &schema).unwrap();
        let b = f.score_bounds(&schema);
        // programming in [0, 1], open_source observed in [0.5, 0.5], motivation in [-1, 1]
        assert_eq!(b.min, 0.0 + 1.0 - 1.0);
        assert_eq!(b.max, 3.0 + 1.0 + 1.0);
        assert_eq!(
            b.contributions,
            vec![
                ("programming*3".to_string(), 60.0),
                ("open_source*2".to_string(), 0.0),
                ("motivation".to_string(), 40.0),
            ]
        );

        let f = Formula::parse("born*-1", &schema).unwrap();
        let b = f.score_bounds(&schema);
        assert_eq!((b.min, b.max), (-1990.0, -1980.0));
    }

    #[test]
    fn applied_is_derived() {
        let mut p = pool();
        let f = Formula::parse("programming + applied*-0.5", &p.schema()).unwrap();
        let ann = p.get("Ann A").unwrap().clone();
        // No column for it: nobody applied before.
        let e = f.evaluate(&p.resolve(&ann));
        assert_eq!(e.score, 1.0);
        assert!(e.warnings.is_empty());
        assert_eq!(f.score_bounds(&p.schema()).contributions[1].1, 0.0);

        let mut b = Builder::new();
        b.add_applicant_simple("Ann A", &[("applied", "Yes")]).unwrap();
        b.add_applicant_simple("Bob B", &[("applied", "2")]).unwrap();
        p = b.build().unwrap();
        let f = Formula::parse("applied", &p.schema()).unwrap();
        let ann = p.get("Ann A").unwrap();
        assert_eq!(f.evaluate(&p.resolve(ann)).score, 1.0);
        let bounds = f.score_bounds(&p.schema());
        assert_eq!((bounds.min, bounds.max), (0.0, 2.0));
    }

    fn arb_formula() -> impl Strategy<Value = Formula> {
        let attribute = prop::sample::select(vec!["programming", "open_source", "born", "motivation"]);
        let weight = prop_oneof![
            Just(Weight::Default),
            (-1000.0f64..1000.0).prop_map(Weight::Literal),
        ];
        proptest::collection::vec((attribute, weight), 1..6).prop_map(|terms| Formula {
            terms: terms
                .into_iter()
                .map(|(a, weight)| Term {
                    attribute: a.to_string(),
                    weight,
                })
                .collect(),
        })
    }

    proptest! {
        #[test]
        fn display_then_parse(f in arb_formula()) {
            let schema = pool().schema();
            prop_assert_eq!(Formula::parse(&f.to_string(), &schema), Ok(f));
        }

        #[test]
        fn evaluation_is_linear(f in arb_formula(), k in -10.0f64..10.0, m in -1.0f64..1.0) {
            let p = pool();
            let scaled = Formula {
                terms: f
                    .terms()
                    .iter()
                    .map(|t| Term {
                        attribute: t.attribute.clone(),
                        weight: Weight::Literal(t.weight.value() * k),
                    })
                    .collect(),
            };
            let ann = p.get("Ann A").unwrap();
            let view = p.resolve(ann).with_motivation(Some(m));
            let base = f.evaluate(&view).score;
            let s = scaled.evaluate(&view).score;
            prop_assert!((s - k * base).abs() <= 1e-6 * (1.0 + s.abs()));
        }
    }
}
