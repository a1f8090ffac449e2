// The grading session: one applicant at a time, one keystroke per line.

use std::io::{BufRead, Write};

use grading::{AttributeValue, LabelFilter};
use log::debug;
use snafu::prelude::*;

use crate::grader::*;

/// What the reviewer typed.
#[derive(PartialEq, Debug, Clone)]
pub enum Keystroke {
    Grade(i64),
    Skip,
    /// Grade again the applicant graded last.
    Back,
    Override { field: String, value: String },
    Label(Vec<String>),
    Detail,
    Quit,
    Unknown(String),
}

impl Keystroke {
    pub fn parse(line: &str) -> Keystroke {
        let line = line.trim();
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((c, r)) => (c, r.trim()),
            None => (line, ""),
        };
        match (command, rest) {
            ("", _) | ("s", "") => Keystroke::Skip,
            ("+", "") => Keystroke::Grade(1),
            ("=", "") => Keystroke::Grade(0),
            ("-", "") => Keystroke::Grade(-1),
            ("b", "") => Keystroke::Back,
            ("d", "") => Keystroke::Detail,
            ("q", "") => Keystroke::Quit,
            ("o", r) => match r.split_once(char::is_whitespace) {
                Some((field, value)) => Keystroke::Override {
                    field: field.to_string(),
                    value: value.trim().to_string(),
                },
                None => Keystroke::Unknown(line.to_string()),
            },
            ("l", r) if !r.is_empty() => {
                Keystroke::Label(r.split_whitespace().map(|s| s.to_string()).collect())
            }
            (c, "") => match c.parse::<i64>() {
                Ok(x) => Keystroke::Grade(x),
                Err(_) => Keystroke::Unknown(line.to_string()),
            },
            _ => Keystroke::Unknown(line.to_string()),
        }
    }
}

/// The applicants to go through.
#[derive(PartialEq, Debug, Clone)]
pub enum Queue {
    /// Whoever the reviewer did not grade or skip yet, among the applicants
    /// matching the filter. Read again after each grade.
    Ungraded(LabelFilter),
    /// A fixed list of applicant keys.
    Fixed(Vec<String>),
}

const PROMPT: &str = "[-1 0 1 | s)kip b)ack o)verride FIELD VALUE l)abel LABEL.. d)etail q)uit] > ";
const HELP: &str = "\
 -1 0 1 (or - = +)  grade
 s or empty line    skip to the next applicant
 b                  grade again the previous applicant
 o FIELD VALUE      override a field
 l LABEL...         add labels
 d                  show all the fields
 q                  quit";

fn next_in_queue(ws: &Workspace, reviewer: &str, queue: &Queue, position: &mut usize) -> Option<String> {
    match queue {
        Queue::Ungraded(filter) => ws
            .ledger
            .ungraded_for(reviewer, ws.pool.select(filter))
            .next()
            .map(|a| a.key().to_string()),
        Queue::Fixed(keys) => {
            let k = keys.get(*position).cloned();
            *position += 1;
            k
        }
    }
}

/// Runs a session until the queue is empty, the reviewer quits or the input ends.
pub fn run_session<R: BufRead, W: Write>(
    ws: &mut Workspace,
    reviewer: &str,
    queue: Queue,
    input: &mut R,
    out: &mut W,
) -> AppResult<()> {
    let mut position = 0;
    // Set by `b`: the applicant to show before going on with the queue.
    let mut pending: Option<String> = None;
    loop {
        let from_queue = pending.is_none();
        let key = match pending.take() {
            Some(k) => k,
            None => match next_in_queue(ws, reviewer, &queue, &mut position) {
                Some(k) => k,
                None => {
                    writeln!(out, "Nothing left to grade.").context(TerminalSnafu)?;
                    return Ok(());
                }
            },
        };
        let applicant = ws.pool.get(&key)?.clone();
        write!(out, "{}", report::applicant_card(ws, &applicant, false)).context(TerminalSnafu)?;

        loop {
            write!(out, "{}", PROMPT).context(TerminalSnafu)?;
            out.flush().context(TerminalSnafu)?;
            let mut line = String::new();
            if input.read_line(&mut line).context(TerminalSnafu)? == 0 {
                writeln!(out).context(TerminalSnafu)?;
                return Ok(());
            }
            let keystroke = Keystroke::parse(&line);
            debug!("run_session: {}: {:?}", applicant.key(), keystroke);
            match keystroke {
                Keystroke::Grade(score) => match ws.ledger.set_grade(reviewer, applicant.key(), score) {
                    Ok(_) => {
                        ws.mark_modified();
                        break;
                    }
                    Err(e) => writeln!(out, "{}", e).context(TerminalSnafu)?,
                },
                Keystroke::Skip => {
                    ws.ledger.skip(reviewer, applicant.key());
                    break;
                }
                Keystroke::Back => match ws.ledger.previous(reviewer) {
                    Ok(k) => {
                        pending = Some(k.to_string());
                        // The current applicant comes back after the previous one.
                        if from_queue && matches!(queue, Queue::Fixed(_)) {
                            position -= 1;
                        }
                        break;
                    }
                    Err(e) => writeln!(out, "{}", e).context(TerminalSnafu)?,
                },
                Keystroke::Override { field, value } => {
                    match ws
                        .pool
                        .set_override(applicant.key(), &field, AttributeValue::parse(&value))
                    {
                        Ok(_) => {
                            ws.mark_modified();
                            write!(out, "{}", report::applicant_card(ws, &applicant, false))
                                .context(TerminalSnafu)?;
                        }
                        Err(e) => writeln!(out, "{}", e).context(TerminalSnafu)?,
                    }
                }
                Keystroke::Label(labels) => {
                    for l in labels.iter() {
                        if ws.pool.add_label(applicant.key(), l)? {
                            ws.mark_modified();
                        }
                    }
                    let labels: Vec<String> = ws.pool.labels(&applicant).into_iter().collect();
                    writeln!(out, "labels: {}", labels.join(" ")).context(TerminalSnafu)?;
                }
                Keystroke::Detail => {
                    write!(out, "{}", report::applicant_card(ws, &applicant, true))
                        .context(TerminalSnafu)?;
                }
                Keystroke::Quit => return Ok(()),
                Keystroke::Unknown(s) => {
                    writeln!(out, "Unknown command {:?}\n{}", s, HELP).context(TerminalSnafu)?
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grading::builder::Builder;
    use grading::Score;
    use std::io::Cursor;

    fn workspace() -> Workspace {
        let mut b = Builder::new();
        for (name, prog) in [("Ann Archer", "0.8"), ("Bob Baker", "0.5"), ("Cid Cole", "0.2")] {
            b.add_applicant_simple(name, &[("programming", prog)]).unwrap();
        }
        let mut pool = b.build().unwrap();
        pool.add_label("Cid Cole", "LATE").unwrap();
        Workspace::from_parts(
            pool,
            state::PersistedState::default(),
            std::path::Path::new("unused.json"),
        )
        .unwrap()
    }

    fn session(ws: &mut Workspace, queue: Queue, input: &str) -> String {
        let mut out: Vec<u8> = Vec::new();
        run_session(ws, "r1", queue, &mut Cursor::new(input.as_bytes()), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn keystrokes() {
        assert_eq!(Keystroke::parse("1\n"), Keystroke::Grade(1));
        assert_eq!(Keystroke::parse(" -1 "), Keystroke::Grade(-1));
        assert_eq!(Keystroke::parse("+"), Keystroke::Grade(1));
        assert_eq!(Keystroke::parse("="), Keystroke::Grade(0));
        assert_eq!(Keystroke::parse("-"), Keystroke::Grade(-1));
        assert_eq!(Keystroke::parse("5"), Keystroke::Grade(5));
        assert_eq!(Keystroke::parse("\n"), Keystroke::Skip);
        assert_eq!(Keystroke::parse("s"), Keystroke::Skip);
        assert_eq!(
            Keystroke::parse("o programming 0.9"),
            Keystroke::Override {
                field: "programming".to_string(),
                value: "0.9".to_string()
            }
        );
        assert_eq!(
            Keystroke::parse("l VIP  INVITE"),
            Keystroke::Label(vec!["VIP".to_string(), "INVITE".to_string()])
        );
        assert!(matches!(Keystroke::parse("o programming"), Keystroke::Unknown(_)));
        assert!(matches!(Keystroke::parse("x y"), Keystroke::Unknown(_)));
    }

    #[test]
    fn grade_skip_and_quit() {
        let mut ws = workspace();
        let out = session(&mut ws, Queue::Ungraded(LabelFilter::default()), "1\ns\nq\n");
        assert!(out.contains("Cid Cole"));
        assert_eq!(ws.ledger.grade("r1", "Ann Archer"), Some(Score::Positive));
        assert_eq!(ws.ledger.grade("r1", "Bob Baker"), None);
        assert!(ws.ledger.is_skipped("r1", "Bob Baker"));
        assert!(ws.is_modified());
    }

    #[test]
    fn invalid_score_repeats_the_prompt() {
        let mut ws = workspace();
        let out = session(&mut ws, Queue::Fixed(vec!["bob baker".to_string()]), "2\n0\n");
        assert!(out.contains("invalid score 2"));
        assert_eq!(ws.ledger.grade("r1", "Bob Baker"), Some(Score::Neutral));
        assert!(out.ends_with("Nothing left to grade.\n"));
    }

    #[test]
    fn back_grades_the_previous_applicant_again() {
        let mut ws = workspace();
        let out = session(
            &mut ws,
            Queue::Ungraded(LabelFilter::default()),
            "b\n1\nb\n-1\n0\n",
        );
        assert!(out.contains("nothing graded yet by r1"));
        // Ann: 1 then -1 after going back, Bob: 0.
        assert_eq!(ws.ledger.grade("r1", "Ann Archer"), Some(Score::Negative));
        assert_eq!(ws.ledger.grade("r1", "Bob Baker"), Some(Score::Neutral));
        assert_eq!(ws.ledger.grade("r1", "Cid Cole"), None);
    }

    #[test]
    fn override_and_label() {
        let mut ws = workspace();
        let out = session(
            &mut ws,
            Queue::Ungraded(LabelFilter::parse(&["LATE".to_string()])),
            "o programming 0.9\no height 2\nl VIP\n1\n",
        );
        assert!(out.contains("has no field \"height\""));
        let cid = ws.pool.get("Cid Cole").unwrap().clone();
        assert_eq!(
            ws.pool.resolve(&cid).get("programming"),
            Some(&AttributeValue::Number(0.9))
        );
        assert!(ws.pool.has_label(&cid, "VIP"));
        assert_eq!(ws.ledger.grade("r1", "Cid Cole"), Some(Score::Positive));
        assert_eq!(ws.ledger.grade("r1", "Ann Archer"), None);
    }

    #[test]
    fn end_of_input_stops() {
        let mut ws = workspace();
        session(&mut ws, Queue::Ungraded(LabelFilter::default()), "1\n");
        assert_eq!(ws.ledger.graded_by("r1").map(|g| g.len()), Some(1));
    }
}
