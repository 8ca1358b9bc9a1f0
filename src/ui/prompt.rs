//! Yes/no confirmation capability.
//!
//! Lifecycle code never reads stdin itself; it asks a `Confirm` implementation. The
//! terminal implementation prints `[y/N]` prompts on stderr; `ScriptedConfirm` replays
//! canned answers for tests and records every question asked.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{BufRead, Write};

use crate::color::{color_enabled_stderr, paint, YELLOW};

pub trait Confirm {
    /// Ask a yes/no question. `default_yes` is the answer for empty input.
    fn confirm(&self, question: &str, default_yes: bool) -> bool;
}

/// Interpret one answer line. Anything other than y/yes/n/no falls back to "no".
pub fn parse_answer(line: &str, default_yes: bool) -> bool {
    match line.trim().to_ascii_lowercase().as_str() {
        "" => default_yes,
        "y" | "yes" => true,
        _ => false,
    }
}

pub fn prompt_suffix(default_yes: bool) -> &'static str {
    if default_yes {
        "[Y/n]"
    } else {
        "[y/N]"
    }
}

/// Prompts on stderr and reads a line from stdin. When stdin is not a terminal the
/// default answer is used without reading.
#[derive(Debug, Default)]
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&self, question: &str, default_yes: bool) -> bool {
        let use_err = color_enabled_stderr();
        let prompt = format!("devbox: {question} {} ", prompt_suffix(default_yes));
        if !atty::is(atty::Stream::Stdin) {
            eprintln!(
                "{}",
                paint(
                    use_err,
                    YELLOW,
                    &format!("{prompt}(non-interactive stdin; answering {})", if default_yes { "yes" } else { "no" })
                )
            );
            return default_yes;
        }
        eprint!("{}", paint(use_err, YELLOW, &prompt));
        let _ = std::io::stderr().flush();
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => default_yes,
            Ok(_) => parse_answer(&line, default_yes),
        }
    }
}

/// Replays answer lines in order; once exhausted every question gets empty input
/// (i.e. its default).
#[derive(Debug, Default)]
pub struct ScriptedConfirm {
    answers: RefCell<VecDeque<String>>,
    asked: RefCell<Vec<String>>,
}

impl ScriptedConfirm {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedConfirm {
            answers: RefCell::new(answers.into_iter().map(Into::into).collect()),
            asked: RefCell::new(Vec::new()),
        }
    }

    /// Every question answered with empty input.
    pub fn blank() -> Self {
        Self::default()
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.borrow().clone()
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self, question: &str, default_yes: bool) -> bool {
        self.asked.borrow_mut().push(question.to_string());
        let line = self.answers.borrow_mut().pop_front().unwrap_or_default();
        parse_answer(&line, default_yes)
    }
}
