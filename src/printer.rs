//! Console summary printing for the `optics` binary (§4.14). Just an
//! abstraction over "what gets written and where" so color/output-target
//! concerns stay out of `main`.

use std::io::{self, stdout, Write};

use owo_colors::OwoColorize;

use crate::tree::{State, TestSuite};

pub struct Printer {
    out: Box<dyn Write>,
    colorize: bool,
}

impl Printer {
    pub fn new(colorize: bool) -> Self {
        Self { out: Box::new(stdout()), colorize }
    }

    fn label(&self, state: State) -> String {
        let (text, color_fn): (&str, fn(&str) -> String) = match state {
            State::CompletedPassed => ("PASS", |s| s.green().bold().to_string()),
            State::CompletedFailed => ("FAIL", |s| s.red().bold().to_string()),
            State::Error => ("ERROR", |s| s.red().bold().to_string()),
            State::Skipped => ("SKIP", |s| s.yellow().to_string()),
            State::Retrying => ("RETRY", |s| s.yellow().to_string()),
            State::Running => ("RUNNING", |s| s.to_string()),
            State::NotRun => ("NOT RUN", |s| s.dimmed().to_string()),
        };
        if self.colorize {
            color_fn(text)
        } else {
            text.to_string()
        }
    }

    /// Prints one line per test case plus a totals line, returning the
    /// count of test cases that did not pass (used for the process exit
    /// code).
    pub fn print_summary(&mut self, suite: &TestSuite) -> io::Result<usize> {
        let mut failed = 0;
        for test_case in &suite.test_cases {
            writeln!(self.out, "{:<10} {}", self.label(test_case.info.state), test_case.info.name)?;
            if !matches!(test_case.info.state, State::CompletedPassed) {
                failed += 1;
            }
        }
        writeln!(
            self.out,
            "\n{} test case(s), {} failed",
            suite.test_cases.len(),
            failed
        )?;
        Ok(failed)
    }
}
