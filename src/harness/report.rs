//! Report Emitter
//!
//! A [`Report`] is built once from the execution results and never changes afterwards: its
//! fields are private and only read through accessors. Elapsed times are not part of it, so
//! two runs over the same inputs produce the same report and the same fingerprint.

use std::io::{self, Write};

use serde::Serialize;
use sha2::{Digest, Sha256};
use termcolor::{Color, ColorSpec, WriteColor};

use crate::harness::comparator::{compare, error_matches};
use crate::harness::executor::{ErrorDetail, ExecutionResult};
use crate::harness::registry::{Origin, Registry};
use crate::runtime::output::MAX_CAPTURED_LINES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The run finished but printed something else.
    OutputMismatch,
    /// An uncaught exception or syntax error, or the wrong one when an error was expected.
    EvaluationError,
    Timeout,
    /// `expect_error` was declared but the run completed normally.
    MissingError,
}

impl FailureKind {
    pub fn label(self) -> &'static str {
        match self {
            FailureKind::OutputMismatch => "output mismatch",
            FailureKind::EvaluationError => "evaluation error",
            FailureKind::Timeout => "timeout",
            FailureKind::MissingError => "missing error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub id: String,
    pub origin: Option<Origin>,
    pub kind: FailureKind,
    pub detail: String,
    pub diff: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExampleStatus {
    pub id: String,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    total: usize,
    passed: usize,
    failed: Vec<Failure>,
    statuses: Vec<ExampleStatus>,
}

impl Report {
    /// Compares every result with its example. Results whose identifier is not registered
    /// are ignored; the order follows `results`, which the executor keeps in registration
    /// order.
    pub fn summarize(registry: &Registry, results: &[ExecutionResult]) -> Self {
        let mut failed = Vec::new();
        let mut statuses = Vec::with_capacity(results.len());

        for result in results {
            let Ok(example) = registry.get(&result.id) else {
                continue;
            };
            let comparison = compare(result, example);
            statuses.push(ExampleStatus {
                id: result.id.clone(),
                passed: comparison.matched,
            });
            if comparison.matched {
                continue;
            }

            let (kind, detail) = match (&result.error, &example.expect_error) {
                (Some(error @ ErrorDetail::Timeout { .. }), _) => (FailureKind::Timeout, error.message()),
                (Some(error), None) => (FailureKind::EvaluationError, error.message()),
                (Some(error), Some(expected)) if !error_matches(expected, &error.message()) => (
                    FailureKind::EvaluationError,
                    format!("expected {}, got {}", expected, error.message()),
                ),
                (None, Some(expected)) => (
                    FailureKind::MissingError,
                    format!("expected {} but the run completed", expected),
                ),
                _ => (FailureKind::OutputMismatch, "output differs from expectation".to_string()),
            };
            let detail = if result.truncated {
                format!("{} (console output truncated after {} lines)", detail, MAX_CAPTURED_LINES)
            } else {
                detail
            };
            failed.push(Failure {
                id: result.id.clone(),
                origin: example.origin.clone(),
                kind,
                detail,
                diff: comparison.diff,
            });
        }

        Self {
            total: statuses.len(),
            passed: statuses.len() - failed.len(),
            failed,
            statuses,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn passed(&self) -> usize {
        self.passed
    }

    pub fn failed(&self) -> &[Failure] {
        &self.failed
    }

    pub fn statuses(&self) -> &[ExampleStatus] {
        &self.statuses
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Process exit status for this report.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    /// SHA-256 of the JSON form, hex encoded.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        Sha256::digest(&json)
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn render_text(&self, out: &mut dyn WriteColor) -> io::Result<()> {
        for status in &self.statuses {
            if status.passed {
                out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
                write!(out, "✓")?;
            } else {
                out.set_color(ColorSpec::new().set_fg(Some(Color::Red)))?;
                write!(out, "✗")?;
            }
            out.reset()?;
            writeln!(out, " {}", status.id)?;
        }

        for failure in &self.failed {
            writeln!(out)?;
            out.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
            write!(out, "FAILED {}", failure.id)?;
            out.reset()?;
            match &failure.origin {
                Some(origin) => writeln!(out, " ({}) [{}]", origin, failure.kind.label())?,
                None => writeln!(out, " [{}]", failure.kind.label())?,
            }
            writeln!(out, "  {}", failure.detail)?;
            if let Some(diff) = &failure.diff {
                write_diff(out, diff)?;
            }
        }

        writeln!(out)?;
        out.set_color(ColorSpec::new().set_bold(true))?;
        write!(out, "Summary:")?;
        out.reset()?;
        writeln!(
            out,
            " {} passed, {} failed, {} total",
            self.passed,
            self.failed.len(),
            self.total
        )?;
        Ok(())
    }
}

fn write_diff(out: &mut dyn WriteColor, diff: &str) -> io::Result<()> {
    writeln!(out, "  --- expected")?;
    writeln!(out, "  +++ actual")?;
    for line in diff.lines() {
        let color = match line.chars().next() {
            Some('+') => Some(Color::Green),
            Some('-') => Some(Color::Red),
            _ => None,
        };
        out.set_color(ColorSpec::new().set_fg(color))?;
        write!(out, "  {}", line)?;
        out.reset()?;
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::registry::Example;
    use std::time::Duration;
    use termcolor::NoColor;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn result(id: &str, output: &[&str], error: Option<ErrorDetail>) -> ExecutionResult {
        ExecutionResult {
            id: id.to_string(),
            output: lines(output),
            success: error.is_none(),
            error,
            truncated: false,
            elapsed: Duration::from_millis(3),
        }
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register("sum", "console.log(1 + 2)", lines(&["3"])).unwrap();
        registry.register("bad", "throw new Error('boom')", lines(&["x"])).unwrap();
        registry
            .register_example(Example::new("tdz", "x; let x;", Vec::new()).with_expect_error("ReferenceError"))
            .unwrap();
        registry
    }

    fn results() -> Vec<ExecutionResult> {
        vec![
            result("sum", &["3"], None),
            result(
                "bad",
                &[],
                Some(ErrorDetail::EvaluationError {
                    message: "Error: boom".to_string(),
                    diagnostic: None,
                }),
            ),
            result("tdz", &[], None),
        ]
    }

    #[test]
    fn failures_are_classified() {
        let report = Report::summarize(&registry(), &results());
        assert_eq!(report.total(), 3);
        assert_eq!(report.passed(), 1);
        let kinds: Vec<_> = report.failed().iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![FailureKind::EvaluationError, FailureKind::MissingError]);
        assert_eq!(report.failed()[0].detail, "Error: boom");
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn statuses_follow_result_order() {
        let report = Report::summarize(&registry(), &results());
        let ids: Vec<_> = report.statuses().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["sum", "bad", "tdz"]);
    }

    #[test]
    fn fingerprint_ignores_elapsed_time() {
        let first = Report::summarize(&registry(), &results());
        let mut slower = results();
        for result in &mut slower {
            result.elapsed = Duration::from_secs(1);
        }
        let second = Report::summarize(&registry(), &slower);
        assert_eq!(first, second);
        assert_eq!(first.fingerprint(), second.fingerprint());
        assert_eq!(first.fingerprint().len(), 64);
    }

    #[test]
    fn text_rendering_lists_failures_and_summary() {
        let report = Report::summarize(&registry(), &results());
        let mut out = NoColor::new(Vec::new());
        report.render_text(&mut out).unwrap();
        let text = String::from_utf8(out.into_inner()).unwrap();
        assert!(text.contains("✓ sum"));
        assert!(text.contains("FAILED bad [evaluation error]"));
        assert!(text.contains("  -x"));
        assert!(text.contains("Summary: 1 passed, 2 failed, 3 total"));
    }

    #[test]
    fn json_uses_snake_case_kinds() {
        let report = Report::summarize(&registry(), &results());
        let json = report.to_json().unwrap();
        assert!(json.contains("\"kind\": \"missing_error\""));
        assert!(!json.contains("elapsed"));
    }

    #[test]
    fn truncated_output_fails_and_says_so() {
        let mut registry = Registry::new();
        registry.register("flood", "", lines(&["1"])).unwrap();
        let mut flooded = result("flood", &["1"], None);
        flooded.truncated = true;

        let report = Report::summarize(&registry, &[flooded]);
        assert_eq!(report.failed()[0].kind, FailureKind::OutputMismatch);
        assert!(report.failed()[0].detail.contains("truncated after 100000 lines"));
    }

    #[test]
    fn empty_report_succeeds() {
        let report = Report::summarize(&Registry::new(), &[]);
        assert_eq!(report.total(), 0);
        assert_eq!(report.exit_code(), 0);
    }
}
