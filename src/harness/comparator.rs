//! Comparator
//!
//! Captured output is compared line by line, exactly: no trimming, no case folding. A run
//! that ended in an error only matches when the example declares `expect_error` and the
//! error agrees with it. Truncated output never matches.

use difference::{Changeset, Difference};

use crate::harness::executor::{ErrorDetail, ExecutionResult};
use crate::harness::registry::Example;

/// The verdict for one example.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub matched: bool,
    /// Unified-style diff of expected against actual output, present when the lines differ.
    pub diff: Option<String>,
}

/// First line where two outputs disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("output differs at line {}", .index + 1)]
pub struct Mismatch {
    pub index: usize,
}

/// Checks `actual` against `expected`, reporting the first differing line.
pub fn check_lines(expected: &[String], actual: &[String]) -> Result<(), Mismatch> {
    let first_difference = expected
        .iter()
        .zip(actual)
        .position(|(e, a)| e != a)
        .or_else(|| (expected.len() != actual.len()).then(|| expected.len().min(actual.len())));
    match first_difference {
        Some(index) => Err(Mismatch { index }),
        None => Ok(()),
    }
}

pub fn compare(result: &ExecutionResult, example: &Example) -> Comparison {
    let lines = check_lines(&example.expected, &result.output);
    let diff = lines.err().map(|_| render_diff(&example.expected, &result.output));
    let error_agrees = match (&example.expect_error, &result.error) {
        (None, None) => true,
        (Some(expected), Some(ErrorDetail::EvaluationError { message, .. })) => {
            error_matches(expected, message)
        }
        _ => false,
    };
    Comparison {
        matched: diff.is_none() && error_agrees && !result.truncated,
        diff,
    }
}

/// `TypeError` accepts any `TypeError: ...`; `TypeError: boom` needs the exact message.
pub fn error_matches(expected: &str, message: &str) -> bool {
    message == expected
        || message
            .strip_prefix(expected)
            .map_or(false, |rest| rest.starts_with(": "))
}

fn render_diff(expected: &[String], actual: &[String]) -> String {
    if expected.is_empty() || actual.is_empty() {
        let removed = expected.iter().map(|line| format!("-{}\n", line));
        let added = actual.iter().map(|line| format!("+{}\n", line));
        return removed.chain(added).collect();
    }

    let expected = expected.join("\n");
    let actual = actual.join("\n");
    let changeset = Changeset::new(&expected, &actual, "\n");
    let mut out = String::new();
    for diff in &changeset.diffs {
        let (marker, text) = match diff {
            Difference::Same(text) => (' ', text),
            Difference::Add(text) => ('+', text),
            Difference::Rem(text) => ('-', text),
        };
        for line in text.split('\n') {
            out.push(marker);
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn result(output: &[&str], error: Option<ErrorDetail>) -> ExecutionResult {
        ExecutionResult {
            id: "ex".to_string(),
            output: lines(output),
            success: error.is_none(),
            error,
            truncated: false,
            elapsed: Duration::ZERO,
        }
    }

    fn thrown(message: &str) -> Option<ErrorDetail> {
        Some(ErrorDetail::EvaluationError {
            message: message.to_string(),
            diagnostic: None,
        })
    }

    #[test]
    fn identical_output_matches() {
        let example = Example::new("ex", "", lines(&["3"]));
        let comparison = compare(&result(&["3"], None), &example);
        assert!(comparison.matched);
        assert!(comparison.diff.is_none());
    }

    #[test]
    fn comparison_is_exact() {
        let example = Example::new("ex", "", lines(&["Hello"]));
        assert!(!compare(&result(&["hello"], None), &example).matched);
        assert!(!compare(&result(&["Hello "], None), &example).matched);
        assert!(!compare(&result(&["Hello", ""], None), &example).matched);
    }

    #[test]
    fn first_mismatch_is_located() {
        let error = check_lines(&lines(&["a", "b", "c"]), &lines(&["a", "x", "c"])).unwrap_err();
        assert_eq!(error.index, 1);
        assert_eq!(error.to_string(), "output differs at line 2");
        let error = check_lines(&lines(&["a"]), &lines(&["a", "b"])).unwrap_err();
        assert_eq!(error.index, 1);
    }

    #[test]
    fn diff_marks_changed_lines() {
        let example = Example::new("ex", "", lines(&["1", "2", "3"]));
        let comparison = compare(&result(&["1", "two", "3"], None), &example);
        let diff = comparison.diff.unwrap();
        assert!(diff.contains("-2\n"));
        assert!(diff.contains("+two\n"));
        assert!(diff.contains(" 1\n"));
    }

    #[test]
    fn empty_line_differs_from_no_output() {
        let example = Example::new("ex", "", lines(&[""]));
        let comparison = compare(&result(&[], None), &example);
        assert!(!comparison.matched);
        assert!(comparison.diff.is_some());
    }

    #[test]
    fn errors_fail_unless_expected() {
        let example = Example::new("ex", "", lines(&["before"]));
        assert!(!compare(&result(&["before"], thrown("Error: boom")), &example).matched);

        let expecting = example.clone().with_expect_error("Error");
        assert!(compare(&result(&["before"], thrown("Error: boom")), &expecting).matched);
        assert!(!compare(&result(&["before"], None), &expecting).matched);
        assert!(!compare(&result(&[], thrown("Error: boom")), &expecting).matched);
    }

    #[test]
    fn expected_error_names_must_match_whole() {
        assert!(error_matches("TypeError", "TypeError: x is not a function"));
        assert!(error_matches("TypeError: boom", "TypeError: boom"));
        assert!(!error_matches("Type", "TypeError: boom"));
        assert!(!error_matches("TypeError: bo", "TypeError: boom"));
    }

    #[test]
    fn timeouts_never_satisfy_an_expected_error() {
        let example = Example::new("ex", "", Vec::new()).with_expect_error("Error");
        let timed_out = result(
            &[],
            Some(ErrorDetail::Timeout {
                limit: Duration::from_millis(10),
            }),
        );
        assert!(!compare(&timed_out, &example).matched);
    }
}
