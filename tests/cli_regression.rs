// Regression tests for the exemplar binary: exit codes, report formats and diagnostics.
// Requires: assert_cmd, predicates crates in [dev-dependencies]

mod common;

use assert_cmd::Command;
use common::fixture;
use predicates::{prelude::PredicateBooleanExt, str::contains};

fn exemplar() -> Command {
    let mut cmd = Command::cargo_bin("exemplar").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn passing_suite_exits_zero() {
    exemplar()
        .arg("run")
        .arg(fixture("basics.yaml"))
        .arg("--no-color")
        .assert()
        .success()
        .stdout(contains("✓ sum").and(contains("Summary: 4 passed, 0 failed, 4 total")));
}

#[test]
fn failing_suite_exits_one_with_diff() {
    exemplar()
        .args(["run", "--no-color"])
        .arg(fixture("failing.yaml"))
        .assert()
        .code(1)
        .stdout(
            contains("FAILED wrong-output")
                .and(contains("-expected"))
                .and(contains("+actual"))
                .and(contains("Error: boom")),
        );
}

#[test]
fn json_report_is_machine_readable() {
    let output = exemplar()
        .args(["run", "--format", "json"])
        .arg(fixture("failing.yaml"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["total"], 2);
    assert_eq!(report["passed"], 0);
    assert_eq!(report["failed"][1]["kind"], "evaluation_error");
}

#[test]
fn filter_selects_examples() {
    exemplar()
        .args(["run", "--no-color", "--filter", "closures"])
        .arg(fixture("basics.yaml"))
        .assert()
        .success()
        .stdout(contains("1 passed, 0 failed, 1 total"));
}

#[test]
fn malformed_suite_is_fatal_with_diagnostic() {
    exemplar()
        .arg("run")
        .arg(fixture("malformed.yaml"))
        .assert()
        .code(2)
        .stderr(contains("exemplar::suite::format").and(contains("expectd")));
}

#[test]
fn list_prints_ids_and_origins() {
    exemplar()
        .arg("list")
        .arg(fixture("docs"))
        .assert()
        .success()
        .stdout(contains("class-inheritance").and(contains("classes.md:5")));
}

#[test]
fn eval_streams_console_output() {
    exemplar()
        .arg("eval")
        .arg(fixture("hello.js"))
        .assert()
        .success()
        .stdout("Hello, exemplar!\n");
}

#[test]
fn eval_reports_uncaught_errors() {
    let dir = tempfile::tempdir().unwrap();
    let script = common::write_file(dir.path(), "boom.js", "console.log('before');\nthrow new RangeError('late');\n");
    exemplar()
        .arg("eval")
        .arg(script)
        .assert()
        .code(1)
        .stdout("before\n")
        .stderr(contains("RangeError: late"));
}

#[test]
fn ast_prints_the_program() {
    exemplar()
        .arg("ast")
        .arg(fixture("hello.js"))
        .assert()
        .success()
        .stdout(contains("Program"));
}

#[test]
fn list_builtins_names_globals() {
    exemplar()
        .arg("list-builtins")
        .assert()
        .success()
        .stdout(contains("console.log").and(contains("Array.prototype.map")).and(contains("Promise.all")));
}

#[test]
fn missing_file_is_fatal() {
    exemplar()
        .args(["eval", "does-not-exist.js"])
        .assert()
        .code(2)
        .stderr(contains("does-not-exist.js"));
}
