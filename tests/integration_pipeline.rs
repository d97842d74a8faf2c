//! End-to-end pipeline tests: register, execute, compare, report.

mod common;

use std::time::Duration;

use exemplar::harness::{FailureKind, HarnessConfig};
use exemplar::{run_suite, Example, Registry};

fn lines(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn config() -> HarnessConfig {
    HarnessConfig {
        timeout_ms: 1000,
        ..HarnessConfig::default()
    }
}

#[test]
fn passing_example_is_reported_passed() {
    let mut registry = Registry::new();
    registry.register("sum", "console.log(1 + 2)", lines(&["3"])).unwrap();

    let report = run_suite(&registry, &config());
    assert_eq!(report.total(), 1);
    assert_eq!(report.passed(), 1);
    assert!(report.failed().is_empty());
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn throwing_example_is_an_evaluation_error() {
    let mut registry = Registry::new();
    registry.register("bad", "throw new Error(\"boom\")", lines(&["x"])).unwrap();

    let report = run_suite(&registry, &config());
    assert_eq!(report.passed(), 0);
    let failure = &report.failed()[0];
    assert_eq!(failure.id, "bad");
    assert_eq!(failure.kind, FailureKind::EvaluationError);
    assert!(failure.detail.contains("boom"));
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn timeout_does_not_stop_the_next_example() {
    let mut registry = Registry::new();
    registry
        .register_example(Example::new("spin", "while (true) {}", Vec::new()).with_timeout(Duration::from_millis(100)))
        .unwrap();
    registry
        .register("after", "console.log('next')", lines(&["next"]))
        .unwrap();

    let report = run_suite(&registry, &config());
    assert_eq!(report.total(), 2);
    assert_eq!(report.passed(), 1);
    assert_eq!(report.failed()[0].id, "spin");
    assert_eq!(report.failed()[0].kind, FailureKind::Timeout);
}

#[test]
fn pending_timers_count_against_the_timeout() {
    let mut registry = Registry::new();
    registry
        .register_example(
            Example::new("ticker", "setInterval(() => {}, 10)", Vec::new()).with_timeout(Duration::from_millis(100)),
        )
        .unwrap();
    let report = run_suite(&registry, &config());
    assert_eq!(report.failed().len(), 1);
    assert_eq!(report.failed()[0].kind, FailureKind::Timeout);
}

#[test]
fn single_differing_line_fails_with_a_diff() {
    let mut registry = Registry::new();
    registry
        .register("lines", "console.log('a'); console.log('b')", lines(&["a", "c"]))
        .unwrap();

    let report = run_suite(&registry, &config());
    let failure = &report.failed()[0];
    assert_eq!(failure.kind, FailureKind::OutputMismatch);
    let diff = failure.diff.as_deref().unwrap_or_default();
    assert!(diff.contains("-c"));
    assert!(diff.contains("+b"));
}

#[test]
fn expected_errors_pass_and_missing_errors_fail() {
    let mut registry = Registry::new();
    registry
        .register_example(
            Example::new("tdz", "console.log('start'); console.log(x); let x = 1;", lines(&["start"]))
                .with_expect_error("ReferenceError"),
        )
        .unwrap();
    registry
        .register_example(Example::new("calm", "let y = 1;", Vec::new()).with_expect_error("TypeError"))
        .unwrap();

    let report = run_suite(&registry, &config());
    assert_eq!(report.passed(), 1);
    assert_eq!(report.failed()[0].id, "calm");
    assert_eq!(report.failed()[0].kind, FailureKind::MissingError);
}

#[test]
fn running_twice_yields_identical_reports() {
    let mut registry = Registry::new();
    registry
        .register("random", "console.log(Math.random())", Vec::new())
        .unwrap();
    registry
        .register("order", "setTimeout(() => console.log('t'), 0); Promise.resolve().then(() => console.log('p')); console.log('s');", lines(&["s", "p", "t"]))
        .unwrap();

    let first = run_suite(&registry, &config());
    let second = run_suite(&registry, &config());
    assert_eq!(first, second);
    assert_eq!(first.fingerprint(), second.fingerprint());
    assert_eq!(first.statuses()[1].passed, true);
}

#[test]
fn examples_do_not_share_globals() {
    let mut registry = Registry::new();
    registry
        .register("define", "var leaked = 1; Array.prototype.extra = 1; console.log(leaked)", lines(&["1"]))
        .unwrap();
    registry
        .register("observe", "console.log(typeof leaked, [].extra)", lines(&["undefined undefined"]))
        .unwrap();

    let report = run_suite(&registry, &config());
    assert_eq!(report.passed(), 2, "{:?}", report.failed());
}

#[test]
fn report_order_follows_registration() {
    let mut registry = Registry::new();
    for id in ["zeta", "alpha", "mid"] {
        registry.register(id, "", Vec::new()).unwrap();
    }
    let report = run_suite(&registry, &config());
    let ids: Vec<_> = report.statuses().iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
}
