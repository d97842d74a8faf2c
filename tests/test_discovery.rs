//! Suite loading and discovery against files on disk.

mod common;

use std::time::Duration;

use common::{fixture, write_file};
use exemplar::discovery::SuiteDiscoverer;
use exemplar::harness::HarnessConfig;
use exemplar::{run_suite, ErrorKind};

#[test]
fn fixture_suites_load_and_pass() {
    let loaded = SuiteDiscoverer::load(&[fixture("basics.yaml"), fixture("docs")]).unwrap();
    let ids: Vec<_> = loaded.registry.ids().collect();
    assert_eq!(
        ids,
        vec!["sum", "closures-counter", "tdz", "event-loop-order", "class-inheritance", "class-without-new"]
    );
    assert_eq!(loaded.defaults.timeout_ms, Some(1500));

    let mut config = HarnessConfig::default();
    config.apply(&loaded.defaults);
    let report = run_suite(&loaded.registry, &config);
    assert_eq!(report.passed(), 6, "{:#?}", report.failed());
}

#[test]
fn origins_name_file_and_line() {
    let loaded = SuiteDiscoverer::load(&[fixture("docs/classes.md")]).unwrap();
    let example = loaded.registry.get("class-without-new").unwrap();
    let origin = example.origin.as_ref().unwrap();
    assert!(origin.file.ends_with("classes.md"));
    assert_eq!(origin.line, 27);
    assert_eq!(example.expect_error.as_deref(), Some("TypeError"));
}

#[test]
fn directories_are_walked_in_sorted_order() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "b/second.yaml", "examples:\n  - id: two\n    source: ''\n");
    write_file(dir.path(), "a.json", r#"{ "examples": [{ "id": "one", "source": "" }] }"#);
    write_file(dir.path(), "c/readme.txt", "not a suite");
    write_file(
        dir.path(),
        "b/third.md",
        "<!-- example: three timeout=250 -->\n```javascript\nconsole.log(3)\n```\n```output\n3\n```\n",
    );

    let loaded = SuiteDiscoverer::load(&[dir.path()]).unwrap();
    assert_eq!(loaded.registry.ids().collect::<Vec<_>>(), vec!["one", "two", "three"]);
    assert_eq!(
        loaded.registry.get("three").unwrap().timeout,
        Some(Duration::from_millis(250))
    );
}

#[test]
fn malformed_suites_are_fatal_format_errors() {
    let error = SuiteDiscoverer::load(&[fixture("malformed.yaml")]).unwrap_err();
    match &error.kind {
        ErrorKind::Format { format, message } => {
            assert_eq!(format, "YAML");
            assert!(message.contains("expectd"), "{}", message);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn markdown_marker_without_code_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "guide.md", "# Guide\n\n<!-- example: orphan -->\nprose only\n");
    let error = SuiteDiscoverer::load(&[path]).unwrap_err();
    assert!(matches!(error.kind, ErrorKind::Format { .. }));
    assert!(error.to_string().contains("orphan"));
}

#[test]
fn duplicate_ids_across_files_are_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "a.yaml", "examples:\n  - id: same\n    source: ''\n");
    write_file(dir.path(), "b.md", "<!-- example: same -->\n```js\n```\n");

    let error = SuiteDiscoverer::load(&[dir.path()]).unwrap_err();
    assert!(matches!(error.kind, ErrorKind::DuplicateIdentifier { .. }));
    assert!(error.to_string().contains("a.yaml:2"));
}

#[test]
fn missing_paths_are_io_errors() {
    let error = SuiteDiscoverer::load(&[fixture("nope")]).unwrap_err();
    assert!(matches!(error.kind, ErrorKind::Io { .. }));
}
