//! YAML and JSON suite files.
//!
//! ```yaml
//! defaults:
//!   timeout_ms: 1000
//! examples:
//!   - id: sum
//!     source: console.log(1 + 2)
//!     expected: ["3"]
//! ```
//!
//! Unknown fields are rejected. `expected` is either a list of lines or one multi-line
//! string.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{ErrorReporting, ExemplarError};
use crate::harness::{Example, Origin, SuiteDefaults};
use crate::suite::{file_context, format_error, Suite, SuiteFormat};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SuiteFile {
    #[serde(default)]
    defaults: SuiteDefaults,
    #[serde(default)]
    examples: Vec<ExampleDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExampleDef {
    id: String,
    source: String,
    #[serde(default)]
    expected: Expected,
    expect_error: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Expected {
    Lines(Vec<String>),
    Text(String),
}

impl Default for Expected {
    fn default() -> Self {
        Expected::Lines(Vec::new())
    }
}

impl Expected {
    fn into_lines(self) -> Vec<String> {
        match self {
            Expected::Lines(lines) => lines,
            Expected::Text(text) => split_output(&text),
        }
    }
}

/// Splits a block of expected output into lines; one trailing newline is ignored.
pub fn split_output(text: &str) -> Vec<String> {
    let text = text.strip_suffix('\n').unwrap_or(text);
    if text.is_empty() {
        return Vec::new();
    }
    text.split('\n').map(str::to_string).collect()
}

pub fn parse(path: &Path, content: &str, format: SuiteFormat) -> Result<Suite, ExemplarError> {
    let context = file_context(path, content);
    let file: SuiteFile = match format {
        SuiteFormat::Json => serde_json::from_str(content)
            .map_err(|error| format_error(&context, format, error.line().max(1), error.to_string()))?,
        _ => serde_yaml::from_str(content).map_err(|error| {
            let line = error.location().map_or(1, |location| location.line());
            format_error(&context, format, line, error.to_string())
        })?,
    };

    let mut examples = Vec::with_capacity(file.examples.len());
    for def in file.examples {
        let line = definition_line(content, &def.id, format);
        if def.id.trim().is_empty() {
            return Err(context.invalid_definition("example identifier is empty", context.source.line_span(line)));
        }
        if def.timeout_ms == Some(0) {
            return Err(context.invalid_definition(
                format!("example '{}' has a timeout_ms of 0", def.id),
                context.source.line_span(line),
            ));
        }

        let mut example = Example::new(def.id, def.source, def.expected.into_lines()).with_origin(Origin {
            file: path.to_path_buf(),
            line,
        });
        if let Some(expect_error) = def.expect_error {
            example = example.with_expect_error(expect_error);
        }
        if let Some(timeout_ms) = def.timeout_ms {
            example = example.with_timeout(Duration::from_millis(timeout_ms));
        }
        examples.push(example);
    }

    Ok(Suite {
        examples,
        defaults: file.defaults,
    })
}

/// 1-based line of the `id` entry for `id`, or 1 when it cannot be located.
fn definition_line(content: &str, id: &str, format: SuiteFormat) -> usize {
    let escaped = regex::escape(id);
    let pattern = match format {
        SuiteFormat::Json => format!(r#""id"\s*:\s*"{}""#, escaped),
        _ => format!(r#"(?m)^[ \t-]*id[ \t]*:[ \t]*["']?{}["']?[ \t]*(#.*)?$"#, escaped),
    };
    let Ok(regex) = regex::Regex::new(&pattern) else {
        return 1;
    };
    regex
        .find(content)
        .map_or(1, |found| content[..found.start()].matches('\n').count() + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    const YAML: &str = "\
defaults:
  timeout_ms: 1000
examples:
  - id: sum
    source: console.log(1 + 2)
    expected: [\"3\"]
  - id: tdz
    source: \"console.log(x); let x = 1;\"
    expected: []
    expect_error: ReferenceError
  - id: lines
    source: |
      console.log('a');
      console.log('b');
    expected: |
      a
      b
    timeout_ms: 50
";

    fn load(content: &str, format: SuiteFormat) -> Result<Suite, ExemplarError> {
        parse(Path::new("suite.yaml"), content, format)
    }

    #[test]
    fn yaml_suites_load_in_order() {
        let suite = load(YAML, SuiteFormat::Yaml).unwrap();
        assert_eq!(suite.defaults.timeout_ms, Some(1000));
        let ids: Vec<_> = suite.examples.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["sum", "tdz", "lines"]);

        let tdz = &suite.examples[1];
        assert_eq!(tdz.expect_error.as_deref(), Some("ReferenceError"));
        assert!(tdz.expected.is_empty());

        let lines = &suite.examples[2];
        assert_eq!(lines.expected, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(lines.timeout, Some(Duration::from_millis(50)));
    }

    #[test]
    fn origins_point_at_the_id_line() {
        let suite = load(YAML, SuiteFormat::Yaml).unwrap();
        let lines: Vec<_> = suite
            .examples
            .iter()
            .map(|e| e.origin.as_ref().map(|o| o.line))
            .collect();
        assert_eq!(lines, vec![Some(4), Some(7), Some(11)]);
    }

    #[test]
    fn json_suites_load() {
        let json = r#"{
  "examples": [
    { "id": "sum", "source": "console.log(1 + 2)", "expected": ["3"] }
  ]
}"#;
        let suite = parse(Path::new("suite.json"), json, SuiteFormat::Json).unwrap();
        assert_eq!(suite.examples.len(), 1);
        assert_eq!(suite.examples[0].origin.as_ref().map(|o| o.line), Some(3));
        assert_eq!(suite.defaults, SuiteDefaults::default());
    }

    #[test]
    fn unknown_fields_are_format_errors() {
        let error = load("examples:\n  - id: a\n    source: x\n    expect: []\n", SuiteFormat::Yaml).unwrap_err();
        assert!(matches!(error.kind, ErrorKind::Format { ref format, .. } if format == "YAML"));
        assert!(error.to_string().contains("expect"));
    }

    #[test]
    fn malformed_json_is_a_format_error() {
        let error = parse(Path::new("s.json"), "{ \"examples\": [", SuiteFormat::Json).unwrap_err();
        assert!(matches!(error.kind, ErrorKind::Format { ref format, .. } if format == "JSON"));
    }

    #[test]
    fn empty_identifiers_are_rejected() {
        let error = load("examples:\n  - id: ''\n    source: x\n", SuiteFormat::Yaml).unwrap_err();
        assert!(matches!(error.kind, ErrorKind::InvalidDefinition { .. }));
    }

    #[test]
    fn expected_text_ignores_one_trailing_newline() {
        assert_eq!(split_output("a\nb\n"), vec!["a", "b"]);
        assert_eq!(split_output("a\n\n"), vec!["a", ""]);
        assert!(split_output("").is_empty());
    }
}
