//! Markdown documents as suites.
//!
//! An example is an HTML comment marker followed by a `js` (or `javascript`) fence and an
//! optional `output` fence. Only blank lines may separate the three.
//!
//! ````markdown
//! <!-- example: closures-counter timeout=500 throws=TypeError -->
//! ```js
//! console.log(1);
//! ```
//! ```output
//! 1
//! ```
//! ````
//!
//! Attribute values containing spaces are quoted with `"` or `'`, as in
//! `throws="TypeError: x is not a function"`.
//!
//! Fences without a marker are ordinary documentation and are skipped.

use std::path::Path;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{ErrorReporting, ExemplarError, ValidationContext};
use crate::harness::{Example, Origin, SuiteDefaults};
use crate::suite::{file_context, format_error, Suite, SuiteFormat};

static MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*<!--\s*example:\s*(?P<body>.*?)\s*-->\s*$").expect("marker pattern"));

const FORMAT: SuiteFormat = SuiteFormat::Markdown;

/// Attributes of a marker after the identifier.
#[derive(Debug, Default, PartialEq, Eq)]
struct Attributes {
    timeout: Option<Duration>,
    throws: Option<String>,
}

pub fn parse(path: &Path, content: &str) -> Result<Suite, ExemplarError> {
    let context = file_context(path, content);
    let lines: Vec<&str> = content.lines().collect();
    let mut examples = Vec::new();
    let mut index = 0;

    while index < lines.len() {
        let line = lines[index];
        let marker_line = index + 1;
        index += 1;

        if fence_info(line).is_some() {
            // skip documentation fences whole, so a marker inside one is not picked up
            let (_, next) = read_fence(&context, &lines, index - 1)?;
            index = next;
            continue;
        }
        let Some(captures) = MARKER.captures(line) else {
            continue;
        };
        let body = captures.name("body").map_or("", |m| m.as_str());
        let (id, attributes) = parse_marker(&context, marker_line, body)?;

        index = skip_blank(&lines, index);
        let source = match lines.get(index).and_then(|line| fence_info(line)) {
            Some(info) if is_source_fence(info) => {
                let (body, next) = read_fence(&context, &lines, index)?;
                index = next;
                body.join("\n")
            }
            _ => {
                return Err(format_error(
                    &context,
                    FORMAT,
                    marker_line,
                    format!("example '{}' is not followed by a ```js code fence", id),
                ))
            }
        };

        let after_source = skip_blank(&lines, index);
        let mut expected = Vec::new();
        if lines.get(after_source).and_then(|line| fence_info(line)) == Some("output") {
            let (body, next) = read_fence(&context, &lines, after_source)?;
            index = next;
            expected = body;
        }

        let mut example = Example::new(id, source, expected).with_origin(Origin {
            file: path.to_path_buf(),
            line: marker_line,
        });
        if let Some(throws) = attributes.throws {
            example = example.with_expect_error(throws);
        }
        if let Some(timeout) = attributes.timeout {
            example = example.with_timeout(timeout);
        }
        examples.push(example);
    }

    Ok(Suite {
        examples,
        defaults: SuiteDefaults::default(),
    })
}

/// Splits `id key=value ...`.
fn parse_marker(
    context: &ValidationContext,
    line: usize,
    body: &str,
) -> Result<(String, Attributes), ExemplarError> {
    let words = marker_words(body).map_err(|message| format_error(context, FORMAT, line, message))?;
    let mut words = words.into_iter();
    let Some(id) = words.next().filter(|id| !id.contains('=')) else {
        return Err(context.invalid_definition("example marker has no identifier", context.source.line_span(line)));
    };

    let mut attributes = Attributes::default();
    for word in words {
        let Some((key, value)) = word.split_once('=') else {
            return Err(format_error(context, FORMAT, line, format!("expected key=value, found '{}'", word)));
        };
        match key {
            "timeout" => {
                let millis = value
                    .trim_end_matches("ms")
                    .parse::<u64>()
                    .ok()
                    .filter(|millis| *millis > 0)
                    .ok_or_else(|| {
                        format_error(context, FORMAT, line, format!("invalid timeout '{}'", value))
                    })?;
                attributes.timeout = Some(Duration::from_millis(millis));
            }
            "throws" => attributes.throws = Some(value.to_string()),
            other => {
                return Err(format_error(
                    context,
                    FORMAT,
                    line,
                    format!("unknown example attribute '{}'", other),
                ))
            }
        }
    }
    Ok((id.to_string(), attributes))
}

/// Splits a marker body on whitespace, keeping quoted stretches together without their quotes.
fn marker_words(body: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut quote = None;
    let mut started = false;
    for c in body.chars() {
        match quote {
            Some(open) if c == open => quote = None,
            Some(_) => word.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                started = true;
            }
            None if c.is_whitespace() => {
                if started {
                    words.push(std::mem::take(&mut word));
                    started = false;
                }
            }
            None => {
                word.push(c);
                started = true;
            }
        }
    }
    if let Some(open) = quote {
        return Err(format!("unterminated {} quote in example marker", open));
    }
    if started {
        words.push(word);
    }
    Ok(words)
}

/// The info string of a fence line.
fn fence_info(line: &str) -> Option<&str> {
    line.trim_start().strip_prefix("```").map(str::trim)
}

fn is_source_fence(info: &str) -> bool {
    matches!(info, "js" | "javascript")
}

/// Reads the fence opening at `start`; returns its body and the index after the closing line.
fn read_fence(context: &ValidationContext, lines: &[&str], start: usize) -> Result<(Vec<String>, usize), ExemplarError> {
    let mut body = Vec::new();
    for (offset, line) in lines[start + 1..].iter().enumerate() {
        if line.trim() == "```" {
            return Ok((body, start + offset + 2));
        }
        body.push(line.to_string());
    }
    Err(format_error(context, FORMAT, start + 1, "code fence is never closed"))
}

fn skip_blank(lines: &[&str], mut index: usize) -> usize {
    while lines.get(index).map_or(false, |line| line.trim().is_empty()) {
        index += 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn load(content: &str) -> Result<Suite, ExemplarError> {
        parse(Path::new("guide.md"), content)
    }

    const GUIDE: &str = "# Closures

Some prose.

<!-- example: counter timeout=500 -->
```js
const make = () => { let n = 0; return () => ++n; };
const next = make();
console.log(next());
console.log(next());
```

```output
1
2
```

```js
console.log('not an example');
```

<!-- example: broken throws=TypeError -->

```javascript
null.x;
```
";

    #[test]
    fn markers_introduce_examples() {
        let suite = load(GUIDE).unwrap();
        assert_eq!(suite.examples.len(), 2);

        let counter = &suite.examples[0];
        assert_eq!(counter.id, "counter");
        assert_eq!(counter.expected, vec!["1".to_string(), "2".to_string()]);
        assert_eq!(counter.timeout, Some(Duration::from_millis(500)));
        assert!(counter.source.starts_with("const make"));
        assert_eq!(counter.origin.as_ref().map(|o| o.line), Some(5));

        let broken = &suite.examples[1];
        assert_eq!(broken.expect_error.as_deref(), Some("TypeError"));
        assert!(broken.expected.is_empty());
        assert_eq!(broken.source, "null.x;");
    }

    #[test]
    fn marker_without_fence_is_a_format_error() {
        let error = load("intro\n<!-- example: lonely -->\n\njust text\n").unwrap_err();
        assert!(matches!(error.kind, ErrorKind::Format { ref format, .. } if format == "Markdown"));
        assert!(error.to_string().contains("lonely"));
        assert_eq!(error.source_info.primary_span.offset(), "intro\n".len());
    }

    #[test]
    fn unknown_attributes_are_rejected() {
        let error = load("<!-- example: a retries=3 -->\n```js\n1\n```\n").unwrap_err();
        assert!(error.to_string().contains("unknown example attribute 'retries'"));
    }

    #[test]
    fn quoted_attribute_values_keep_their_spaces() {
        let suite = load(
            "<!-- example: call throws=\"TypeError: x is not a function\" timeout='200' -->\n```js\nlet x;\nx();\n```\n",
        )
        .unwrap();
        let example = &suite.examples[0];
        assert_eq!(example.id, "call");
        assert_eq!(example.expect_error.as_deref(), Some("TypeError: x is not a function"));
        assert_eq!(example.timeout, Some(Duration::from_millis(200)));
    }

    #[test]
    fn unterminated_quotes_are_rejected() {
        let error = load("<!-- example: a throws=\"TypeError -->\n```js\n1\n```\n").unwrap_err();
        assert!(error.to_string().contains("unterminated \" quote"));
    }

    #[test]
    fn unclosed_fences_are_rejected() {
        let error = load("<!-- example: a -->\n```js\nconsole.log(1)\n").unwrap_err();
        assert!(error.to_string().contains("never closed"));
    }

    #[test]
    fn empty_output_fence_expects_nothing() {
        let suite = load("<!-- example: quiet -->\n```js\nlet a = 1;\n```\n```output\n```\n").unwrap();
        assert!(suite.examples[0].expected.is_empty());
    }

    #[test]
    fn markers_inside_fences_are_ignored() {
        let suite = load("```markdown\n<!-- example: shown -->\n```\n").unwrap();
        assert!(suite.examples.is_empty());
    }
}
