//! # Suite Loading
//!
//! Example definitions come from two kinds of files:
//!
//! - **Structured suites** (`.yaml`, `.yml`, `.json`): a `defaults:` block and a list of
//!   `examples:`, see [`structured`].
//! - **Markdown documents** (`.md`): code fences introduced by an
//!   `<!-- example: id -->` marker, see [`markdown`].
//!
//! Every loaded example records its [`Origin`] so failures and duplicate identifiers can
//! point back at the definition.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::errors::{unspanned, ErrorKind, ErrorReporting, ExemplarError, SourceContext, ValidationContext};
use crate::harness::{Example, SuiteDefaults};

pub mod markdown;
pub mod structured;

/// The examples and defaults of one file.
#[derive(Debug, Clone, Default)]
pub struct Suite {
    pub examples: Vec<Example>,
    pub defaults: SuiteDefaults,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteFormat {
    Yaml,
    Json,
    Markdown,
}

impl SuiteFormat {
    /// Picks the format from the file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "yaml" | "yml" => Some(SuiteFormat::Yaml),
            "json" => Some(SuiteFormat::Json),
            "md" | "markdown" => Some(SuiteFormat::Markdown),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SuiteFormat::Yaml => "YAML",
            SuiteFormat::Json => "JSON",
            SuiteFormat::Markdown => "Markdown",
        }
    }
}

/// Reads and parses one suite file.
pub fn load_file(path: &Path) -> Result<Suite, ExemplarError> {
    let context = ValidationContext::new(SourceContext::fallback(&path.display().to_string()), "suite");
    let Some(format) = SuiteFormat::from_path(path) else {
        return Err(context.invalid_definition(
            format!("'{}' is not a .yaml, .yml, .json or .md file", path.display()),
            unspanned(),
        ));
    };
    let content = fs::read_to_string(path).map_err(|error| {
        context.report(
            ErrorKind::Io {
                path: path.display().to_string(),
                message: error.to_string(),
            },
            unspanned(),
        )
    })?;
    let suite = parse(path, &content, format)?;
    debug!(path = %path.display(), format = format.name(), examples = suite.examples.len(), "loaded suite");
    Ok(suite)
}

/// Parses suite `content` as if it had been read from `path`.
pub fn parse(path: &Path, content: &str, format: SuiteFormat) -> Result<Suite, ExemplarError> {
    match format {
        SuiteFormat::Yaml | SuiteFormat::Json => structured::parse(path, content, format),
        SuiteFormat::Markdown => markdown::parse(path, content),
    }
}

/// Error context for a file being loaded.
pub(crate) fn file_context(path: &Path, content: &str) -> ValidationContext {
    ValidationContext::new(SourceContext::from_file(path.display().to_string(), content), "suite")
}

/// A `Format` error pointing at the 1-based `line` of the file.
pub(crate) fn format_error(
    context: &ValidationContext,
    format: SuiteFormat,
    line: usize,
    message: impl Into<String>,
) -> ExemplarError {
    let span = context.source.line_span(line);
    context.report(
        ErrorKind::Format {
            format: format.name().to_string(),
            message: message.into(),
        },
        span,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_follow_extensions() {
        assert_eq!(SuiteFormat::from_path(Path::new("a/b.yml")), Some(SuiteFormat::Yaml));
        assert_eq!(SuiteFormat::from_path(Path::new("b.JSON")), Some(SuiteFormat::Json));
        assert_eq!(SuiteFormat::from_path(Path::new("README.md")), Some(SuiteFormat::Markdown));
        assert_eq!(SuiteFormat::from_path(Path::new("main.js")), None);
        assert_eq!(SuiteFormat::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn missing_files_are_io_errors() {
        let error = load_file(Path::new("does/not/exist.yaml")).unwrap_err();
        assert!(matches!(error.kind, ErrorKind::Io { .. }));
    }
}
