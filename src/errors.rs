//! Exemplar Error Handling - Unified Encapsulated API
//!
//! Every fatal condition (malformed suite files, registry misuse, snippet syntax errors)
//! is an [`ExemplarError`]. Contexts that know their source text implement
//! [`ErrorReporting`] and build errors through it, so spans and diagnostic codes are
//! always filled in the same way.

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceSpan};
use std::fmt;
use std::sync::Arc;

use crate::syntax::Span;

// ============================================================================
// SOURCE CONTEXT - Error reporting infrastructure
// ============================================================================

/// Source text an error points into, either a real file or a labelled fallback.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub name: String,
    pub content: String,
}

impl SourceContext {
    /// Create a source context from real file content
    pub fn from_file(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Create a fallback when real source is unavailable
    pub fn fallback(context: &str) -> Self {
        Self {
            name: "fallback".to_string(),
            content: format!("// {}", context),
        }
    }

    /// Convert to NamedSource for use with miette error reporting
    pub fn to_named_source(&self) -> Arc<NamedSource<String>> {
        Arc::new(NamedSource::new(self.name.clone(), self.content.clone()))
    }

    /// Byte span of the 1-based `line`, used by loaders that track lines instead of offsets.
    pub fn line_span(&self, line: usize) -> SourceSpan {
        let mut start = 0;
        for (index, text) in self.content.split_inclusive('\n').enumerate() {
            if index + 1 == line {
                let len = text.trim_end_matches(['\n', '\r']).len();
                return SourceSpan::from(start..start + len);
            }
            start += text.len();
        }
        unspanned()
    }
}

impl Default for SourceContext {
    fn default() -> Self {
        Self::fallback("default context")
    }
}

/// The single error type: what went wrong, where, and how to help.
#[derive(Debug)]
pub struct ExemplarError {
    pub kind: ErrorKind,
    pub source_info: SourceInfo,
    pub diagnostic_info: DiagnosticInfo,
}

/// All error types as a clean enum
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    // Snippet syntax errors
    UnexpectedToken {
        expected: String,
        found: String,
    },
    InvalidLiteral {
        literal_type: String,
        value: String,
    },
    MalformedConstruct {
        construct: String,
    },
    UnsupportedSyntax {
        feature: String,
    },

    // Registry errors
    DuplicateIdentifier {
        id: String,
        original: Option<String>,
    },
    NotFound {
        id: String,
    },

    // Suite definition errors
    InvalidDefinition {
        message: String,
    },
    Format {
        format: String,
        message: String,
    },
    Io {
        path: String,
        message: String,
    },

    // Snippet runtime errors
    Uncaught {
        message: String,
    },
}

/// Context-specific source information
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub source: Arc<NamedSource<String>>,
    pub primary_span: SourceSpan,
    pub phase: String,
}

/// Diagnostic enhancement data
#[derive(Debug, Clone)]
pub struct DiagnosticInfo {
    pub help: Option<String>,
    pub error_code: String,
}

/// Context-aware error creation - each context knows how to create appropriate errors
pub trait ErrorReporting {
    /// Create an error with context-appropriate enhancements
    fn report(&self, kind: ErrorKind, span: SourceSpan) -> ExemplarError;

    fn unexpected_token(&self, expected: &str, found: &str, span: SourceSpan) -> ExemplarError {
        self.report(
            ErrorKind::UnexpectedToken {
                expected: expected.into(),
                found: found.into(),
            },
            span,
        )
    }

    fn invalid_literal(&self, literal_type: &str, value: &str, span: SourceSpan) -> ExemplarError {
        self.report(
            ErrorKind::InvalidLiteral {
                literal_type: literal_type.into(),
                value: value.into(),
            },
            span,
        )
    }

    fn malformed(&self, construct: &str, span: SourceSpan) -> ExemplarError {
        self.report(
            ErrorKind::MalformedConstruct {
                construct: format!("malformed {}", construct),
            },
            span,
        )
    }

    fn invalid_definition(&self, message: impl Into<String>, span: SourceSpan) -> ExemplarError {
        self.report(
            ErrorKind::InvalidDefinition {
                message: message.into(),
            },
            span,
        )
    }
}

impl ErrorKind {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnexpectedToken { .. }
            | Self::InvalidLiteral { .. }
            | Self::MalformedConstruct { .. }
            | Self::UnsupportedSyntax { .. } => ErrorCategory::Syntax,

            Self::DuplicateIdentifier { .. } | Self::NotFound { .. } => ErrorCategory::Registry,

            Self::InvalidDefinition { .. } | Self::Format { .. } | Self::Io { .. } => {
                ErrorCategory::Configuration
            }

            Self::Uncaught { .. } => ErrorCategory::Runtime,
        }
    }

    /// Get error code suffix for diagnostic codes
    pub const fn code_suffix(&self) -> &'static str {
        match self {
            Self::UnexpectedToken { .. } => "unexpected_token",
            Self::InvalidLiteral { .. } => "invalid_literal",
            Self::MalformedConstruct { .. } => "malformed_construct",
            Self::UnsupportedSyntax { .. } => "unsupported_syntax",
            Self::DuplicateIdentifier { .. } => "duplicate_identifier",
            Self::NotFound { .. } => "not_found",
            Self::InvalidDefinition { .. } => "invalid_definition",
            Self::Format { .. } => "format",
            Self::Io { .. } => "io",
            Self::Uncaught { .. } => "uncaught",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Syntax,
    Registry,
    Configuration,
    Runtime,
}

impl std::error::Error for ExemplarError {}

impl fmt::Display for ExemplarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::UnexpectedToken { expected, found } => {
                write!(f, "SyntaxError: expected {}, found {}", expected, found)
            }
            ErrorKind::InvalidLiteral {
                literal_type,
                value,
            } => write!(f, "SyntaxError: invalid {} '{}'", literal_type, value),
            ErrorKind::MalformedConstruct { construct } => {
                write!(f, "SyntaxError: {}", construct)
            }
            ErrorKind::UnsupportedSyntax { feature } => {
                write!(f, "SyntaxError: {} is not supported", feature)
            }
            ErrorKind::DuplicateIdentifier { id, original } => match original {
                Some(original) => write!(
                    f,
                    "duplicate example identifier '{}' (first defined at {})",
                    id, original
                ),
                None => write!(f, "duplicate example identifier '{}'", id),
            },
            ErrorKind::NotFound { id } => write!(f, "no example named '{}'", id),
            ErrorKind::InvalidDefinition { message } => {
                write!(f, "invalid example definition: {}", message)
            }
            ErrorKind::Format { format, message } => {
                write!(f, "malformed {} suite: {}", format, message)
            }
            ErrorKind::Io { path, message } => write!(f, "cannot read '{}': {}", path, message),
            ErrorKind::Uncaught { message } => write!(f, "{}", message),
        }
    }
}

impl Diagnostic for ExemplarError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(&self.diagnostic_info.error_code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.diagnostic_info
            .help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let labels = vec![LabeledSpan::new_with_span(
            Some(self.primary_label()),
            self.source_info.primary_span,
        )];
        Some(Box::new(labels.into_iter()))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&*self.source_info.source)
    }
}

impl ExemplarError {
    /// Attaches a help message.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.diagnostic_info.help = Some(help.into());
        self
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    fn primary_label(&self) -> String {
        match &self.kind {
            ErrorKind::UnexpectedToken { .. } => "unexpected token".into(),
            ErrorKind::InvalidLiteral { .. } => "invalid literal".into(),
            ErrorKind::MalformedConstruct { .. } => "malformed syntax".into(),
            ErrorKind::UnsupportedSyntax { .. } => "not supported".into(),
            ErrorKind::DuplicateIdentifier { .. } => "defined again here".into(),
            ErrorKind::NotFound { .. } => "unknown example".into(),
            ErrorKind::InvalidDefinition { .. } => "invalid definition".into(),
            ErrorKind::Format { .. } => "malformed here".into(),
            ErrorKind::Io { .. } => "unreadable".into(),
            ErrorKind::Uncaught { .. } => "thrown here".into(),
        }
    }
}

/// Creates a placeholder span for errors not tied to a specific source location.
pub fn unspanned() -> SourceSpan {
    SourceSpan::from(0..0)
}

/// Converts a snippet AST span to a miette span.
pub fn to_source_span(span: Span) -> SourceSpan {
    SourceSpan::from(span.start..span.end)
}

/// General-purpose error creation context used by the loaders and the registry.
pub struct ValidationContext {
    pub source: SourceContext,
    pub phase: String,
}

impl ValidationContext {
    pub fn new(source: SourceContext, phase: impl Into<String>) -> Self {
        Self {
            source,
            phase: phase.into(),
        }
    }
}

impl ErrorReporting for ValidationContext {
    fn report(&self, kind: ErrorKind, span: SourceSpan) -> ExemplarError {
        let error_code = format!("exemplar::{}::{}", self.phase, kind.code_suffix());

        ExemplarError {
            kind,
            source_info: SourceInfo {
                source: self.source.to_named_source(),
                primary_span: span,
                phase: self.phase.clone(),
            },
            diagnostic_info: DiagnosticInfo {
                help: None,
                error_code,
            },
        }
    }
}

// ============================================================================
// ERROR FORMATTING UTILITIES
// ============================================================================

/// Renders an error with full miette diagnostics into a string.
pub fn render_diagnostic(error: &ExemplarError) -> String {
    let mut rendered = String::new();
    let handler = miette::GraphicalReportHandler::new_themed(miette::GraphicalTheme::unicode_nocolor());
    if handler.render_report(&mut rendered, error).is_err() {
        return error.to_string();
    }
    rendered
}

/// Prints an error with full miette diagnostics to stderr.
pub fn print_error(error: ExemplarError) {
    let report = miette::Report::new(error);
    eprintln!("{report:?}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_span_points_at_requested_line() {
        let source = SourceContext::from_file("doc.md", "first\nsecond line\nthird");
        let span = source.line_span(2);
        assert_eq!(span.offset(), 6);
        assert_eq!(span.len(), "second line".len());
        assert_eq!(source.line_span(9), unspanned());
    }

    #[test]
    fn codes_carry_phase_and_suffix() {
        let ctx = ValidationContext::new(SourceContext::fallback("registry"), "registry");
        let error = ctx.report(ErrorKind::NotFound { id: "sum".into() }, unspanned());
        assert_eq!(error.diagnostic_info.error_code, "exemplar::registry::not_found");
        assert_eq!(error.category(), ErrorCategory::Registry);
        assert_eq!(error.to_string(), "no example named 'sum'");
    }
}
