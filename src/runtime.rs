//! Runtime module for Exemplar snippets
//!
//! The interpreter, its value model and everything a single isolated run needs: intrinsic
//! prototypes, the deterministic event loop, promise machinery, `util.inspect`-style
//! formatting and the cooperative budget the harness uses to stop runaway snippets.
//!
//! [`run_snippet`] is the one entry point the harness and the CLI use: parse, evaluate, drain
//! the event loop, and describe whatever went wrong as a [`SnippetError`].

use tracing::debug;

use crate::errors::{render_diagnostic, ErrorKind, ErrorReporting, SourceContext, ValidationContext};
use crate::syntax::{self, Span};

pub mod budget;
pub mod event_loop;
pub mod inspect;
pub mod interpreter;
pub mod number;
pub mod operators;
pub mod output;
pub mod promise;
pub mod realm;
pub mod scope;
pub mod value;

pub use budget::Budget;
pub use interpreter::{Eval, Interpreter, InterpreterOptions, Interrupt, Thrown};
pub use number::format_number;
pub use output::{OutputBuffer, OutputSink, SharedOutput, StdoutSink};
pub use value::Value;

/// Why a snippet run did not complete normally.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SnippetError {
    /// The source failed to parse.
    #[error("{message}")]
    Syntax { message: String, diagnostic: String },
    /// An exception escaped the script, a timer callback or a rejected promise.
    #[error("{message}")]
    Uncaught { message: String, diagnostic: String },
    #[error("execution timed out")]
    Timeout,
    #[error("execution cancelled")]
    Cancelled,
}

impl SnippetError {
    /// Rendered source diagnostic, when the failure points into the snippet.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            SnippetError::Syntax { diagnostic, .. } | SnippetError::Uncaught { diagnostic, .. } => {
                Some(diagnostic)
            }
            SnippetError::Timeout | SnippetError::Cancelled => None,
        }
    }
}

/// Parses and runs `source` in a fresh interpreter, writing console output to `output`.
pub fn run_snippet(
    name: &str,
    source: &str,
    output: Box<dyn OutputSink>,
    options: InterpreterOptions,
) -> Result<(), SnippetError> {
    let context = SourceContext::from_file(name, source);
    let program = syntax::parse(source, context.clone()).map_err(|error| SnippetError::Syntax {
        message: error.to_string(),
        diagnostic: render_diagnostic(&error),
    })?;

    let mut interp = Interpreter::new(source, output, options);
    match interp.run(&program) {
        Ok(()) => Ok(()),
        Err(Interrupt::Throw(thrown)) => {
            let message = describe_uncaught(&thrown);
            debug!(name, %message, "uncaught exception");
            let span = thrown.span.unwrap_or_default();
            Err(SnippetError::Uncaught {
                diagnostic: uncaught_diagnostic(&context, &message, span),
                message,
            })
        }
        Err(Interrupt::Timeout) => Err(SnippetError::Timeout),
        Err(Interrupt::Cancelled) => Err(SnippetError::Cancelled),
    }
}

/// How Node reports a thrown value: `Name: message` for errors, the inspected value otherwise.
pub fn describe_thrown(value: &Value) -> String {
    match value {
        Value::Object(obj) if value.is_error() => inspect::error_summary(obj),
        other => inspect::inspect(other),
    }
}

fn describe_uncaught(thrown: &Thrown) -> String {
    if !thrown.unhandled_rejection || thrown.value.is_error() {
        return describe_thrown(&thrown.value);
    }
    format!(
        "UnhandledPromiseRejection: This error originated either by throwing inside of an async \
         function without a catch block, or by rejecting a promise which was not handled with \
         .catch(). The promise rejected with the reason \"{}\".",
        inspect::inspect(&thrown.value)
    )
}

fn uncaught_diagnostic(context: &SourceContext, message: &str, span: Span) -> String {
    let error = ValidationContext::new(context.clone(), "runtime").report(
        ErrorKind::Uncaught {
            message: message.to_string(),
        },
        crate::errors::to_source_span(span),
    );
    render_diagnostic(&error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> (Vec<String>, Result<(), SnippetError>) {
        let output = SharedOutput::new();
        let result = run_snippet(
            "snippet.js",
            source,
            Box::new(output.clone()),
            InterpreterOptions::default(),
        );
        (output.lines(), result)
    }

    #[test]
    fn syntax_errors_carry_a_diagnostic() {
        let (lines, result) = run("let x = ;");
        assert!(lines.is_empty());
        let Err(SnippetError::Syntax { message, diagnostic }) = result else {
            panic!("expected a syntax error, got {:?}", result);
        };
        assert!(message.starts_with("SyntaxError"));
        assert!(diagnostic.contains("snippet.js"));
    }

    #[test]
    fn output_before_a_throw_is_kept() {
        let (lines, result) = run("console.log('before'); null.x; console.log('after');");
        assert_eq!(lines, vec!["before"]);
        assert_eq!(
            result.unwrap_err().to_string(),
            "TypeError: Cannot read properties of null (reading 'x')"
        );
    }

    #[test]
    fn custom_error_names_are_reported() {
        let (_, result) = run(
            "class ValidationError extends Error { constructor(m) { super(m); this.name = 'ValidationError'; } }
             throw new ValidationError('bad input');",
        );
        assert_eq!(result.unwrap_err().to_string(), "ValidationError: bad input");
    }

    #[test]
    fn thrown_primitives_are_inspected() {
        let (_, result) = run("throw 'plain'");
        assert_eq!(result.unwrap_err().to_string(), "plain");
    }

    #[test]
    fn unhandled_rejections_fail_the_run() {
        let (_, result) = run("Promise.reject(new RangeError('late'));");
        assert_eq!(result.unwrap_err().to_string(), "RangeError: late");
        let (_, result) = run("Promise.reject(42);");
        assert!(result
            .unwrap_err()
            .to_string()
            .ends_with("The promise rejected with the reason \"42\"."));
    }

    #[test]
    fn unhandled_rejection_diagnostic_points_at_the_rejecting_call() {
        let (_, result) = run("const a = 1;\nconst b = 2;\nPromise.reject(new Error('late'));");
        let error = result.unwrap_err();
        let diagnostic = error.diagnostic().unwrap_or_default();
        assert!(diagnostic.contains("snippet.js:3:1"), "{}", diagnostic);
        assert!(!diagnostic.contains("snippet.js:1:1"), "{}", diagnostic);
    }

    #[test]
    fn handled_rejections_do_not_fail() {
        let (lines, result) = run("Promise.reject(new Error('x')).catch(e => console.log(e.message));");
        assert!(result.is_ok());
        assert_eq!(lines, vec!["x"]);
    }

    #[test]
    fn uncaught_diagnostic_points_at_the_throw() {
        let (_, result) = run("const a = 1;\nthrow new Error('boom');");
        let error = result.unwrap_err();
        let diagnostic = error.diagnostic().unwrap_or_default();
        assert!(diagnostic.contains("thrown here"));
        assert!(diagnostic.contains("exemplar::runtime::uncaught"));
    }
}
