//! # Exemplar
//!
//! Runs documented JavaScript teaching snippets in isolated interpreters and checks their
//! console output against what the documentation promises.
//!
//! - [`syntax`]: the pest grammar and AST for the supported language subset.
//! - [`runtime`]: the tree-walking interpreter, its event loop and promise machinery.
//! - [`builtins`]: every global a snippet can use.
//! - [`harness`]: registry, executor, comparator and report.
//! - [`suite`] and [`discovery`]: loading examples from YAML, JSON and Markdown files.
//! - [`cli`]: the `exemplar` command.

pub mod builtins;
pub mod cli;
pub mod discovery;
pub mod errors;
pub mod harness;
pub mod runtime;
pub mod suite;
pub mod syntax;

pub use crate::errors::{ErrorKind, ExemplarError};
pub use crate::harness::{
    run_suite, Example, ExecutionResult, Executor, HarnessConfig, Registry, Report,
};
pub use crate::runtime::{run_snippet, SnippetError};
