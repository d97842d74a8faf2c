//! The Exemplar Command-Line Interface.
//!
//! This module is the main entry point for all CLI commands and orchestrates
//! the core library functions.
//!
//! Exit status: 0 when everything passed, 1 when an example failed (or `eval` threw),
//! 2 on a fatal configuration error such as an unreadable or malformed suite.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::builtins::BUILTINS;
use crate::cli::args::{Command, ExemplarArgs, OutputFormat};
use crate::discovery::SuiteDiscoverer;
use crate::errors::{print_error, unspanned, ErrorKind, ErrorReporting, ExemplarError, SourceContext, ValidationContext};
use crate::harness::{run_suite, HarnessConfig};
use crate::runtime::{run_snippet, Budget, InterpreterOptions, StdoutSink};
use crate::syntax;

pub mod args;
pub mod output;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

// ============================================================================
// MAIN ENTRY POINT
// ============================================================================

/// Parses the command line, runs the command and returns the process exit status.
pub fn run() -> i32 {
    let args = ExemplarArgs::parse();
    init_tracing(args.verbose);

    let result = match args.command {
        Command::Run {
            paths,
            format,
            filter,
            timeout_ms,
            seed,
            no_color,
        } => run_examples(&paths, format, filter.as_deref(), timeout_ms, seed, no_color),
        Command::List { paths } => list_examples(&paths),
        Command::Eval { file, timeout_ms } => eval_file(&file, timeout_ms),
        Command::Ast { file } => print_ast(&file),
        Command::ListBuiltins => output::print_builtins(&BUILTINS)
            .map(|_| EXIT_SUCCESS)
            .map_err(|e| io_error(Path::new("<stdout>"), e)),
    };

    match result {
        Ok(code) => code,
        Err(error) => {
            print_error(error);
            EXIT_FATAL
        }
    }
}

/// Logs go to stderr. `-v` enables info, `-vv` debug; `RUST_LOG` overrides both.
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

// ============================================================================
// COMMANDS
// ============================================================================

fn run_examples(
    paths: &[PathBuf],
    format: OutputFormat,
    filter: Option<&str>,
    timeout_ms: Option<u64>,
    seed: Option<u64>,
    no_color: bool,
) -> Result<i32, ExemplarError> {
    let mut loaded = SuiteDiscoverer::load(paths)?;

    let mut config = HarnessConfig::default();
    config.apply(&loaded.defaults);
    if let Some(timeout_ms) = timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    if let Some(seed) = seed {
        config.seed = seed;
    }
    if let Some(filter) = filter {
        loaded.registry.retain_matching(filter);
    }
    debug!(?config, examples = loaded.registry.len(), "starting run");

    let report = run_suite(&loaded.registry, &config);
    output::print_report(&report, format, output::color_choice(no_color))
        .map_err(|e| io_error(Path::new("<stdout>"), e))?;
    Ok(report.exit_code())
}

fn list_examples(paths: &[PathBuf]) -> Result<i32, ExemplarError> {
    let loaded = SuiteDiscoverer::load(paths)?;
    output::print_examples(&loaded.registry).map_err(|e| io_error(Path::new("<stdout>"), e))?;
    Ok(EXIT_SUCCESS)
}

/// Runs a script with console output streamed to stdout, on a worker thread with the
/// harness stack size.
fn eval_file(file: &Path, timeout_ms: Option<u64>) -> Result<i32, ExemplarError> {
    let source = read_file(file)?;
    let name = file.display().to_string();
    let config = HarnessConfig::default();
    let deadline = timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms));

    let worker = thread::Builder::new()
        .name("eval".to_string())
        .stack_size(config.stack_size)
        .spawn(move || {
            let options = InterpreterOptions {
                max_call_depth: config.max_call_depth,
                seed: config.seed,
                budget: Budget::new(deadline, Arc::new(AtomicBool::new(false))),
            };
            run_snippet(&name, &source, Box::new(StdoutSink), options)
        })
        .map_err(|e| io_error(file, e))?;

    let outcome = worker.join().map_err(|_| {
        ValidationContext::new(SourceContext::fallback("eval"), "runtime").report(
            ErrorKind::Uncaught {
                message: "internal error: interpreter panicked".to_string(),
            },
            unspanned(),
        )
    })?;
    match outcome {
        Ok(()) => Ok(EXIT_SUCCESS),
        Err(error) => {
            match error.diagnostic() {
                Some(diagnostic) => eprintln!("{}", diagnostic),
                None => eprintln!("{}", error),
            }
            Ok(EXIT_FAILURE)
        }
    }
}

fn print_ast(file: &Path) -> Result<i32, ExemplarError> {
    let source = read_file(file)?;
    let context = SourceContext::from_file(file.display().to_string(), source.clone());
    let program = syntax::parse(&source, context)?;
    output::print_ast(&program);
    Ok(EXIT_SUCCESS)
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn read_file(path: &Path) -> Result<String, ExemplarError> {
    fs::read_to_string(path).map_err(|e| io_error(path, e))
}

fn io_error(path: &Path, error: impl std::fmt::Display) -> ExemplarError {
    ValidationContext::new(SourceContext::fallback("cli"), "cli").report(
        ErrorKind::Io {
            path: path.display().to_string(),
            message: error.to_string(),
        },
        unspanned(),
    )
}
