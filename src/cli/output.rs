//! Handles all user-facing output for the CLI.
//!
//! This module is responsible for colorizing output, printing reports as text or JSON and
//! listing examples and builtins. Everything goes to stdout; logs and fatal errors go to
//! stderr.

use std::io::{self, Write};

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::builtins::{BuiltinKind, BuiltinRegistry};
use crate::cli::args::OutputFormat;
use crate::harness::{Registry, Report};

// ============================================================================
// CORE OUTPUT FUNCTIONS: User-facing CLI output utilities
// ============================================================================

/// Colors only when stdout is a terminal and the user did not opt out.
pub fn color_choice(no_color: bool) -> ColorChoice {
    if no_color || !atty::is(atty::Stream::Stdout) {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    }
}

/// Prints a report in the requested format.
pub fn print_report(report: &Report, format: OutputFormat, color: ColorChoice) -> io::Result<()> {
    let mut stdout = StandardStream::stdout(color);
    match format {
        OutputFormat::Text => report.render_text(&mut stdout),
        OutputFormat::Json => {
            let json = report.to_json().map_err(io::Error::from)?;
            writeln!(stdout, "{}", json)
        }
    }
}

/// Prints one line per example: identifier, then where it is defined.
pub fn print_examples(registry: &Registry) -> io::Result<()> {
    let mut stdout = StandardStream::stdout(color_choice(false));
    for example in registry.all() {
        stdout.set_color(ColorSpec::new().set_bold(true))?;
        write!(stdout, "{}", example.id)?;
        stdout.reset()?;
        match &example.origin {
            Some(origin) => writeln!(stdout, "\t{}", origin)?,
            None => writeln!(stdout)?,
        }
    }
    Ok(())
}

/// Prints every builtin grouped by its kind, in registration order.
pub fn print_builtins(registry: &BuiltinRegistry) -> io::Result<()> {
    let mut stdout = StandardStream::stdout(color_choice(false));
    for builtin in registry.iter() {
        let (tag, color) = match builtin.kind {
            BuiltinKind::Constructor { .. } => ("constructor", Color::Yellow),
            BuiltinKind::Function { .. } => ("function", Color::Cyan),
            BuiltinKind::Constant(_) => ("constant", Color::Magenta),
        };
        stdout.set_color(ColorSpec::new().set_fg(Some(color)))?;
        write!(stdout, "{:<12}", tag)?;
        stdout.reset()?;
        writeln!(stdout, "{}", builtin.qualified_name())?;
    }
    writeln!(stdout, "\n{} builtins", registry.len())
}

/// Pretty-prints a parsed program.
pub fn print_ast<T: std::fmt::Debug>(ast: &T) {
    println!("{:#?}", ast);
}
