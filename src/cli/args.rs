//! Defines the command-line arguments and subcommands for the Exemplar CLI.
//!
//! This module uses the `clap` crate with its "derive" feature to create a
//! declarative and type-safe argument parsing structure.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "exemplar",
    version,
    about = "Runs documented JavaScript examples in isolation and checks their console output."
)]
pub struct ExemplarArgs {
    /// Log more to stderr (-v for info, -vv for debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// An enumeration of all available CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run every example found under the given paths and report the results.
    Run {
        /// Suite files (.yaml, .yml, .json, .md) or directories to search.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// How to print the report.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Only run examples whose identifier contains this text.
        #[arg(long)]
        filter: Option<String>,
        /// Wall-clock limit per example, overriding suite defaults.
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,
        /// Seed for Math.random, overriding suite defaults.
        #[arg(long)]
        seed: Option<u64>,
        /// Never color the text report.
        #[arg(long)]
        no_color: bool,
    },
    /// List the examples found under the given paths without running them.
    List {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Run one script, printing its console output to stdout.
    Eval {
        /// The path to the script to run.
        #[arg(required = true)]
        file: PathBuf,
        /// Wall-clock limit for the script.
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,
    },
    /// Show the Abstract Syntax Tree (AST) for a script.
    Ast {
        /// The path to the script to parse.
        #[arg(required = true)]
        file: PathBuf,
    },
    /// List every global, static and prototype method available to snippets.
    ListBuiltins,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
