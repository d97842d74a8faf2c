//! # Exemplar Test Helpers
//!
//! Shared by the integration tests: run a snippet and collect what it printed, or build a
//! suite directory on disk.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use exemplar::runtime::{InterpreterOptions, SharedOutput};
use exemplar::{run_snippet, SnippetError};

/// Runs `source` in a fresh interpreter on a thread with a generous stack.
pub fn run(source: &str) -> (Vec<String>, Result<(), SnippetError>) {
    let source = source.to_string();
    thread::Builder::new()
        .stack_size(256 << 20)
        .spawn(move || {
            let output = SharedOutput::new();
            let result = run_snippet("snippet.js", &source, Box::new(output.clone()), InterpreterOptions::default());
            (output.lines(), result)
        })
        .expect("spawn snippet thread")
        .join()
        .expect("snippet thread panicked")
}

/// Console lines of a snippet that must complete without error.
pub fn output(source: &str) -> Vec<String> {
    let (lines, result) = run(source);
    if let Err(error) = result {
        panic!("snippet failed: {}\noutput so far: {:?}", error, lines);
    }
    lines
}

/// The uncaught error message of a snippet that must fail.
pub fn failure(source: &str) -> String {
    let (_, result) = run(source);
    match result {
        Ok(()) => panic!("snippet completed without error"),
        Err(error) => error.to_string(),
    }
}

/// Writes `content` under `dir`, creating parent directories.
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create suite directory");
    }
    fs::write(&path, content).expect("write suite file");
    path
}

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}
