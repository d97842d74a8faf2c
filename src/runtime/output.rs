//! Console output sinks.
//!
//! The interpreter never writes to stdout directly; `console.*` hands formatted text to an
//! [`OutputSink`]. The harness captures into an [`OutputBuffer`], `exemplar eval` streams to
//! [`StdoutSink`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::syntax::Span;

/// Upper bound on captured lines; a snippet printing in a tight loop stops being recorded here.
pub const MAX_CAPTURED_LINES: usize = 100_000;

// Output sink for `console.log` and friends, injectable so runs stay testable.
pub trait OutputSink {
    fn emit(&mut self, text: &str, span: Option<&Span>);
}


/// OutputBuffer: collects emitted text as lines, one entry per `\n`-separated line.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    lines: Vec<String>,
    truncated: bool,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

impl OutputSink for OutputBuffer {
    fn emit(&mut self, text: &str, _span: Option<&Span>) {
        for line in text.split('\n') {
            if self.lines.len() >= MAX_CAPTURED_LINES {
                self.truncated = true;
                return;
            }
            self.lines.push(line.to_string());
        }
    }
}

/// A buffer the interpreter writes into while the caller keeps a handle to read it back.
/// The handle is `Send`, so the harness can read what a worker printed even after it has
/// stopped waiting for that worker.
#[derive(Clone, Default)]
pub struct SharedOutput(Arc<Mutex<OutputBuffer>>);

impl SharedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    fn buffer(&self) -> MutexGuard<'_, OutputBuffer> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lines(&self) -> Vec<String> {
        self.buffer().lines().to_vec()
    }

    pub fn is_truncated(&self) -> bool {
        self.buffer().is_truncated()
    }
}

impl OutputSink for SharedOutput {
    fn emit(&mut self, text: &str, span: Option<&Span>) {
        self.buffer().emit(text, span);
    }
}

/// StdoutSink: writes output to stdout for `exemplar eval`.
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn emit(&mut self, text: &str, _span: Option<&Span>) {
        println!("{}", text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_line_text_becomes_several_lines() {
        let mut buffer = OutputBuffer::new();
        buffer.emit("a\nb", None);
        buffer.emit("", None);
        assert_eq!(buffer.lines(), ["a", "b", ""]);
    }

    #[test]
    fn capture_stops_at_the_line_limit() {
        let mut buffer = OutputBuffer::new();
        for _ in 0..MAX_CAPTURED_LINES {
            buffer.emit("x", None);
        }
        assert!(!buffer.is_truncated());
        buffer.emit("one too many", None);
        assert!(buffer.is_truncated());
        assert_eq!(buffer.lines().len(), MAX_CAPTURED_LINES);
    }

    #[test]
    fn shared_output_is_visible_through_clones() {
        let shared = SharedOutput::new();
        let mut writer = shared.clone();
        writer.emit("hello", None);
        assert_eq!(shared.lines(), vec!["hello".to_string()]);
        assert!(!shared.is_truncated());
    }

    #[test]
    fn shared_output_can_be_read_from_another_thread() {
        let shared = SharedOutput::new();
        let mut writer = shared.clone();
        std::thread::spawn(move || writer.emit("from worker", None))
            .join()
            .unwrap();
        assert_eq!(shared.lines(), vec!["from worker".to_string()]);
    }
}
