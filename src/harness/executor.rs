//! Snippet Executor
//!
//! Each example runs in a brand-new interpreter on its own worker thread. The thread
//! provides a large stack for recursive snippets and isolates panics; examples still run
//! one after another.
//!
//! Two mechanisms stop runaway snippets. The interpreter polls a deadline and a shared
//! cancellation flag every few hundred steps. The harness also waits on the worker with a
//! grace period on top of the limit and, if no answer arrives, raises the flag, records a
//! timeout and moves on without joining.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::harness::config::HarnessConfig;
use crate::harness::registry::{Example, Registry};
use crate::runtime::{run_snippet, Budget, InterpreterOptions, SharedOutput, SnippetError};

/// Extra time the harness waits past the limit before giving up on a worker.
const GRACE: Duration = Duration::from_millis(250);

/// Why a run failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum ErrorDetail {
    /// An uncaught exception, a syntax error, or an interpreter panic.
    EvaluationError {
        message: String,
        diagnostic: Option<String>,
    },
    Timeout {
        #[serde(rename = "limit_ms", serialize_with = "serialize_millis")]
        limit: Duration,
    },
}

impl ErrorDetail {
    pub fn message(&self) -> String {
        match self {
            ErrorDetail::EvaluationError { message, .. } => message.clone(),
            ErrorDetail::Timeout { limit } => {
                format!("timed out after {}ms", limit.as_millis())
            }
        }
    }
}

fn serialize_millis<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub id: String,
    /// Console lines captured before the run ended, including before a failure.
    pub output: Vec<String>,
    pub success: bool,
    pub error: Option<ErrorDetail>,
    /// The snippet printed more than `MAX_CAPTURED_LINES` lines; `output` holds only the first ones.
    pub truncated: bool,
    pub elapsed: Duration,
}

impl ExecutionResult {
    fn finished(example: &Example, output: &SharedOutput, error: Option<ErrorDetail>, elapsed: Duration) -> Self {
        Self {
            id: example.id.clone(),
            output: output.lines(),
            success: error.is_none(),
            error,
            truncated: output.is_truncated(),
            elapsed,
        }
    }
}

/// What the worker thread sends back; console output is read through the shared capture.
type WorkerReply = thread::Result<Result<(), SnippetError>>;

#[derive(Debug, Clone, Default)]
pub struct Executor {
    config: HarnessConfig,
}

impl Executor {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Runs every registered example in registration order.
    pub fn run_all(&self, registry: &Registry) -> Vec<ExecutionResult> {
        registry.all().map(|example| self.run(example)).collect()
    }

    /// Runs one example in a fresh interpreter and captures its console output.
    pub fn run(&self, example: &Example) -> ExecutionResult {
        let limit = example.timeout.unwrap_or_else(|| self.config.timeout());
        debug!(id = %example.id, limit_ms = limit.as_millis() as u64, "running example");
        let started = Instant::now();
        let cancel = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = mpsc::channel::<WorkerReply>();
        let output = SharedOutput::new();

        let worker = {
            let name = example.label();
            let source = example.source.clone();
            let cancel = cancel.clone();
            let capture = output.clone();
            let max_call_depth = self.config.max_call_depth;
            let seed = self.config.seed;
            thread::Builder::new()
                .name(format!("example:{}", example.id))
                .stack_size(self.config.stack_size)
                .spawn(move || {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(move || {
                        let options = InterpreterOptions {
                            max_call_depth,
                            seed,
                            budget: Budget::new(Some(Instant::now() + limit), cancel),
                        };
                        run_snippet(&name, &source, Box::new(capture), options)
                    }));
                    let _ = sender.send(outcome);
                })
        };
        let worker = match worker {
            Ok(worker) => worker,
            Err(error) => {
                let detail = ErrorDetail::EvaluationError {
                    message: format!("internal error: cannot start worker thread: {}", error),
                    diagnostic: None,
                };
                return ExecutionResult::finished(example, &output, Some(detail), started.elapsed());
            }
        };

        let result = match receiver.recv_timeout(limit + GRACE) {
            Ok(outcome) => {
                let _ = worker.join();
                let error = match outcome {
                    Ok(Ok(())) => None,
                    Ok(Err(SnippetError::Timeout | SnippetError::Cancelled)) => {
                        Some(ErrorDetail::Timeout { limit })
                    }
                    Ok(Err(error)) => Some(ErrorDetail::EvaluationError {
                        message: error.to_string(),
                        diagnostic: error.diagnostic().map(str::to_string),
                    }),
                    Err(payload) => Some(ErrorDetail::EvaluationError {
                        message: format!("internal error: {}", panic_message(payload.as_ref())),
                        diagnostic: None,
                    }),
                };
                ExecutionResult::finished(example, &output, error, started.elapsed())
            }
            Err(_) => {
                cancel.store(true, Ordering::Relaxed);
                warn!(id = %example.id, limit_ms = limit.as_millis() as u64, "worker did not answer in time, abandoning it");
                ExecutionResult::finished(example, &output, Some(ErrorDetail::Timeout { limit }), started.elapsed())
            }
        };

        info!(
            id = %example.id,
            success = result.success,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "example finished"
        );
        result
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "interpreter panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(id: &str, source: &str) -> Example {
        Example::new(id, source, Vec::new())
    }

    fn executor() -> Executor {
        Executor::new(HarnessConfig {
            stack_size: 64 * 1024 * 1024,
            ..HarnessConfig::default()
        })
    }

    #[test]
    fn output_is_captured() {
        let result = executor().run(&example("sum", "console.log(1 + 2)"));
        assert!(result.success);
        assert_eq!(result.output, vec!["3".to_string()]);
        assert_eq!(result.id, "sum");
    }

    #[test]
    fn throws_become_evaluation_errors() {
        let result = executor().run(&example("bad", "console.log('before'); throw new Error('boom')"));
        assert!(!result.success);
        assert_eq!(result.output, vec!["before".to_string()]);
        match result.error {
            Some(ErrorDetail::EvaluationError { message, diagnostic }) => {
                assert_eq!(message, "Error: boom");
                assert!(diagnostic.is_some());
            }
            other => panic!("unexpected detail {:?}", other),
        }
    }

    #[test]
    fn endless_loops_time_out() {
        let looping = example("spin", "while (true) {}").with_timeout(Duration::from_millis(50));
        let result = executor().run(&looping);
        assert!(matches!(result.error, Some(ErrorDetail::Timeout { limit }) if limit == Duration::from_millis(50)));

        let next = executor().run(&example("after", "console.log('still running')"));
        assert!(next.success);
    }

    #[test]
    fn abandoned_workers_keep_their_output() {
        let looping = example("spin", "console.log('started'); while (true) {}").with_timeout(Duration::from_millis(50));
        let result = executor().run(&looping);
        assert!(matches!(result.error, Some(ErrorDetail::Timeout { .. })));
        assert_eq!(result.output, vec!["started".to_string()]);
    }

    #[test]
    fn flooding_output_is_marked_truncated() {
        let flood = example("flood", "for (let i = 0; i < 100001; i++) console.log(i)").with_timeout(Duration::from_secs(30));
        let result = executor().run(&flood);
        assert!(result.success, "{:?}", result.error);
        assert!(result.truncated);
        assert_eq!(result.output.len(), crate::runtime::output::MAX_CAPTURED_LINES);
    }

    #[test]
    fn runs_are_isolated() {
        let executor = executor();
        let first = executor.run(&example("a", "var shared = 1; console.log(shared)"));
        assert!(first.success, "{:?}", first.error);
        let second = executor.run(&example("b", "console.log(typeof shared)"));
        assert_eq!(second.output, vec!["undefined".to_string()]);
    }

    #[test]
    fn panic_payloads_are_described() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
    }
}
