//! # Example Harness
//!
//! The four pipeline stages an example goes through, strictly in this order:
//!
//! 1. **Registry** ([`registry`]): examples by identifier, in registration order.
//! 2. **Executor** ([`executor`]): one isolated interpreter per example, on a worker thread.
//! 3. **Comparator** ([`comparator`]): captured output against the expectation.
//! 4. **Report** ([`report`]): pass/fail summary, rendered as text or JSON.
//!
//! Per-example failures (exceptions, timeouts, mismatches) never stop the pipeline; they
//! end up in the report. Only configuration problems surface as [`crate::ExemplarError`].

pub mod comparator;
pub mod config;
pub mod executor;
pub mod registry;
pub mod report;

pub use comparator::{compare, Comparison};
pub use config::{HarnessConfig, SuiteDefaults};
pub use executor::{ErrorDetail, ExecutionResult, Executor};
pub use registry::{Example, Origin, Registry};
pub use report::{Failure, FailureKind, Report};

use tracing::info;

/// Runs every registered example and summarizes the outcome.
pub fn run_suite(registry: &Registry, config: &HarnessConfig) -> Report {
    let executor = Executor::new(config.clone());
    let results = executor.run_all(registry);
    let report = Report::summarize(registry, &results);
    info!(
        total = report.total(),
        passed = report.passed(),
        failed = report.failed().len(),
        "suite finished"
    );
    report
}
