//! Error taxonomy for gate evaluation and matrix-cell execution.

use thiserror::Error;

/// Failure to compute the change-set diff.
///
/// Never surfaces past the gate: [`ChangeGate`](crate::gate::ChangeGate)
/// maps it to [`GateDecision::Unknown`](crate::gate::GateDecision), which
/// the pipeline treats as "run" (fail-open).
#[derive(Debug, Error)]
pub enum GateError {
    /// git itself could not be executed.
    #[error("failed to run git: {0}")]
    GitSpawn(#[from] std::io::Error),

    /// git ran but the diff could not be computed (missing ref, shallow
    /// clone, not a repository).
    #[error("git diff failed: {0}")]
    GitDiff(String),
}

/// A failure local to one matrix cell.
///
/// Cell errors never escalate to sibling cells, and nothing here is
/// retried by the pipeline.
#[derive(Debug, Error)]
pub enum CellError {
    /// A backing service started but never accepted connections.
    #[error("service '{service}' not ready after {timeout_secs}s")]
    ProvisionTimeout { service: String, timeout_secs: u64 },

    /// A backing service could not be started at all.
    #[error("failed to start service '{service}': {reason}")]
    ServiceStart { service: String, reason: String },

    /// The background task-queue worker failed to come up.
    #[error("failed to launch worker '{name}': {reason}")]
    WorkerLaunch { name: String, reason: String },

    /// The suite ran to completion and reported failing assertions.
    #[error("test suite reported failures (exit code {exit_code})")]
    TestFailure { exit_code: i32 },

    /// The suite could not run, or aborted outside its assertion path.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}
