//! matrix-ci - Conditional integration-test matrix across database backends
//!
//! Provides a CI orchestrator that:
//! - Gates expensive integration runs on a path-level change diff (fail-open)
//! - Expands a runtime-version x backend matrix into isolated cells
//! - Provisions ephemeral database and cache services per cell
//! - Sequences a task-queue worker ahead of the suite
//! - Uploads coverage tagged per backend

pub mod backend;
pub mod error;
pub mod executor;
pub mod gate;
pub mod matrix;
pub mod pipeline;
pub mod provision;
pub mod report;
pub mod telemetry;
pub mod worker;

// Re-export key types
pub use backend::{BackendKind, BackendSpec};
pub use error::{CellError, GateError};
pub use executor::{RunResult, SuiteSpec};
pub use gate::{ChangeGate, GateDecision};
pub use matrix::MatrixCell;
pub use pipeline::{
    CellOutcome, CellPlan, CellReport, ExecConfig, MatrixPipeline, PipelineResult, RunParams,
};
pub use provision::{ProvisionedServices, ReadyProbe, ServiceHandle, ServiceSpec, ServiceState};
pub use report::UploadSpec;
pub use worker::{WorkerHandle, WorkerSpec};
