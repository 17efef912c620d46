//! matrix-ci - Conditional integration-test matrix runner.
//!
//! Gates on changed paths, expands a version x backend matrix, provisions
//! ephemeral services per cell, runs the suite and uploads tagged coverage.
//!
//! ```text
//! matrix-ci --repo . --base-ref origin/main --head-ref HEAD \
//!     --prefix app/ --prefix tests/ \
//!     --backend mysql --backend postgres --backend sqlite \
//!     -- pytest tests/integration
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::Level;

use matrix_ci::backend::BackendKind;
use matrix_ci::pipeline::{ExecConfig, MatrixPipeline, RunParams};
use matrix_ci::telemetry;

#[derive(Parser)]
#[command(name = "matrix-ci")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Conditional integration-test matrix across database backends", long_about = None)]
struct Cli {
    /// Repository to gate and test
    #[arg(long, default_value = ".")]
    repo: PathBuf,

    /// Base reference for the change diff
    #[arg(long, default_value = "origin/main")]
    base_ref: String,

    /// Head reference for the change diff
    #[arg(long, default_value = "HEAD")]
    head_ref: String,

    /// Path prefix whose changes warrant a run (repeatable)
    #[arg(long = "prefix", required = true)]
    prefixes: Vec<String>,

    /// Runtime version axis (repeatable)
    #[arg(long = "runtime-version", default_value = "3.9")]
    versions: Vec<String>,

    /// Backend axis (repeatable; defaults to all three)
    #[arg(long = "backend", value_enum)]
    backends: Vec<BackendKind>,

    /// Settings module selecting test-mode application configuration
    #[arg(long, default_value = "tests.integration_tests.test_settings")]
    settings_module: String,

    /// Directory for file-backed databases and coverage artifacts
    #[arg(long, default_value = ".matrix-ci")]
    data_dir: PathBuf,

    /// Task-queue application the background worker binds to
    #[arg(long, default_value = "app.tasks")]
    queue_app: String,

    /// Background worker concurrency
    #[arg(long, default_value_t = 2)]
    worker_concurrency: u32,

    /// Suite timeout in seconds (0 = unbounded)
    #[arg(long, default_value_t = 3600)]
    suite_timeout_secs: u64,

    /// Coverage uploader command, one token per flag (repeatable; omit to
    /// skip uploading)
    #[arg(long = "upload-arg")]
    upload_args: Vec<String>,

    /// Emit the run summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Test-suite command, after `--`
    #[arg(last = true, required = true)]
    suite: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    telemetry::init_tracing(cli.json, level);

    let backends = if cli.backends.is_empty() {
        BackendKind::ALL.to_vec()
    } else {
        cli.backends.clone()
    };

    let params = RunParams {
        repo_dir: cli.repo.clone(),
        base_ref: cli.base_ref.clone(),
        head_ref: cli.head_ref.clone(),
        relevant_prefixes: cli.prefixes.clone(),
        versions: cli.versions.clone(),
        backends,
    };
    let exec = ExecConfig {
        suite_command: cli.suite.clone(),
        suite_timeout_secs: cli.suite_timeout_secs,
        settings_module: cli.settings_module.clone(),
        data_dir: cli.data_dir.clone(),
        queue_app: cli.queue_app.clone(),
        worker_concurrency: cli.worker_concurrency,
        upload_command: if cli.upload_args.is_empty() {
            None
        } else {
            Some(cli.upload_args.clone())
        },
    };

    let result = MatrixPipeline::run(&params, &exec).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for report in &result.cells {
            println!(
                "{:<22} {:?} ({} ms)",
                report.cell.id(),
                report.outcome,
                report.duration_ms
            );
            if let Some(error) = &report.error {
                println!("{:<22} {error}", "");
            }
        }
        println!(
            "run {} ({} passed, {} failed): {}",
            result.run_id,
            result.passed_count(),
            result.failed_count(),
            if result.success { "success" } else { "failure" }
        );
    }

    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
