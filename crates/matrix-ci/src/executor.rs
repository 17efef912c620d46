//! Integration-suite execution for one matrix cell.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{info, warn};

use crate::backend::BackendKind;
use crate::error::CellError;

/// Suite exit code meaning "tests ran, some assertions failed". Anything
/// else non-zero is an infrastructure problem: collection error,
/// unreachable services, interrupted run.
const ASSERTION_FAILURE_EXIT: i32 = 1;

/// Invocation of the integration suite against one fully-provisioned cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteSpec {
    pub backend: BackendKind,
    /// Suite command (first element is the executable).
    pub command: Vec<String>,
    /// Per-cell environment contract (connection URI, cache port, ...).
    pub env: BTreeMap<String, String>,
    pub working_dir: PathBuf,
    /// Where the suite writes its coverage artifact.
    pub coverage_path: PathBuf,
    /// Timeout in seconds; 0 means unbounded.
    pub timeout_secs: u64,
}

/// Outcome of one suite run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub backend: BackendKind,
    pub passed: bool,
    pub exit_code: i32,
    pub coverage_path: PathBuf,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Run the suite with the cell environment bound.
///
/// Exit 0 is a pass and exit 1 failing assertions; both produce a
/// [`RunResult`] with the suite's own diagnostics preserved. Any other
/// exit code, spawn failure or timeout is an infrastructure error.
pub async fn run(spec: &SuiteSpec) -> Result<RunResult, CellError> {
    if spec.command.is_empty() {
        return Err(CellError::Infrastructure(
            "empty suite command".to_string(),
        ));
    }

    let start = Instant::now();
    // kill_on_drop: a timed-out suite must not keep running against
    // services the cell is about to tear down.
    let child = Command::new(&spec.command[0])
        .args(&spec.command[1..])
        .envs(&spec.env)
        .current_dir(&spec.working_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| CellError::Infrastructure(format!("failed to spawn suite: {e}")))?;

    let output = if spec.timeout_secs > 0 {
        tokio::time::timeout(
            Duration::from_secs(spec.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| {
            CellError::Infrastructure(format!("suite timed out after {}s", spec.timeout_secs))
        })?
        .map_err(|e| CellError::Infrastructure(format!("failed to collect suite output: {e}")))?
    } else {
        child
            .wait_with_output()
            .await
            .map_err(|e| CellError::Infrastructure(format!("failed to collect suite output: {e}")))?
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    let exit_code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    match exit_code {
        0 => {
            info!(backend = %spec.backend, duration_ms, "suite passed");
            Ok(RunResult {
                backend: spec.backend,
                passed: true,
                exit_code,
                coverage_path: spec.coverage_path.clone(),
                stdout,
                stderr,
                duration_ms,
            })
        }
        ASSERTION_FAILURE_EXIT => {
            warn!(backend = %spec.backend, duration_ms, "suite reported failing tests");
            Ok(RunResult {
                backend: spec.backend,
                passed: false,
                exit_code,
                coverage_path: spec.coverage_path.clone(),
                stdout,
                stderr,
                duration_ms,
            })
        }
        other => Err(CellError::Infrastructure(format!(
            "suite aborted with exit code {other}: {}",
            stderr.trim()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suite(backend: BackendKind, command: &[&str]) -> SuiteSpec {
        SuiteSpec {
            backend,
            command: command.iter().map(|s| s.to_string()).collect(),
            env: BTreeMap::new(),
            working_dir: PathBuf::from("."),
            coverage_path: PathBuf::from("coverage.xml"),
            timeout_secs: 60,
        }
    }

    #[tokio::test]
    async fn test_passing_suite() {
        let spec = suite(BackendKind::Sqlite, &["echo", "12 passed"]);

        let result = run(&spec).await.expect("run failed");
        assert!(result.passed);
        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("12 passed"));
    }

    #[tokio::test]
    async fn test_failing_assertions_produce_a_result_not_an_error() {
        let spec = suite(BackendKind::Mysql, &["sh", "-c", "echo 1 failed; exit 1"]);

        let result = run(&spec).await.expect("run failed");
        assert!(!result.passed);
        assert_eq!(result.exit_code, 1);
        assert!(result.stdout.contains("1 failed"), "diagnostics preserved");
    }

    #[tokio::test]
    async fn test_other_exit_codes_are_infrastructure_errors() {
        let spec = suite(BackendKind::Postgres, &["sh", "-c", "exit 3"]);

        let err = run(&spec).await.expect_err("should fail");
        assert!(matches!(err, CellError::Infrastructure(_)));
        assert!(err.to_string().contains("exit code 3"));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_an_infrastructure_error() {
        let spec = suite(BackendKind::Sqlite, &["/nonexistent-suite-binary"]);

        let err = run(&spec).await.expect_err("should fail");
        assert!(matches!(err, CellError::Infrastructure(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_an_infrastructure_error() {
        let mut spec = suite(BackendKind::Sqlite, &["sleep", "30"]);
        spec.timeout_secs = 1;

        let err = run(&spec).await.expect_err("should time out");
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_timed_out_suite_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("wrote-after-timeout");
        let script = format!("sleep 2; touch {}", marker.display());
        let mut spec = suite(BackendKind::Sqlite, &["sh", "-c", &script]);
        spec.timeout_secs = 1;

        let err = run(&spec).await.expect_err("should time out");
        assert!(err.to_string().contains("timed out"));

        // Give a surviving process time to reach the write; a killed one
        // never does.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!marker.exists(), "suite kept running after timeout");
    }

    #[tokio::test]
    async fn test_env_is_bound_for_the_suite() {
        let mut spec = suite(BackendKind::Sqlite, &["sh", "-c", "echo $DATABASE_URI"]);
        spec.env.insert(
            "DATABASE_URI".to_string(),
            "sqlite:///tmp/tests.db".to_string(),
        );

        let result = run(&spec).await.expect("run failed");
        assert!(result.stdout.contains("sqlite:///tmp/tests.db"));
    }
}
