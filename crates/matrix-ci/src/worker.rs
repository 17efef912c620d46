//! Background task-queue worker lifecycle.

use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::CellError;

/// Grace period after spawn before the worker counts as observably
/// running. Not a readiness probe; only that the process did not die on
/// startup.
const SPAWN_GRACE: Duration = Duration::from_millis(250);

/// Specification of the long-lived task-queue worker for one cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub name: String,
    pub command: Vec<String>,
}

impl WorkerSpec {
    /// Worker bound to a task-queue application: bounded concurrency and
    /// fair, arrival-order scheduling rather than greedy prefetch.
    pub fn task_queue(app: &str, concurrency: u32) -> Self {
        Self {
            name: format!("worker-{app}"),
            command: vec![
                "celery".to_string(),
                "--app".to_string(),
                app.to_string(),
                "worker".to_string(),
                "-Ofair".to_string(),
                "-c".to_string(),
                concurrency.to_string(),
            ],
        }
    }

    /// Worker with an explicit command, used by tests and custom setups.
    pub fn custom(name: String, command: Vec<String>) -> Self {
        Self { name, command }
    }
}

/// A running worker process.
///
/// The worker outlives the test run and is reaped explicitly: the owning
/// cell calls [`terminate`](WorkerHandle::terminate) during teardown
/// instead of leaning on ambient process-group cleanup at job end.
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    child: Child,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kill and reap the worker.
    pub async fn terminate(mut self) {
        match self.child.start_kill() {
            Ok(()) => match self.child.wait().await {
                Ok(status) => debug!(worker = %self.name, %status, "worker terminated"),
                Err(e) => warn!(worker = %self.name, error = %e, "failed to reap worker"),
            },
            Err(e) => warn!(worker = %self.name, error = %e, "failed to kill worker"),
        }
    }
}

/// Launch the worker and verify it is observably running.
pub async fn launch(spec: &WorkerSpec) -> Result<WorkerHandle, CellError> {
    if spec.command.is_empty() {
        return Err(CellError::WorkerLaunch {
            name: spec.name.clone(),
            reason: "empty command".to_string(),
        });
    }

    let mut child = Command::new(&spec.command[0])
        .args(&spec.command[1..])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| CellError::WorkerLaunch {
            name: spec.name.clone(),
            reason: e.to_string(),
        })?;

    tokio::time::sleep(SPAWN_GRACE).await;
    match child.try_wait() {
        Ok(Some(status)) => Err(CellError::WorkerLaunch {
            name: spec.name.clone(),
            reason: format!("worker exited during startup with {status}"),
        }),
        Ok(None) => {
            info!(worker = %spec.name, "worker running");
            Ok(WorkerHandle {
                name: spec.name.clone(),
                child,
            })
        }
        Err(e) => Err(CellError::WorkerLaunch {
            name: spec.name.clone(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_queue_command_is_fair_and_bounded() {
        let spec = WorkerSpec::task_queue("app.tasks", 2);
        assert_eq!(spec.command[0], "celery");
        assert!(spec.command.contains(&"-Ofair".to_string()));
        assert!(spec.command.contains(&"2".to_string()));
        assert!(spec.command.contains(&"app.tasks".to_string()));
    }

    #[tokio::test]
    async fn test_launch_and_terminate_long_lived_worker() {
        let spec = WorkerSpec::custom(
            "sleeper".to_string(),
            vec!["sleep".to_string(), "30".to_string()],
        );

        let handle = launch(&spec).await.expect("launch failed");
        assert_eq!(handle.name(), "sleeper");
        // terminate kills and reaps; must not hang on the 30s sleep.
        handle.terminate().await;
    }

    #[tokio::test]
    async fn test_worker_dying_on_startup_is_a_launch_error() {
        let spec = WorkerSpec::custom("dies".to_string(), vec!["false".to_string()]);

        let err = launch(&spec).await.expect_err("should fail");
        assert!(matches!(err, CellError::WorkerLaunch { .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_launch_error() {
        let spec = WorkerSpec::custom(
            "ghost".to_string(),
            vec!["/nonexistent-worker-binary".to_string()],
        );

        let err = launch(&spec).await.expect_err("should fail");
        assert!(matches!(err, CellError::WorkerLaunch { .. }));
    }
}
