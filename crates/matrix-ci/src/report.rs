//! Best-effort per-backend coverage upload.

use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{info, warn};

use crate::executor::RunResult;

/// Language tag attached to every upload alongside the backend tag, so
/// coverage from different suites of the same repository stays separable
/// downstream.
pub const LANGUAGE_TAG: &str = "python";

/// Coverage uploader invocation template. The sink's protocol belongs to
/// the uploader binary; this crate only hands it the artifact and tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSpec {
    /// Uploader executable and fixed leading arguments.
    pub command: Vec<String>,
}

impl UploadSpec {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    /// Tag set attached to the upload for `result`: language plus backend,
    /// keeping mysql/postgres/sqlite coverage attributable per backend.
    pub fn tags(result: &RunResult) -> String {
        format!("{LANGUAGE_TAG},{}", result.backend)
    }
}

/// Upload the coverage artifact tagged with the backend identity.
///
/// Failures are logged and swallowed: reporting is best-effort and never
/// changes the cell verdict.
pub async fn report(spec: &UploadSpec, result: &RunResult) {
    if spec.command.is_empty() {
        warn!(backend = %result.backend, "no uploader configured; skipping coverage upload");
        return;
    }

    let tags = UploadSpec::tags(result);
    let status = Command::new(&spec.command[0])
        .args(&spec.command[1..])
        .arg("--file")
        .arg(&result.coverage_path)
        .arg("--flags")
        .arg(&tags)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match status {
        Ok(status) if status.success() => {
            info!(backend = %result.backend, flags = %tags, "coverage uploaded")
        }
        Ok(status) => warn!(
            backend = %result.backend,
            code = status.code(),
            "coverage upload failed"
        ),
        Err(e) => warn!(
            backend = %result.backend,
            error = %e,
            "could not run coverage uploader"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;
    use std::path::PathBuf;

    fn result(backend: BackendKind) -> RunResult {
        RunResult {
            backend,
            passed: true,
            exit_code: 0,
            coverage_path: PathBuf::from("coverage.xml"),
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 100,
        }
    }

    #[test]
    fn test_tags_carry_language_and_backend() {
        assert_eq!(UploadSpec::tags(&result(BackendKind::Mysql)), "python,mysql");
        assert_eq!(
            UploadSpec::tags(&result(BackendKind::Postgres)),
            "python,postgres"
        );
        assert_eq!(
            UploadSpec::tags(&result(BackendKind::Sqlite)),
            "python,sqlite"
        );
    }

    #[tokio::test]
    async fn test_upload_failure_is_swallowed() {
        // Nonexistent uploader: report must neither panic nor error.
        let spec = UploadSpec::new(vec!["/nonexistent-uploader".to_string()]);
        report(&spec, &result(BackendKind::Sqlite)).await;
    }

    #[tokio::test]
    async fn test_successful_upload() {
        let spec = UploadSpec::new(vec!["true".to_string()]);
        report(&spec, &result(BackendKind::Postgres)).await;
    }
}
