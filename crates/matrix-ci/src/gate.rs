//! Change gating: decide whether a diff warrants the integration matrix.

use std::path::Path;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::GateError;

/// Three-valued gate outcome.
///
/// `Unknown` exists so the fail-open policy is explicit: when the diff
/// cannot be computed, the mapping to "run" happens at the point of use
/// instead of being swallowed inside an error path. A false skip is worse
/// than a wasted run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    /// At least one changed path is relevant to the suite.
    Run,
    /// Every changed path lies outside all relevant prefixes.
    Skip,
    /// The diff could not be computed.
    Unknown,
}

impl GateDecision {
    /// Whether the matrix should execute. `Unknown` fails open.
    pub fn effective_run(self) -> bool {
        !matches!(self, GateDecision::Skip)
    }
}

/// Path-level change gate over version-control history.
pub struct ChangeGate;

impl ChangeGate {
    /// Decide whether the change set between `base_ref` and `head_ref`
    /// touches files under any of `prefixes`.
    ///
    /// Returns `Skip` only when the diff was computed successfully and
    /// every changed path is irrelevant. Any failure to compute the diff
    /// yields `Unknown`, never `Skip`.
    pub async fn evaluate(
        repo_dir: &Path,
        base_ref: &str,
        head_ref: &str,
        prefixes: &[String],
    ) -> GateDecision {
        match Self::changed_paths(repo_dir, base_ref, head_ref).await {
            Ok(paths) => {
                let relevant = paths.iter().filter(|p| is_relevant(p, prefixes)).count();
                debug!(
                    changed = paths.len(),
                    relevant,
                    base = %base_ref,
                    head = %head_ref,
                    "change gate evaluated"
                );
                if relevant > 0 {
                    GateDecision::Run
                } else {
                    GateDecision::Skip
                }
            }
            Err(e) => {
                warn!(error = %e, "could not compute change diff; failing open");
                GateDecision::Unknown
            }
        }
    }

    /// Changed paths between the merge base of `base_ref` and `head_ref`.
    pub async fn changed_paths(
        repo_dir: &Path,
        base_ref: &str,
        head_ref: &str,
    ) -> Result<Vec<String>, GateError> {
        let range = format!("{base_ref}...{head_ref}");
        let output = Command::new("git")
            .args(["diff", "--name-only", &range])
            .current_dir(repo_dir)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(GateError::GitDiff(stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// Whether a changed path falls under any relevant prefix.
fn is_relevant(path: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|p| path.starts_with(p.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefixes(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_relevant_path_matches_prefix() {
        let pre = prefixes(&["app/", "tests/"]);
        assert!(is_relevant("app/models/core.py", &pre));
        assert!(is_relevant("tests/integration/test_api.py", &pre));
    }

    #[test]
    fn test_irrelevant_path_outside_all_prefixes() {
        let pre = prefixes(&["app/", "tests/"]);
        assert!(!is_relevant("docs/README.md", &pre));
        assert!(!is_relevant("frontend/src/index.tsx", &pre));
    }

    #[test]
    fn test_empty_prefix_list_matches_nothing() {
        assert!(!is_relevant("app/models/core.py", &[]));
    }

    #[test]
    fn test_unknown_fails_open() {
        assert!(GateDecision::Run.effective_run());
        assert!(GateDecision::Unknown.effective_run());
        assert!(!GateDecision::Skip.effective_run());
    }

    #[tokio::test]
    async fn test_changed_paths_fails_outside_repo() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = ChangeGate::changed_paths(dir.path(), "main", "HEAD").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_evaluate_outside_repo_is_unknown_not_skip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let decision =
            ChangeGate::evaluate(dir.path(), "main", "HEAD", &prefixes(&["app/"])).await;
        assert_eq!(decision, GateDecision::Unknown);
        assert!(decision.effective_run());
    }
}
