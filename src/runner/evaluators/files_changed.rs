//! Builtin evaluator: did the agent change anything?
//!
//! The orchestrator snapshots a content manifest of the working copy
//! before the agent runs. This evaluator recomputes the manifest
//! afterwards and diffs the two, failing the run when the agent produced
//! no diff at all. It is deliberately tiny; heavier evaluators that shell
//! out to build or test tools plug in through the same registry.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::EvaluatorError;
use crate::runner::result::EvaluationResult;
use crate::workspace::WorkspaceView;

use super::{Evaluator, Precondition};

/// Manifest file name under the artifacts directory.
pub const BASELINE_MANIFEST: &str = "baseline_manifest.json";

/// Relative path -> content hash snapshot of a directory tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreeManifest {
    /// Hash per file, keyed by path relative to the tree root.
    pub files: BTreeMap<String, String>,
}

impl TreeManifest {
    /// Computes the manifest of a directory tree.
    pub fn compute(root: &Path) -> Result<Self, std::io::Error> {
        let mut files = BTreeMap::new();
        for entry in WalkDir::new(root).min_depth(1) {
            let entry = entry.map_err(std::io::Error::other)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(root)
                .expect("walkdir yields paths under its root")
                .to_string_lossy()
                .to_string();
            let content = std::fs::read(entry.path())?;
            files.insert(rel, hex::encode(Sha256::digest(&content)));
        }
        Ok(Self { files })
    }

    /// Writes the manifest as JSON.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Loads a manifest from JSON.
    pub fn load(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(std::io::Error::other)
    }

    /// Diffs `self` (baseline) against `current`.
    pub fn diff(&self, current: &Self) -> TreeDiff {
        let mut diff = TreeDiff::default();
        for (path, hash) in &current.files {
            match self.files.get(path) {
                None => diff.added.push(path.clone()),
                Some(old) if old != hash => diff.modified.push(path.clone()),
                Some(_) => {}
            }
        }
        for path in self.files.keys() {
            if !current.files.contains_key(path) {
                diff.removed.push(path.clone());
            }
        }
        diff
    }
}

/// File-level difference between two manifests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreeDiff {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
}

impl TreeDiff {
    /// Total number of changed paths.
    pub fn change_count(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }
}

/// Evaluator checking that the agent modified the working copy.
pub struct FilesChangedEvaluator;

impl FilesChangedEvaluator {
    /// Creates the evaluator.
    pub fn new() -> Self {
        Self
    }
}

impl Default for FilesChangedEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Evaluator for FilesChangedEvaluator {
    fn name(&self) -> &str {
        "files_changed"
    }

    async fn check_preconditions(&self, view: &WorkspaceView) -> Precondition {
        if view.artifacts_dir.join(BASELINE_MANIFEST).exists() {
            Precondition::Ready
        } else {
            Precondition::Skip("no baseline manifest was captured before the agent ran".into())
        }
    }

    async fn evaluate(&self, view: &WorkspaceView) -> Result<EvaluationResult, EvaluatorError> {
        // Manifest hashing walks and reads the whole tree; run it on the
        // blocking pool so the runner's timeout can preempt it.
        let baseline_path = view.artifacts_dir.join(BASELINE_MANIFEST);
        let modified_dir = view.modified_dir.clone();
        let diff = tokio::task::spawn_blocking(move || {
            let baseline = TreeManifest::load(&baseline_path)?;
            let current = TreeManifest::compute(&modified_dir)?;
            Ok::<_, std::io::Error>(baseline.diff(&current))
        })
        .await
        .map_err(|e| EvaluatorError::Failed(e.to_string()))??;

        // Persist the full diff for inspection.
        let artifacts_dir = view.evaluator_artifacts_dir(self.name())?;
        let diff_path = artifacts_dir.join("diff.json");
        std::fs::write(&diff_path, serde_json::to_string_pretty(&diff)?)?;

        let result = if diff.change_count() > 0 {
            EvaluationResult::passed(
                self.name(),
                format!(
                    "agent changed {} file(s): {} added, {} modified, {} removed",
                    diff.change_count(),
                    diff.added.len(),
                    diff.modified.len(),
                    diff.removed.len()
                ),
            )
        } else {
            EvaluationResult::failed(self.name(), "agent produced no diff")
        };

        Ok(result
            .with_metric("files_added", diff.added.len().into())
            .with_metric("files_modified", diff.modified.len().into())
            .with_metric("files_removed", diff.removed.len().into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::result::EvaluationStatus;
    use tempfile::TempDir;

    fn workspace() -> (TempDir, WorkspaceView) {
        let temp = TempDir::new().unwrap();
        let modified = temp.path().join("modified");
        let artifacts = temp.path().join("artifacts");
        std::fs::create_dir_all(&modified).unwrap();
        std::fs::create_dir_all(&artifacts).unwrap();
        std::fs::write(modified.join("a.txt"), "one").unwrap();
        std::fs::write(modified.join("b.txt"), "two").unwrap();
        let view = WorkspaceView {
            modified_dir: modified,
            expected_dir: None,
            artifacts_dir: artifacts,
        };
        (temp, view)
    }

    fn capture_baseline(view: &WorkspaceView) {
        let manifest = TreeManifest::compute(&view.modified_dir).unwrap();
        manifest
            .save(&view.artifacts_dir.join(BASELINE_MANIFEST))
            .unwrap();
    }

    #[tokio::test]
    async fn test_skips_without_baseline() {
        let (_temp, view) = workspace();
        let evaluator = FilesChangedEvaluator::new();
        assert!(matches!(
            evaluator.check_preconditions(&view).await,
            Precondition::Skip(_)
        ));
    }

    #[tokio::test]
    async fn test_detects_changes() {
        let (_temp, view) = workspace();
        capture_baseline(&view);

        std::fs::write(view.modified_dir.join("a.txt"), "changed").unwrap();
        std::fs::write(view.modified_dir.join("new.txt"), "fresh").unwrap();
        std::fs::remove_file(view.modified_dir.join("b.txt")).unwrap();

        let evaluator = FilesChangedEvaluator::new();
        let result = evaluator.evaluate(&view).await.unwrap();
        assert_eq!(result.status, EvaluationStatus::Passed);
        assert_eq!(result.metrics["files_added"], 1);
        assert_eq!(result.metrics["files_modified"], 1);
        assert_eq!(result.metrics["files_removed"], 1);
        assert!(view
            .artifacts_dir
            .join("files_changed")
            .join("diff.json")
            .exists());
    }

    #[tokio::test]
    async fn test_no_diff_fails() {
        let (_temp, view) = workspace();
        capture_baseline(&view);

        let evaluator = FilesChangedEvaluator::new();
        let result = evaluator.evaluate(&view).await.unwrap();
        assert_eq!(result.status, EvaluationStatus::Failed);
        assert!(result.message.contains("no diff"));
    }

    #[test]
    fn test_manifest_diff() {
        let baseline = TreeManifest {
            files: [("a".into(), "1".into()), ("b".into(), "2".into())]
                .into_iter()
                .collect(),
        };
        let current = TreeManifest {
            files: [("a".into(), "9".into()), ("c".into(), "3".into())]
                .into_iter()
                .collect(),
        };
        let diff = baseline.diff(&current);
        assert_eq!(diff.modified, vec!["a"]);
        assert_eq!(diff.added, vec!["c"]);
        assert_eq!(diff.removed, vec!["b"]);
        assert_eq!(diff.change_count(), 3);
    }
}
