//! Isolated per-run workspaces.
//!
//! Each run gets its own root directory keyed by `{timestamp, content
//! hash}`, guarded by an exclusive per-root lock. The root holds three
//! directories: `modified/` (the agent's working copy), `expected/`
//! (optional known-good reference) and `artifacts/` (logs and evaluator
//! outputs). Roots are never shared or reused; cleanup removes the whole
//! root and releases the lock on every exit path unless the run asked
//! for retention.

pub mod lock;
pub mod source;

use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::{ExpectedSourceKind, RunConfig, SourceRef};
use crate::error::WorkspaceError;

pub use lock::RunLock;

/// Directory name for the agent's mutable working copy.
const MODIFIED_DIR: &str = "modified";
/// Directory name for the expected reference copy.
const EXPECTED_DIR: &str = "expected";
/// Directory name for logs and evaluator outputs.
const ARTIFACTS_DIR: &str = "artifacts";

/// Handle to one run's workspace. Exclusively owned by the run that
/// created it.
#[derive(Debug)]
pub struct WorkspaceHandle {
    /// Key this workspace was created under.
    pub key: String,
    /// Run root directory.
    pub root: PathBuf,
    /// Working copy the agent mutates.
    pub modified_dir: PathBuf,
    /// Known-good reference copy, when one was requested.
    pub expected_dir: Option<PathBuf>,
    /// Write target for logs and evaluator outputs.
    pub artifacts_dir: PathBuf,
    lock: Option<RunLock>,
}

impl WorkspaceHandle {
    /// Returns an immutable view of the workspace paths for evaluators.
    pub fn view(&self) -> WorkspaceView {
        WorkspaceView {
            modified_dir: self.modified_dir.clone(),
            expected_dir: self.expected_dir.clone(),
            artifacts_dir: self.artifacts_dir.clone(),
        }
    }
}

/// Read-only path view handed to evaluators.
///
/// Carries paths only; evaluators may create files under their own
/// subdirectory of `artifacts_dir` but have no handle that mutates the
/// working or expected copies.
#[derive(Debug, Clone)]
pub struct WorkspaceView {
    /// The agent's working copy (read-only for evaluators).
    pub modified_dir: PathBuf,
    /// The expected reference copy, if one exists.
    pub expected_dir: Option<PathBuf>,
    /// Artifacts directory; evaluators write under their own subdir.
    pub artifacts_dir: PathBuf,
}

impl WorkspaceView {
    /// Returns (creating it) the artifacts subdirectory for an evaluator.
    pub fn evaluator_artifacts_dir(&self, evaluator: &str) -> Result<PathBuf, std::io::Error> {
        let dir = self.artifacts_dir.join(evaluator);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

/// Creates, locks and tears down per-run workspaces.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    /// Base directory run roots are created under.
    base_dir: PathBuf,
}

impl WorkspaceManager {
    /// Creates a manager rooted at the given base directory.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Creates a manager from a run config, falling back to the system
    /// temp directory when no override is configured.
    pub fn for_config(config: &RunConfig) -> Self {
        let base = config
            .workspace_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("evalforge"));
        Self::new(base)
    }

    /// Computes the run-root key for a config: timestamp plus a short
    /// content hash over the config snapshot.
    pub fn run_key(config: &RunConfig) -> String {
        let timestamp = Utc::now().format("%Y%m%d%H%M%S%3f");
        let mut hasher = Sha256::new();
        hasher.update(config.test_case.as_bytes());
        hasher.update(config.source.repository.as_bytes());
        hasher.update(uuid::Uuid::new_v4().as_bytes());
        let digest = hex::encode(hasher.finalize());
        format!("run-{}-{}", timestamp, &digest[..8])
    }

    /// Creates and populates a workspace for the given run config.
    pub async fn create_workspace(
        &self,
        config: &RunConfig,
    ) -> Result<WorkspaceHandle, WorkspaceError> {
        self.create_workspace_with_key(config, &Self::run_key(config))
            .await
    }

    /// Creates a workspace under an explicit key. Two concurrent calls
    /// with the same key resolve to one success and one
    /// [`WorkspaceError::Busy`].
    pub async fn create_workspace_with_key(
        &self,
        config: &RunConfig,
        key: &str,
    ) -> Result<WorkspaceHandle, WorkspaceError> {
        let root = self.base_dir.join(key);
        let lock = RunLock::acquire(&root)?;

        match self.populate(config, &root).await {
            Ok(expected_dir) => {
                info!("Workspace ready at {}", root.display());
                Ok(WorkspaceHandle {
                    key: key.to_string(),
                    root: root.clone(),
                    modified_dir: root.join(MODIFIED_DIR),
                    expected_dir,
                    artifacts_dir: root.join(ARTIFACTS_DIR),
                    lock: Some(lock),
                })
            }
            Err(e) => {
                // Partial workspaces are never evaluated; tear down and
                // release before reporting.
                if let Err(rm) = std::fs::remove_dir_all(&root) {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove partial workspace {}: {}", root.display(), rm);
                    }
                }
                lock.release();
                Err(e)
            }
        }
    }

    /// Removes the run root and releases the lock.
    ///
    /// With retention requested, the root is kept for post-mortem
    /// inspection and only the lock is released.
    pub fn cleanup(&self, mut handle: WorkspaceHandle, retain: bool) -> Result<(), WorkspaceError> {
        let lock = handle.lock.take();
        let result = if retain {
            info!("Retaining workspace {} for inspection", handle.root.display());
            Ok(())
        } else {
            debug!("Removing workspace {}", handle.root.display());
            match std::fs::remove_dir_all(&handle.root) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(WorkspaceError::Io(e)),
            }
        };
        if let Some(lock) = lock {
            lock.release();
        }
        result
    }

    async fn populate(
        &self,
        config: &RunConfig,
        root: &Path,
    ) -> Result<Option<PathBuf>, WorkspaceError> {
        let modified = root.join(MODIFIED_DIR);
        let artifacts = root.join(ARTIFACTS_DIR);
        std::fs::create_dir_all(&modified)?;
        std::fs::create_dir_all(&artifacts)?;

        let timeout = config.timeouts.prepare();
        source::materialize(&config.source, &modified, timeout).await?;

        let Some(expected) = &config.expected else {
            return Ok(None);
        };

        let expected_dir = root.join(EXPECTED_DIR);
        std::fs::create_dir_all(&expected_dir)?;

        match expected.kind {
            ExpectedSourceKind::Branch => {
                let reference = SourceRef::new(config.source.repository.clone())
                    .with_branch(expected.identifier.clone());
                source::materialize(&reference, &expected_dir, timeout).await?;
            }
            ExpectedSourceKind::Path => {
                source::copy_into(Path::new(&expected.identifier), &expected_dir, timeout)
                    .await?;
            }
            ExpectedSourceKind::Dataset => {
                let dataset_dir = config
                    .dataset_root
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("./datasets"))
                    .join(&expected.identifier);
                source::copy_into(&dataset_dir, &expected_dir, timeout).await?;
            }
        }

        Ok(Some(expected_dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExpectedRef;
    use tempfile::TempDir;

    fn local_config(src: &Path) -> RunConfig {
        RunConfig::new("case-a", SourceRef::new(src.display().to_string()))
    }

    fn seed(dir: &Path) {
        std::fs::write(dir.join("file.txt"), "content").unwrap();
    }

    #[tokio::test]
    async fn test_create_and_cleanup() {
        let src = TempDir::new().unwrap();
        let base = TempDir::new().unwrap();
        seed(src.path());

        let manager = WorkspaceManager::new(base.path());
        let handle = manager
            .create_workspace(&local_config(src.path()))
            .await
            .unwrap();

        let root = handle.root.clone();
        assert!(handle.modified_dir.join("file.txt").exists());
        assert!(handle.artifacts_dir.exists());
        assert!(handle.expected_dir.is_none());

        manager.cleanup(handle, false).unwrap();
        assert!(!root.exists());
        assert!(!RunLock::lock_path(&root).exists());
    }

    #[tokio::test]
    async fn test_retention_keeps_root() {
        let src = TempDir::new().unwrap();
        let base = TempDir::new().unwrap();
        seed(src.path());

        let manager = WorkspaceManager::new(base.path());
        let handle = manager
            .create_workspace(&local_config(src.path()))
            .await
            .unwrap();
        let root = handle.root.clone();

        manager.cleanup(handle, true).unwrap();
        assert!(root.exists());
        assert!(!RunLock::lock_path(&root).exists());
    }

    #[tokio::test]
    async fn test_expected_path_reference() {
        let src = TempDir::new().unwrap();
        let golden = TempDir::new().unwrap();
        let base = TempDir::new().unwrap();
        seed(src.path());
        std::fs::write(golden.path().join("file.txt"), "golden").unwrap();

        let config = local_config(src.path()).with_expected(ExpectedRef {
            kind: ExpectedSourceKind::Path,
            identifier: golden.path().display().to_string(),
        });

        let manager = WorkspaceManager::new(base.path());
        let handle = manager.create_workspace(&config).await.unwrap();

        let expected = handle.expected_dir.clone().unwrap();
        assert_eq!(
            std::fs::read_to_string(expected.join("file.txt")).unwrap(),
            "golden"
        );
        manager.cleanup(handle, false).unwrap();
    }

    #[tokio::test]
    async fn test_same_key_contention() {
        let src = TempDir::new().unwrap();
        let base = TempDir::new().unwrap();
        seed(src.path());

        let manager = WorkspaceManager::new(base.path());
        let config = local_config(src.path());

        let first = manager
            .create_workspace_with_key(&config, "run-fixed-key")
            .await
            .unwrap();
        let second = manager
            .create_workspace_with_key(&config, "run-fixed-key")
            .await;
        assert!(matches!(second, Err(WorkspaceError::Busy(_))));

        manager.cleanup(first, false).unwrap();
    }

    #[tokio::test]
    async fn test_distinct_keys_both_succeed() {
        let src = TempDir::new().unwrap();
        let base = TempDir::new().unwrap();
        seed(src.path());

        let manager = WorkspaceManager::new(base.path());
        let config = local_config(src.path());

        let (a, b) = tokio::join!(
            manager.create_workspace_with_key(&config, "run-key-a"),
            manager.create_workspace_with_key(&config, "run-key-b"),
        );
        let a = a.unwrap();
        let b = b.unwrap();
        assert_ne!(a.root, b.root);

        manager.cleanup(a, false).unwrap();
        manager.cleanup(b, false).unwrap();
    }

    #[tokio::test]
    async fn test_failed_populate_releases_lock() {
        let base = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(base.path());

        let mut config = RunConfig::new("case-a", SourceRef::new("./definitely-missing-dir"));
        // Point the expected reference at a missing path so populate
        // fails after the lock is held.
        let src = TempDir::new().unwrap();
        seed(src.path());
        config.source = SourceRef::new(src.path().display().to_string());
        config.expected = Some(ExpectedRef {
            kind: ExpectedSourceKind::Path,
            identifier: "/nonexistent/golden".into(),
        });

        let result = manager.create_workspace_with_key(&config, "run-fail").await;
        assert!(result.is_err());

        // Lock released and root removed, so the key is reusable.
        let retry = manager
            .create_workspace_with_key(&local_config(src.path()), "run-fail")
            .await
            .unwrap();
        manager.cleanup(retry, false).unwrap();
    }

    #[test]
    fn test_run_key_uniqueness() {
        let src = TempDir::new().unwrap();
        let config = local_config(src.path());
        let a = WorkspaceManager::run_key(&config);
        let b = WorkspaceManager::run_key(&config);
        assert_ne!(a, b);
        assert!(a.starts_with("run-"));
    }
}
