//! Per-run-root filesystem locks.
//!
//! A lock is an atomically created marker file next to the run root.
//! Creation with `create_new` either succeeds (the caller owns the root)
//! or fails because the file exists (another run owns it) — there is no
//! in-between, and the guarantee holds across processes.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::WorkspaceError;

/// Exclusive lock over one run root.
///
/// Released explicitly via [`RunLock::release`]; dropping an unreleased
/// lock removes the marker file as a fallback so a panicking run does not
/// leave the key permanently held.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    released: bool,
}

impl RunLock {
    /// Acquires the lock for the given run root.
    ///
    /// Fails fast with [`WorkspaceError::Busy`] if another run already
    /// holds the same root; locks for distinct roots never interact.
    pub fn acquire(run_root: &Path) -> Result<Self, WorkspaceError> {
        let path = Self::lock_path(run_root);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                // Owner pid, for post-mortem inspection only.
                let _ = writeln!(file, "{}", std::process::id());
                debug!("Acquired workspace lock {}", path.display());
                Ok(Self {
                    path,
                    released: false,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(WorkspaceError::Busy(run_root.display().to_string()))
            }
            Err(e) => Err(WorkspaceError::Io(e)),
        }
    }

    /// Returns the lock file path for a run root.
    pub fn lock_path(run_root: &Path) -> PathBuf {
        let mut name = run_root
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "workspace".to_string());
        name.push_str(".lock");
        run_root.with_file_name(name)
    }

    /// Releases the lock, removing the marker file.
    pub fn release(mut self) {
        self.remove_marker();
        self.released = true;
    }

    fn remove_marker(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove lock file {}: {}", self.path.display(), e);
            }
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if !self.released {
            self.remove_marker();
            self.released = true;
        }
    }
}
