//! Source materialization: getting repository content into a workspace.
//!
//! Git URLs are shallow-cloned with `git` as a subprocess; local paths
//! are copied recursively. Both operations only ever write under the
//! destination directory — the caller's tree is never touched.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::SourceRef;
use crate::error::WorkspaceError;

/// Directories never copied from local sources.
const COPY_EXCLUDES: &[&str] = &["target", "node_modules", ".venv"];

/// Materializes a source reference into `dest`, bounded by `timeout`.
pub async fn materialize(
    source: &SourceRef,
    dest: &Path,
    timeout: Duration,
) -> Result<(), WorkspaceError> {
    tokio::time::timeout(timeout, materialize_inner(source, dest))
        .await
        .map_err(|_| WorkspaceError::Timeout(timeout))?
}

async fn materialize_inner(source: &SourceRef, dest: &Path) -> Result<(), WorkspaceError> {
    if source.is_local() {
        return copy_tree_task(Path::new(&source.repository), dest).await;
    }
    clone_repo(&source.repository, source.branch.as_deref(), source.commit.as_deref(), dest).await
}

/// Copies a local directory into `dest`, bounded by `timeout`.
pub async fn copy_into(
    source: &Path,
    dest: &Path,
    timeout: Duration,
) -> Result<(), WorkspaceError> {
    tokio::time::timeout(timeout, copy_tree_task(source, dest))
        .await
        .map_err(|_| WorkspaceError::Timeout(timeout))?
}

/// Runs the synchronous tree copy on the blocking pool, so the timeouts
/// wrapping it have a real suspension point to race against.
async fn copy_tree_task(source: &Path, dest: &Path) -> Result<(), WorkspaceError> {
    let display = source.display().to_string();
    let source = source.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || copy_tree(&source, &dest))
        .await
        .map_err(|e| WorkspaceError::CopyFailed {
            path: display,
            message: e.to_string(),
        })?
}

/// Shallow-clones a git repository into `dest`.
async fn clone_repo(
    url: &str,
    branch: Option<&str>,
    commit: Option<&str>,
    dest: &Path,
) -> Result<(), WorkspaceError> {
    std::fs::create_dir_all(dest)?;

    let mut args = vec!["clone".to_string(), "--depth".to_string(), "50".to_string()];
    if let Some(branch) = branch {
        args.push("--branch".to_string());
        args.push(branch.to_string());
    }
    args.push(url.to_string());
    args.push(".".to_string());

    info!("Cloning {} into {}", url, dest.display());

    let output = tokio::process::Command::new("git")
        .args(&args)
        .current_dir(dest)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                WorkspaceError::GitUnavailable(e.to_string())
            } else {
                WorkspaceError::Io(e)
            }
        })?;

    if !output.status.success() {
        return Err(WorkspaceError::CloneFailed {
            reference: url.to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    if let Some(commit) = commit {
        let status = tokio::process::Command::new("git")
            .args(["checkout", commit])
            .current_dir(dest)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        if !status.success() {
            return Err(WorkspaceError::CloneFailed {
                reference: url.to_string(),
                message: format!("failed to check out commit {}", commit),
            });
        }
    }

    Ok(())
}

/// Recursively copies `source` into `dest`, skipping build artifacts.
fn copy_tree(source: &Path, dest: &Path) -> Result<(), WorkspaceError> {
    if !source.exists() {
        return Err(WorkspaceError::SourceNotFound(
            source.display().to_string(),
        ));
    }

    debug!("Copying {} into {}", source.display(), dest.display());
    std::fs::create_dir_all(dest)?;

    for entry in WalkDir::new(source).min_depth(1).into_iter().filter_entry(|e| {
        !(e.file_type().is_dir()
            && e.file_name()
                .to_str()
                .map(|n| COPY_EXCLUDES.contains(&n))
                .unwrap_or(false))
    }) {
        let entry = entry.map_err(|e| WorkspaceError::CopyFailed {
            path: source.display().to_string(),
            message: e.to_string(),
        })?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .expect("walkdir yields paths under its root");
        let target = dest.join(rel);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target).map_err(|e| WorkspaceError::CopyFailed {
                path: entry.path().display().to_string(),
                message: e.to_string(),
            })?;
        }
        // Symlinks are intentionally not followed or recreated.
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seed_source(dir: &Path) {
        std::fs::create_dir_all(dir.join("src")).unwrap();
        std::fs::write(dir.join("src/lib.rs"), "pub fn f() {}").unwrap();
        std::fs::write(dir.join("README.md"), "# demo").unwrap();
        std::fs::create_dir_all(dir.join("target")).unwrap();
        std::fs::write(dir.join("target/junk.o"), "junk").unwrap();
    }

    #[tokio::test]
    async fn test_copy_local_source() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        seed_source(src.path());

        let source = SourceRef::new(src.path().display().to_string());
        materialize(&source, dst.path(), Duration::from_secs(30))
            .await
            .unwrap();

        assert!(dst.path().join("src/lib.rs").exists());
        assert!(dst.path().join("README.md").exists());
        assert!(!dst.path().join("target").exists());
    }

    #[tokio::test]
    async fn test_copy_never_mutates_source() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        seed_source(src.path());

        let before: Vec<_> = WalkDir::new(src.path())
            .into_iter()
            .filter_map(Result::ok)
            .map(|e| e.path().to_path_buf())
            .collect();

        let source = SourceRef::new(src.path().display().to_string());
        materialize(&source, dst.path(), Duration::from_secs(30))
            .await
            .unwrap();

        let after: Vec<_> = WalkDir::new(src.path())
            .into_iter()
            .filter_map(Result::ok)
            .map(|e| e.path().to_path_buf())
            .collect();
        assert_eq!(before, after);
        assert_eq!(
            std::fs::read_to_string(src.path().join("src/lib.rs")).unwrap(),
            "pub fn f() {}"
        );
    }

    #[tokio::test]
    async fn test_copy_timeout_fires() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        seed_source(src.path());
        for i in 0..200 {
            std::fs::write(src.path().join(format!("file_{i}.txt")), "data").unwrap();
        }

        let result = copy_into(src.path(), dst.path(), Duration::from_nanos(1)).await;
        assert!(matches!(result, Err(WorkspaceError::Timeout(_))));
    }

    #[test]
    fn test_copy_failed_error_names_path() {
        let err = WorkspaceError::CopyFailed {
            path: "/tmp/repo/file.rs".to_string(),
            message: "permission denied".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("/tmp/repo/file.rs"));
        assert!(rendered.contains("permission denied"));
    }

    #[tokio::test]
    async fn test_missing_copy_source() {
        let dst = TempDir::new().unwrap();
        let result = copy_into(
            Path::new("/nonexistent/path/for/evalforge"),
            dst.path(),
            Duration::from_secs(5),
        )
        .await;
        assert!(matches!(result, Err(WorkspaceError::SourceNotFound(_))));
    }
}
