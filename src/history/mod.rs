//! Run history: bundle persistence and the append-only JSONL log.
//!
//! Each exported run is one line of newline-delimited JSON. The file is
//! only ever appended to, never rewritten, and the reader parses each
//! line independently so a truncated final line (crash mid-append) or a
//! corrupt record skips that line instead of failing the whole read.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::HistoryError;
use crate::runner::result::{ExportedResultsBundle, ResultsBundle};

/// Writes a results bundle as pretty JSON.
pub fn save_bundle(bundle: &ResultsBundle, path: &Path) -> Result<(), HistoryError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(bundle)?;
    std::fs::write(path, json)?;
    debug!("Saved bundle to {}", path.display());
    Ok(())
}

/// Loads a results bundle from JSON.
pub fn load_bundle(path: &Path) -> Result<ResultsBundle, HistoryError> {
    if !path.exists() {
        return Err(HistoryError::NotFound(path.display().to_string()));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Outcome of reading a history file.
#[derive(Debug)]
pub struct HistoryRead {
    /// Records parsed successfully, in file order.
    pub records: Vec<ExportedResultsBundle>,
    /// Lines that could not be parsed and were skipped.
    pub skipped_lines: usize,
}

/// The append-only history log.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    /// Creates a log handle for the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the log's file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one run to the log, stamping it with the export time.
    ///
    /// One compact JSON line per run; existing content is never touched.
    pub fn append(&self, bundle: ResultsBundle) -> Result<ExportedResultsBundle, HistoryError> {
        let exported = ExportedResultsBundle::new(bundle);
        let line = serde_json::to_string(&exported)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| HistoryError::AppendFailed(e.to_string()))?;
        writeln!(file, "{}", line).map_err(|e| HistoryError::AppendFailed(e.to_string()))?;

        debug!(
            "Appended run {} to {}",
            exported.bundle.run_id,
            self.path.display()
        );
        Ok(exported)
    }

    /// Reads all parsable records, counting skipped malformed lines.
    pub fn read(&self) -> Result<HistoryRead, HistoryError> {
        if !self.path.exists() {
            return Err(HistoryError::NotFound(self.path.display().to_string()));
        }
        let file = std::fs::File::open(&self.path)?;
        let reader = BufReader::new(file);

        let mut records = Vec::new();
        let mut skipped_lines = 0usize;
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ExportedResultsBundle>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(
                        "Skipping malformed history line {} in {}: {}",
                        number + 1,
                        self.path.display(),
                        e
                    );
                    skipped_lines += 1;
                }
            }
        }

        Ok(HistoryRead {
            records,
            skipped_lines,
        })
    }
}
