//! Input staging.
//!
//! Reads the raw log, runs the noise filter over it and writes the result to
//! a temporary file that the parser reads. The temporary file lives as long
//! as the returned [`StagedLog`]; in raw mode the original file is used
//! directly and nothing is written.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, info};

use crate::filter::{FilterStats, LogFilter};
use crate::models::LogMode;

/// A log ready for parsing.
#[derive(Debug)]
pub struct StagedLog {
    /// The log file given on the command line.
    pub source: PathBuf,
    /// Filtered copy; `None` in raw mode.
    temp: Option<TempPath>,
    pub mode: LogMode,
    /// Lines in the source file.
    pub lines_read: usize,
    /// Lines handed to the parser.
    pub lines_staged: usize,
    /// Filter counters; `None` in raw mode.
    pub stats: Option<FilterStats>,
}

impl StagedLog {
    /// Read `source` and stage it, filtered into a temporary file under
    /// `temp_dir` unless `raw` is set.
    pub fn prepare(
        source: &Path,
        filter: &LogFilter,
        raw: bool,
        temp_dir: &Path,
    ) -> Result<Self> {
        let content = fs::read_to_string(source)
            .with_context(|| format!("Failed to read log file: {}", source.display()))?;
        let lines_read = content.lines().count();

        if raw {
            info!("Raw mode: skipping noise filter");
            return Ok(Self {
                source: source.to_path_buf(),
                temp: None,
                mode: LogMode::Raw,
                lines_read,
                lines_staged: lines_read,
                stats: None,
            });
        }

        let (filtered, stats) = filter.apply_with_stats(&content);
        for (reason, count) in &stats.dropped {
            debug!("Dropped {} line(s): {}", count, reason);
        }

        let mut file = tempfile::Builder::new()
            .prefix("crewlog-")
            .suffix(".log")
            .tempfile_in(temp_dir)
            .context("Failed to create temporary file for filtered log")?;
        file.write_all(filtered.as_bytes())
            .context("Failed to write filtered log")?;
        file.flush().context("Failed to write filtered log")?;
        let temp = file.into_temp_path();
        debug!("Filtered log staged at {}", temp.display());

        Ok(Self {
            source: source.to_path_buf(),
            temp: Some(temp),
            mode: LogMode::Filtered,
            lines_read,
            lines_staged: filtered.lines().count(),
            stats: Some(stats),
        })
    }

    /// Path the parser should read.
    pub fn path(&self) -> &Path {
        match self.temp {
            Some(ref temp) => temp,
            None => &self.source,
        }
    }

    /// Copy the staged log to `dest`.
    pub fn save_copy(&self, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        fs::copy(self.path(), dest)
            .with_context(|| format!("Failed to copy staged log to {}", dest.display()))?;
        Ok(())
    }

    /// Delete the temporary file, if any. Dropping the value does the same
    /// but cannot report failures.
    pub fn cleanup(self) -> Result<()> {
        if let Some(temp) = self.temp {
            let path = temp.to_path_buf();
            temp.close()
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            debug!("Removed staged log {}", path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FIXTURE: &str = include_str!("../fixtures/crew_run.log");

    fn stage(source: &Path, raw: bool) -> Result<StagedLog> {
        StagedLog::prepare(source, &LogFilter::default(), raw, &std::env::temp_dir())
    }

    fn write_fixture(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("run.log");
        fs::write(&path, FIXTURE).unwrap();
        path
    }

    #[test]
    fn test_prepare_filtered() {
        let dir = TempDir::new().unwrap();
        let source = write_fixture(&dir);

        let staged = stage(&source, false).unwrap();
        assert_eq!(staged.mode, LogMode::Filtered);
        assert_ne!(staged.path(), source.as_path());
        assert_eq!(staged.lines_read, FIXTURE.lines().count());
        assert!(staged.lines_staged < staged.lines_read);

        let staged_text = fs::read_to_string(staged.path()).unwrap();
        assert!(!staged_text.contains("Times Used:"));
        assert!(!staged_text.lines().any(|l| l.starts_with("Tool: ")));
        assert!(staged_text.contains("Request to litellm:"));

        let stats = staged.stats.as_ref().unwrap();
        assert_eq!(stats.lines_dropped(), 16);
    }

    #[test]
    fn test_prepare_raw_uses_source() {
        let dir = TempDir::new().unwrap();
        let source = write_fixture(&dir);

        let staged = stage(&source, true).unwrap();
        assert_eq!(staged.mode, LogMode::Raw);
        assert_eq!(staged.path(), source.as_path());
        assert_eq!(staged.lines_staged, staged.lines_read);
        assert!(staged.stats.is_none());

        staged.cleanup().unwrap();
        assert!(source.exists());
    }

    #[test]
    fn test_temp_file_removed_on_cleanup_and_drop() {
        let dir = TempDir::new().unwrap();
        let source = write_fixture(&dir);

        let staged = stage(&source, false).unwrap();
        let temp_path = staged.path().to_path_buf();
        assert!(temp_path.exists());
        staged.cleanup().unwrap();
        assert!(!temp_path.exists());

        let staged = stage(&source, false).unwrap();
        let temp_path = staged.path().to_path_buf();
        drop(staged);
        assert!(!temp_path.exists());
    }

    #[test]
    fn test_prepare_uses_given_temp_dir() {
        let dir = TempDir::new().unwrap();
        let source = write_fixture(&dir);
        let staging = TempDir::new().unwrap();

        let staged =
            StagedLog::prepare(&source, &LogFilter::default(), false, staging.path()).unwrap();
        assert!(staged.path().starts_with(staging.path()));
        assert_eq!(fs::read_dir(staging.path()).unwrap().count(), 1);

        drop(staged);
        assert_eq!(fs::read_dir(staging.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_save_copy() {
        let dir = TempDir::new().unwrap();
        let source = write_fixture(&dir);
        let staged = stage(&source, false).unwrap();

        let dest = dir.path().join("out").join("filtered.log");
        staged.save_copy(&dest).unwrap();
        assert_eq!(
            fs::read_to_string(&dest).unwrap(),
            fs::read_to_string(staged.path()).unwrap()
        );
    }

    #[test]
    fn test_prepare_missing_file() {
        let err = stage(Path::new("/nonexistent/run.log"), false).unwrap_err();
        assert!(err.to_string().contains("Failed to read log file"));
    }
}
