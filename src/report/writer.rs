//! Output directory writers.
//!
//! Dumps each LLM call's request and response into the output directory and
//! writes the report file next to them.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::generator::{generate_json_report, generate_markdown_report};
use crate::cancel::CancelFlag;
use crate::cli::OutputFormat;
use crate::models::{ParsedBlock, Report, UNKNOWN_TASK};

/// Base name of the report file inside the output directory.
pub const REPORT_FILE_STEM: &str = "analysis_report";

/// Name of the filtered log copy kept with `--save-filtered`.
pub const FILTERED_LOG_FILE: &str = "filtered.log";

const MAX_SLUG_CHARS: usize = 80;

/// Filesystem-safe version of a task hint.
pub fn slugify_filename(text: &str) -> String {
    if text.is_empty() || text == UNKNOWN_TASK {
        return "unknown_task".to_string();
    }
    text.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_SLUG_CHARS)
        .collect()
}

/// File name prefix of a call's dump files, e.g. `001_research`.
pub fn block_file_prefix(block: &ParsedBlock) -> String {
    format!("{:03}_{}", block.step, slugify_filename(&block.task_hint))
}

/// Write `<prefix>_input.txt` and `<prefix>_output.txt` for every call.
///
/// A call whose files cannot be written is skipped with a warning. Stops
/// with [`Interrupted`](crate::cancel::Interrupted) once `cancel` is raised.
/// Returns the number of calls saved.
pub fn save_blocks(
    blocks: &[ParsedBlock],
    output_dir: &Path,
    show_progress: bool,
    cancel: &CancelFlag,
) -> Result<usize> {
    fs::create_dir_all(output_dir).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            output_dir.display()
        )
    })?;

    let progress_bar = if show_progress && !blocks.is_empty() {
        let pb = ProgressBar::new(blocks.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut saved = 0;
    for block in blocks {
        if let Err(interrupted) = cancel.check() {
            if let Some(pb) = progress_bar {
                pb.abandon_with_message("interrupted");
            }
            return Err(interrupted.into());
        }

        let prefix = block_file_prefix(block);
        let input_path = output_dir.join(format!("{}_input.txt", prefix));
        let output_path = output_dir.join(format!("{}_output.txt", prefix));

        let result = fs::write(&input_path, &block.request)
            .and_then(|_| fs::write(&output_path, &block.response));
        match result {
            Ok(()) => {
                debug!("Saved step {} to {}", block.step, input_path.display());
                saved += 1;
            }
            Err(e) => warn!("Failed to save files for step {}: {}", block.step, e),
        }

        if let Some(ref pb) = progress_bar {
            pb.inc(1);
        }
    }

    if let Some(pb) = progress_bar {
        pb.finish_and_clear();
    }

    Ok(saved)
}

/// Render `report` in `format` and write it into `output_dir`.
pub fn write_report(report: &Report, output_dir: &Path, format: OutputFormat) -> Result<PathBuf> {
    let content = match format {
        OutputFormat::Markdown => generate_markdown_report(report),
        OutputFormat::Json => generate_json_report(report)?,
    };

    fs::create_dir_all(output_dir).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            output_dir.display()
        )
    })?;

    let path = output_dir.join(format!("{}.{}", REPORT_FILE_STEM, format.extension()));
    fs::write(&path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LogMode, ReportMetadata};
    use chrono::Utc;
    use tempfile::TempDir;

    fn create_test_block(step: usize, hint: &str) -> ParsedBlock {
        let mut block = ParsedBlock::new(step);
        block.task_hint = hint.to_string();
        block.request = format!("Request to litellm:\nCurrent Task: {}\n", hint);
        block.response = "RAW RESPONSE:\nFinal Answer: ok\n".to_string();
        block
    }

    #[test]
    fn test_slugify_filename() {
        assert_eq!(slugify_filename("Write a launch plan!"), "Write_a_launch_plan_");
        assert_eq!(slugify_filename("keep-this_one"), "keep-this_one");
        assert_eq!(slugify_filename(""), "unknown_task");
        assert_eq!(slugify_filename(UNKNOWN_TASK), "unknown_task");
        assert_eq!(slugify_filename("é/ü"), "___");
        assert_eq!(slugify_filename(&"a".repeat(100)).len(), 80);
    }

    #[test]
    fn test_block_file_prefix() {
        let block = create_test_block(7, "Rank vendors");
        assert_eq!(block_file_prefix(&block), "007_Rank_vendors");
    }

    #[test]
    fn test_save_blocks() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("nested").join("out");
        let blocks = vec![create_test_block(1, "Research"), create_test_block(2, "")];

        let saved = save_blocks(&blocks, &out, false, &CancelFlag::default()).unwrap();
        assert_eq!(saved, 2);

        let input = fs::read_to_string(out.join("001_Research_input.txt")).unwrap();
        assert!(input.contains("Current Task: Research"));
        let output = fs::read_to_string(out.join("002_unknown_task_output.txt")).unwrap();
        assert!(output.starts_with("RAW RESPONSE:"));
    }

    #[test]
    fn test_save_blocks_stops_when_cancelled() {
        let dir = TempDir::new().unwrap();
        let blocks = vec![create_test_block(1, "Research"), create_test_block(2, "Write")];
        let cancel = CancelFlag::default();
        cancel.cancel();

        let err = save_blocks(&blocks, dir.path(), false, &cancel).unwrap_err();
        assert!(crate::cancel::is_interrupted(&err));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_write_report_formats() {
        let dir = TempDir::new().unwrap();
        let report = Report {
            metadata: ReportMetadata {
                log_path: "run.log".to_string(),
                analysis_date: Utc::now(),
                mode: LogMode::Raw,
                lines_read: 1,
                lines_parsed: 1,
                llm_calls: 0,
                parsing_errors: 0,
                final_answers: 0,
                duration_seconds: 0.0,
            },
            unified: None,
            token_usage: Vec::new(),
        };

        let md = write_report(&report, dir.path(), OutputFormat::Markdown).unwrap();
        assert_eq!(md.file_name().unwrap(), "analysis_report.md");
        assert!(fs::read_to_string(&md).unwrap().contains("- **Mode:** Raw"));

        let json = write_report(&report, dir.path(), OutputFormat::Json).unwrap();
        assert_eq!(json.file_name().unwrap(), "analysis_report.json");
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(value["metadata"]["mode"], "raw");
    }
}
