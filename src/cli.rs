//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CrewLog - token and cost metrics for multi-agent LLM logs
///
/// Strips tool dumps, raw JSON payloads and usage blobs from a CrewAI
/// console log, then extracts per-task token, cost and timing metrics.
///
/// Examples:
///   crewlog run.log ./analysis
///   crewlog run.log ./analysis --raw
///   crewlog run.log ./analysis --separate --format json
///   crewlog --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to the raw log file
    #[arg(value_name = "LOG_PATH", required_unless_present = "init_config")]
    pub log_path: Option<PathBuf>,

    /// Directory to save extracted input/output files and the report
    #[arg(value_name = "OUTPUT_DIR", required_unless_present = "init_config")]
    pub output_dir: Option<PathBuf>,

    /// Skip noise filtering and parse the raw log unchanged
    #[arg(long)]
    pub raw: bool,

    /// Show the token usage table and a sample token entry
    #[arg(long)]
    pub debug: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Show separate analysis tables instead of the unified table
    #[arg(long)]
    pub separate: bool,

    /// Report file format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Drop lines longer than this many characters that contain braces
    ///
    /// Overrides the [filter] json_line_threshold config value (default 300).
    #[arg(long, value_name = "CHARS", env = "CREWLOG_JSON_THRESHOLD")]
    pub json_threshold: Option<usize>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .crewlog.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Keep a copy of the filtered log as OUTPUT_DIR/filtered.log
    #[arg(long, conflicts_with = "raw")]
    pub save_filtered: bool,

    /// Generate a default .crewlog.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report file.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl OutputFormat {
    /// File extension used for the report file.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Json => "json",
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the log path (empty if not set; validated first).
    pub fn log_path(&self) -> &Path {
        self.log_path.as_deref().unwrap_or(Path::new(""))
    }

    /// Get the output directory (empty if not set; validated first).
    pub fn output_dir(&self) -> &Path {
        self.output_dir.as_deref().unwrap_or(Path::new(""))
    }

    /// Validate the parsed arguments.
    ///
    /// The log file itself is not checked here; a missing or unreadable
    /// file is reported when it is read.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.log_path.is_none() || self.output_dir.is_none() {
            return Err("Both LOG_PATH and OUTPUT_DIR are required".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.json_threshold == Some(0) {
            return Err("JSON threshold must be at least 1 character".to_string());
        }

        if self.output_dir().is_file() {
            return Err(format!(
                "Output path is a file, not a directory: {}",
                self.output_dir().display()
            ));
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.debug {
            tracing::Level::TRACE
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
