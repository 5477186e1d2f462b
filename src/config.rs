//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.crewlog.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cli::OutputFormat;
use crate::filter::DEFAULT_JSON_LINE_THRESHOLD;

/// Name of the config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".crewlog.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Noise filter settings.
    #[serde(default)]
    pub filter: FilterConfig,

    /// Token pricing used for cost estimates.
    #[serde(default)]
    pub pricing: PricingConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Report file format.
    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            format: OutputFormat::Markdown,
        }
    }
}

/// Noise filter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Lines longer than this that contain both `{` and `}` are dropped.
    #[serde(default = "default_json_line_threshold")]
    pub json_line_threshold: usize,

    /// Additional regular expressions; matching lines are dropped.
    #[serde(default)]
    pub extra_patterns: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            json_line_threshold: default_json_line_threshold(),
            extra_patterns: Vec::new(),
        }
    }
}

fn default_json_line_threshold() -> usize {
    DEFAULT_JSON_LINE_THRESHOLD
}

/// Per-token prices in USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default = "default_prompt_token_cost")]
    pub prompt_token_cost: f64,

    #[serde(default = "default_completion_token_cost")]
    pub completion_token_cost: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            prompt_token_cost: default_prompt_token_cost(),
            completion_token_cost: default_completion_token_cost(),
        }
    }
}

fn default_prompt_token_cost() -> f64 {
    1.5e-7 // gpt-4o-mini input
}

fn default_completion_token_cost() -> f64 {
    6e-7
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Task hints are cut to this many characters when grouping.
    #[serde(default = "default_task_hint_width")]
    pub task_hint_width: usize,

    /// Write each LLM call's request/response into the output directory.
    #[serde(default = "default_true")]
    pub save_blocks: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            task_hint_width: default_task_hint_width(),
            save_blocks: true,
        }
    }
}

fn default_task_hint_width() -> usize {
    40
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when the CLI provides an explicit value.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(threshold) = args.json_threshold {
            self.filter.json_line_threshold = threshold;
        }

        if let Some(format) = args.format {
            self.general.format = format;
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
