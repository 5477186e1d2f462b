//! Line filter that strips tool noise from agent-framework logs.
//!
//! Every line is judged on its own: a line is either dropped whole or kept
//! byte-for-byte. Survivors keep their relative order and are re-joined with
//! `\n`, so splitting the output on `\n` never yields more segments than the
//! input had.

use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

/// Lines longer than this (in characters) that contain both braces are
/// treated as inlined JSON blobs.
pub const DEFAULT_JSON_LINE_THRESHOLD: usize = 300;

static TOOL_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Tool: .*").expect("invalid tool label pattern"));

static ACTION_INPUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Action Input: .*").expect("invalid action input pattern"));

static USAGE_FRAGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#""usage":\s*\{.*\}"#,
        r#"|"completion_tokens":\s*\d+"#,
        r#"|"prompt_tokens":\s*\d+"#,
        r#"|"total_tokens":\s*\d+"#,
        r#"|"tool_calls":"#,
        r#"|"function_call":"#,
    ))
    .expect("invalid usage fragment pattern")
});

static TIMES_USED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Times Used: \d+$").expect("invalid times used pattern"));

/// Errors raised while building a filter from user configuration.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid extra filter pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("JSON line threshold must be at least 1")]
    ZeroThreshold,
}

/// Why a line was dropped. When several rules match, the first one in
/// declaration order is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DropReason {
    ToolLabel,
    ActionInput,
    UsageFragment,
    TimesUsed,
    JsonBlob,
    ExtraPattern,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::ToolLabel => write!(f, "tool label"),
            DropReason::ActionInput => write!(f, "action input"),
            DropReason::UsageFragment => write!(f, "usage fragment"),
            DropReason::TimesUsed => write!(f, "times used"),
            DropReason::JsonBlob => write!(f, "json blob"),
            DropReason::ExtraPattern => write!(f, "extra pattern"),
        }
    }
}

/// Counters gathered during one filtering pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterStats {
    /// Number of `\n`-separated segments in the input.
    pub lines_in: usize,
    /// Number of segments that survived.
    pub lines_kept: usize,
    /// Dropped segments per rule.
    pub dropped: HashMap<DropReason, usize>,
}

impl FilterStats {
    pub fn lines_dropped(&self) -> usize {
        self.lines_in - self.lines_kept
    }
}

/// Compiled noise filter.
#[derive(Debug, Clone)]
pub struct LogFilter {
    json_line_threshold: usize,
    extra_patterns: Vec<Regex>,
}

impl Default for LogFilter {
    fn default() -> Self {
        Self::new(DEFAULT_JSON_LINE_THRESHOLD)
    }
}

impl TryFrom<&crate::config::FilterConfig> for LogFilter {
    type Error = FilterError;

    fn try_from(config: &crate::config::FilterConfig) -> Result<Self, Self::Error> {
        if config.json_line_threshold == 0 {
            return Err(FilterError::ZeroThreshold);
        }
        Self::new(config.json_line_threshold).with_extra_patterns(&config.extra_patterns)
    }
}

impl LogFilter {
    /// Create a filter with the built-in rules and the given blob threshold.
    pub fn new(json_line_threshold: usize) -> Self {
        Self {
            json_line_threshold,
            extra_patterns: Vec::new(),
        }
    }

    /// Add user-supplied drop patterns, searched anywhere in the line.
    pub fn with_extra_patterns(mut self, patterns: &[String]) -> Result<Self, FilterError> {
        for pattern in patterns {
            let regex = Regex::new(pattern).map_err(|e| FilterError::InvalidPattern {
                pattern: pattern.clone(),
                source: e,
            })?;
            self.extra_patterns.push(regex);
        }
        Ok(self)
    }

    pub fn json_line_threshold(&self) -> usize {
        self.json_line_threshold
    }

    /// Returns the rule that drops `line`, or `None` if the line is kept.
    pub fn drop_reason(&self, line: &str) -> Option<DropReason> {
        if TOOL_LABEL.is_match(line) {
            return Some(DropReason::ToolLabel);
        }
        if ACTION_INPUT.is_match(line) {
            return Some(DropReason::ActionInput);
        }
        if USAGE_FRAGMENT.is_match(line) {
            return Some(DropReason::UsageFragment);
        }
        if TIMES_USED.is_match(line) {
            return Some(DropReason::TimesUsed);
        }
        if self.is_json_blob(line) {
            return Some(DropReason::JsonBlob);
        }
        if self.extra_patterns.iter().any(|re| re.is_match(line)) {
            return Some(DropReason::ExtraPattern);
        }
        None
    }

    /// Long line carrying at least one `{` and one `}`, in any order.
    fn is_json_blob(&self, line: &str) -> bool {
        // Byte length bounds the char count from above.
        if line.len() <= self.json_line_threshold {
            return false;
        }
        line.chars().count() > self.json_line_threshold && line.contains('{') && line.contains('}')
    }

    /// Filter `text`, returning the surviving lines joined with `\n` and
    /// what was removed.
    pub fn apply_with_stats(&self, text: &str) -> (String, FilterStats) {
        let mut stats = FilterStats::default();
        let mut kept = Vec::new();

        for line in text.split('\n') {
            stats.lines_in += 1;
            match self.drop_reason(line) {
                Some(reason) => *stats.dropped.entry(reason).or_insert(0) += 1,
                None => kept.push(line),
            }
        }

        stats.lines_kept = kept.len();
        debug!(
            "Filter kept {} of {} lines (threshold {})",
            stats.lines_kept, stats.lines_in, self.json_line_threshold
        );

        (kept.join("\n"), stats)
    }
}
