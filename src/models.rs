//! Data models for the log analyzer.
//!
//! This module contains the core data structures used throughout the
//! application for representing LLM calls, token usage, and reports.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::config::PricingConfig;

/// Placeholder used when no task hint could be extracted.
pub const UNKNOWN_TASK: &str = "Unknown Task";

/// Token counts reported for one model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Returns true if every count is zero.
    pub fn is_empty(&self) -> bool {
        self.prompt_tokens == 0 && self.completion_tokens == 0 && self.total_tokens == 0
    }

    /// Estimated cost in USD.
    pub fn cost(&self, pricing: &PricingConfig) -> f64 {
        self.prompt_tokens as f64 * pricing.prompt_token_cost
            + self.completion_tokens as f64 * pricing.completion_token_cost
    }
}

/// One LLM call recovered from the log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedBlock {
    /// 1-based position of the call in the log.
    pub step: usize,
    /// Task the call was working on.
    pub task_hint: String,
    /// Raw request section, starting with the `Request to litellm:` line.
    pub request: String,
    /// Raw response section, starting with the `RAW RESPONSE:` line.
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    /// The response carried a JSON payload that could not be decoded.
    pub parsing_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// `APIStatusError` lines seen inside the call.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api_errors: Vec<String>,
}

impl ParsedBlock {
    /// Creates an empty block for the given step.
    pub fn new(step: usize) -> Self {
        Self {
            step,
            ..Default::default()
        }
    }

    pub fn has_final_answer(&self) -> bool {
        self.final_answer.as_deref().is_some_and(|a| !a.is_empty())
    }
}

/// Token usage of a single call, flattened for tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub step: usize,
    pub task_hint: String,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
}

/// Aggregated metrics for one task in the unified table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMetrics {
    /// Step of the first call that worked on this task.
    pub first_step: usize,
    /// Truncated task hint used as the grouping key.
    pub task: String,
    pub models: BTreeSet<String>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
    /// Sum of response times attributed to this task's calls.
    pub response_time_secs: f64,
    pub final_answers: usize,
    pub block_count: usize,
    /// Tool name and use count, most used first.
    pub tools: Vec<(String, usize)>,
}

impl TaskMetrics {
    /// Comma-separated model list, `unknown` when none was seen.
    pub fn model_label(&self) -> String {
        if self.models.is_empty() {
            "unknown".to_string()
        } else {
            self.models.iter().cloned().collect::<Vec<_>>().join(", ")
        }
    }

    /// Tool usage formatted as `name(count), ...`.
    pub fn tools_label(&self) -> String {
        self.tools
            .iter()
            .map(|(tool, count)| format!("{}({})", tool, count))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Final answers over calls, e.g. `1/2`.
    pub fn final_answer_label(&self) -> String {
        format!("{}/{}", self.final_answers, self.block_count)
    }
}

/// Column totals of the unified table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
    pub response_time_secs: f64,
    pub final_answers: usize,
    pub block_count: usize,
}

/// Result of the unified per-task analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnifiedAnalysis {
    /// One row per task, ordered by first step.
    pub tasks: Vec<TaskMetrics>,
    pub totals: TaskTotals,
    /// Tool usage over the whole run, most used first.
    pub tool_usage: Vec<(String, usize)>,
}

/// Completion status of one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCompletion {
    pub step: usize,
    pub task_hint: String,
    pub completed: bool,
}

/// Whether the filter ran before parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogMode {
    Raw,
    Filtered,
}

impl fmt::Display for LogMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogMode::Raw => write!(f, "Raw"),
            LogMode::Filtered => write!(f, "Filtered"),
        }
    }
}

/// Metadata about the analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Path of the analyzed log file.
    pub log_path: String,
    /// Date and time of the analysis.
    pub analysis_date: DateTime<Utc>,
    pub mode: LogMode,
    /// Lines in the original log.
    pub lines_read: usize,
    /// Lines handed to the parser.
    pub lines_parsed: usize,
    /// Number of LLM calls detected.
    pub llm_calls: usize,
    pub parsing_errors: usize,
    pub final_answers: usize,
    /// Duration of the analysis in seconds.
    pub duration_seconds: f64,
}

/// The complete analysis report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    /// Absent when the log contained no LLM calls.
    pub unified: Option<UnifiedAnalysis>,
    pub token_usage: Vec<TokenRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_usage_cost() {
        let usage = TokenUsage {
            prompt_tokens: 1000,
            completion_tokens: 500,
            total_tokens: 1500,
        };
        let cost = usage.cost(&PricingConfig::default());
        assert!((cost - (1000.0 * 1.5e-7 + 500.0 * 6e-7)).abs() < 1e-12);
    }

    #[test]
    fn test_token_usage_partial_json() {
        let usage: TokenUsage = serde_json::from_str(r#"{"prompt_tokens": 7}"#).unwrap();
        assert_eq!(usage.prompt_tokens, 7);
        assert_eq!(usage.total_tokens, 0);
        assert!(!usage.is_empty());
        assert!(TokenUsage::default().is_empty());
    }

    #[test]
    fn test_has_final_answer() {
        let mut block = ParsedBlock::new(1);
        assert!(!block.has_final_answer());
        block.final_answer = Some(String::new());
        assert!(!block.has_final_answer());
        block.final_answer = Some("42".to_string());
        assert!(block.has_final_answer());
    }

    #[test]
    fn test_task_metrics_labels() {
        let mut metrics = TaskMetrics {
            final_answers: 1,
            block_count: 3,
            tools: vec![("Search".to_string(), 2), ("Scrape".to_string(), 1)],
            ..Default::default()
        };
        assert_eq!(metrics.model_label(), "unknown");
        assert_eq!(metrics.tools_label(), "Search(2), Scrape(1)");
        assert_eq!(metrics.final_answer_label(), "1/3");

        metrics.models.insert("gpt-4o".to_string());
        metrics.models.insert("gpt-4o-mini".to_string());
        assert_eq!(metrics.model_label(), "gpt-4o, gpt-4o-mini");
    }

    #[test]
    fn test_log_mode_serialization() {
        assert_eq!(serde_json::to_string(&LogMode::Raw).unwrap(), "\"raw\"");
        assert_eq!(LogMode::Filtered.to_string(), "Filtered");
    }
}
