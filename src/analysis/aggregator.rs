//! Per-task aggregation and run statistics.
//!
//! This module groups LLM calls by task and computes the token, cost,
//! timing, completion and tool usage figures shown in the reports.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::warn;

use super::timing::response_times;
use crate::config::PricingConfig;
use crate::models::{
    ParsedBlock, TaskCompletion, TaskMetrics, TaskTotals, UnifiedAnalysis, UNKNOWN_TASK,
};

static TOOL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\s*(?:\\n|\()").expect("invalid tool name pattern"));

/// Clean tool name from an `Action:` value: the text before a literal `\n`
/// or an opening parenthesis.
pub fn extract_tool_name(action: &str) -> String {
    match TOOL_NAME.captures(action) {
        Some(caps) => caps[1].trim().to_string(),
        None => action.trim().to_string(),
    }
}

/// Shorten a task hint to `max_chars` characters, ending in `...` when cut.
pub fn truncate_task_hint(hint: &str, max_chars: usize) -> String {
    if hint.is_empty() {
        return UNKNOWN_TASK.to_string();
    }
    if hint.chars().count() > max_chars {
        let kept: String = hint.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        hint.to_string()
    }
}

/// Single-line version of a task hint for per-call listings.
pub fn clean_task_hint(hint: &str) -> String {
    if hint.is_empty() {
        return UNKNOWN_TASK.to_string();
    }
    let collapsed = hint
        .replace(['\n', '\t'], " ")
        .split(' ')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    truncate_task_hint(&collapsed, 80)
}

/// Sort `(name, count)` pairs by count, most used first, then by name.
fn sort_by_usage(counts: HashMap<String, usize>) -> Vec<(String, usize)> {
    let mut sorted: Vec<_> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted
}

/// Group calls by truncated task hint and aggregate their metrics.
///
/// Returns `None` when there are no calls.
pub fn unified_analysis(
    blocks: &[ParsedBlock],
    pricing: &PricingConfig,
    task_hint_width: usize,
) -> Option<UnifiedAnalysis> {
    if blocks.is_empty() {
        warn!("No LLM calls found, nothing to analyze");
        return None;
    }

    let times = response_times(blocks);
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, TaskMetrics> = HashMap::new();
    let mut tool_counts: HashMap<String, HashMap<String, usize>> = HashMap::new();
    let mut overall_tools: HashMap<String, usize> = HashMap::new();

    for block in blocks {
        let key = truncate_task_hint(&block.task_hint, task_hint_width);
        let group = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            TaskMetrics {
                first_step: block.step,
                task: key.clone(),
                ..Default::default()
            }
        });

        group.first_step = group.first_step.min(block.step);
        if let Some(ref model) = block.model {
            group.models.insert(model.clone());
        }

        let usage = block.usage.unwrap_or_default();
        group.prompt_tokens = group.prompt_tokens.saturating_add(usage.prompt_tokens);
        group.completion_tokens = group
            .completion_tokens
            .saturating_add(usage.completion_tokens);
        group.total_tokens = group.total_tokens.saturating_add(usage.total_tokens);
        group.cost_usd += usage.cost(pricing);

        if let Some(secs) = times.get(&block.step) {
            group.response_time_secs += secs;
        }

        if block.has_final_answer() {
            group.final_answers += 1;
        }
        group.block_count += 1;

        if let Some(ref action) = block.action {
            let tool = extract_tool_name(action);
            if !tool.is_empty() {
                *tool_counts
                    .entry(key.clone())
                    .or_default()
                    .entry(tool.clone())
                    .or_insert(0) += 1;
                *overall_tools.entry(tool).or_insert(0) += 1;
            }
        }
    }

    let mut tasks: Vec<TaskMetrics> = order
        .into_iter()
        .filter_map(|key| {
            let mut metrics = groups.remove(&key)?;
            metrics.tools = sort_by_usage(tool_counts.remove(&key).unwrap_or_default());
            Some(metrics)
        })
        .collect();
    tasks.sort_by_key(|t| t.first_step);

    let totals = tasks.iter().fold(TaskTotals::default(), |mut acc, t| {
        acc.prompt_tokens = acc.prompt_tokens.saturating_add(t.prompt_tokens);
        acc.completion_tokens = acc.completion_tokens.saturating_add(t.completion_tokens);
        acc.total_tokens = acc.total_tokens.saturating_add(t.total_tokens);
        acc.cost_usd += t.cost_usd;
        acc.response_time_secs += t.response_time_secs;
        acc.final_answers += t.final_answers;
        acc.block_count += t.block_count;
        acc
    });

    Some(UnifiedAnalysis {
        tasks,
        totals,
        tool_usage: sort_by_usage(overall_tools),
    })
}

/// Whether each call produced a final answer.
pub fn task_completion(blocks: &[ParsedBlock]) -> Vec<TaskCompletion> {
    blocks
        .iter()
        .map(|b| TaskCompletion {
            step: b.step,
            task_hint: clean_task_hint(&b.task_hint),
            completed: b.has_final_answer(),
        })
        .collect()
}

/// Completed calls over all calls, as a percentage.
pub fn completion_rate(completions: &[TaskCompletion]) -> Option<f64> {
    if completions.is_empty() {
        return None;
    }
    let done = completions.iter().filter(|c| c.completed).count();
    Some(done as f64 / completions.len() as f64 * 100.0)
}

/// Tool usage across all calls, most used first.
pub fn tool_usage(blocks: &[ParsedBlock]) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for action in blocks.iter().filter_map(|b| b.action.as_deref()) {
        let tool = extract_tool_name(action);
        if !tool.is_empty() {
            *counts.entry(tool).or_default() += 1;
        }
    }
    sort_by_usage(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TokenUsage;
    use chrono::NaiveDateTime;

    fn create_test_block(step: usize, task: &str, ts: &str) -> ParsedBlock {
        let mut block = ParsedBlock::new(step);
        block.task_hint = task.to_string();
        block.start_time = Some(NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S").unwrap());
        block
    }

    fn usage(prompt: u64, completion: u64) -> Option<TokenUsage> {
        Some(TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        })
    }

    #[test]
    fn test_extract_tool_name() {
        assert_eq!(extract_tool_name("Search Tool"), "Search Tool");
        assert_eq!(extract_tool_name("  Search Tool  "), "Search Tool");
        assert_eq!(
            extract_tool_name(r"Read File\nAction Input: {}"),
            "Read File"
        );
        assert_eq!(extract_tool_name("Calculator (math)"), "Calculator");
        assert_eq!(extract_tool_name(""), "");
    }

    #[test]
    fn test_truncate_task_hint() {
        assert_eq!(truncate_task_hint("", 40), UNKNOWN_TASK);
        assert_eq!(truncate_task_hint("short", 40), "short");
        let exact = "x".repeat(40);
        assert_eq!(truncate_task_hint(&exact, 40), exact);
        assert_eq!(
            truncate_task_hint("Analyze the competitive landscape for electric scooters", 40),
            "Analyze the competitive landscape for..."
        );
    }

    #[test]
    fn test_clean_task_hint() {
        assert_eq!(clean_task_hint("a\n\tb   c"), "a b c");
        assert_eq!(clean_task_hint(""), UNKNOWN_TASK);
        assert_eq!(clean_task_hint(&"w ".repeat(60)).chars().count(), 80);
    }

    #[test]
    fn test_unified_analysis_groups_by_task() {
        let mut b1 = create_test_block(1, "Research", "2025-04-02 10:00:00");
        b1.model = Some("gpt-4o-mini".to_string());
        b1.usage = usage(100, 50);
        b1.action = Some("Search Tool".to_string());

        let mut b2 = create_test_block(2, "Research", "2025-04-02 10:00:20");
        b2.model = Some("gpt-4o".to_string());
        b2.usage = usage(200, 100);
        b2.final_answer = Some("done".to_string());

        let mut b3 = create_test_block(3, "Write", "2025-04-02 10:00:50");
        b3.action = Some("Search Tool".to_string());

        let pricing = PricingConfig::default();
        let analysis = unified_analysis(&[b1, b2, b3], &pricing, 40).unwrap();
        assert_eq!(analysis.tasks.len(), 2);

        let research = &analysis.tasks[0];
        assert_eq!(research.task, "Research");
        assert_eq!(research.first_step, 1);
        assert_eq!(research.model_label(), "gpt-4o, gpt-4o-mini");
        assert_eq!(research.prompt_tokens, 300);
        assert_eq!(research.completion_tokens, 150);
        assert_eq!(research.total_tokens, 450);
        assert!((research.cost_usd - (300.0 * 1.5e-7 + 150.0 * 6e-7)).abs() < 1e-12);
        assert_eq!(research.response_time_secs, 20.0);
        assert_eq!(research.final_answer_label(), "1/2");
        assert_eq!(research.tools_label(), "Search Tool(1)");

        let write = &analysis.tasks[1];
        assert_eq!(write.first_step, 3);
        assert_eq!(write.model_label(), "unknown");
        assert_eq!(write.response_time_secs, 30.0);

        assert_eq!(analysis.totals.total_tokens, 450);
        assert_eq!(analysis.totals.response_time_secs, 50.0);
        assert_eq!(analysis.totals.final_answers, 1);
        assert_eq!(analysis.totals.block_count, 3);
        assert_eq!(analysis.tool_usage, vec![("Search Tool".to_string(), 2)]);
    }

    #[test]
    fn test_unified_analysis_truncated_hints_share_a_group() {
        let long_a = format!("{} alpha", "y".repeat(50));
        let long_b = format!("{} beta", "y".repeat(50));
        let blocks = vec![
            create_test_block(1, &long_a, "2025-04-02 10:00:00"),
            create_test_block(2, &long_b, "2025-04-02 10:00:01"),
        ];
        let analysis = unified_analysis(&blocks, &PricingConfig::default(), 40).unwrap();
        assert_eq!(analysis.tasks.len(), 1);
        assert_eq!(analysis.tasks[0].block_count, 2);
        assert!(analysis.tasks[0].task.ends_with("..."));
    }

    #[test]
    fn test_unified_analysis_token_sums_saturate() {
        let huge = Some(TokenUsage {
            prompt_tokens: u64::MAX - 1,
            completion_tokens: u64::MAX - 1,
            total_tokens: u64::MAX - 1,
        });
        let mut b1 = create_test_block(1, "A", "2025-04-02 10:00:00");
        b1.usage = huge;
        let mut b2 = create_test_block(2, "A", "2025-04-02 10:00:01");
        b2.usage = huge;
        let mut b3 = create_test_block(3, "B", "2025-04-02 10:00:02");
        b3.usage = usage(10, 5);

        let analysis = unified_analysis(&[b1, b2, b3], &PricingConfig::default(), 40).unwrap();
        assert_eq!(analysis.tasks[0].prompt_tokens, u64::MAX);
        assert_eq!(analysis.tasks[0].total_tokens, u64::MAX);
        assert_eq!(analysis.tasks[1].total_tokens, 15);
        assert_eq!(analysis.totals.completion_tokens, u64::MAX);
        assert_eq!(analysis.totals.total_tokens, u64::MAX);
    }

    #[test]
    fn test_unified_analysis_empty() {
        assert!(unified_analysis(&[], &PricingConfig::default(), 40).is_none());
    }

    #[test]
    fn test_task_completion_and_rate() {
        let mut done = create_test_block(1, "A", "2025-04-02 10:00:00");
        done.final_answer = Some("ok".to_string());
        let pending = create_test_block(2, "B", "2025-04-02 10:00:01");

        let completions = task_completion(&[done, pending]);
        assert!(completions[0].completed);
        assert!(!completions[1].completed);
        assert_eq!(completion_rate(&completions), Some(50.0));
        assert_eq!(completion_rate(&[]), None);
    }

    #[test]
    fn test_tool_usage_sorted() {
        let mut blocks = Vec::new();
        for (step, tool) in ["Scrape", "Search", "Search", "Alpha"].iter().enumerate() {
            let mut b = create_test_block(step + 1, "T", "2025-04-02 10:00:00");
            b.action = Some(tool.to_string());
            blocks.push(b);
        }
        blocks.push(create_test_block(5, "T", "2025-04-02 10:00:00"));

        assert_eq!(
            tool_usage(&blocks),
            vec![
                ("Search".to_string(), 2),
                ("Alpha".to_string(), 1),
                ("Scrape".to_string(), 1),
            ]
        );
    }
}
