//! Console tables and Markdown/JSON report generation.
//!
//! This module renders the analysis results as plain-text tables for the
//! terminal and as a Markdown or JSON report file.

use crate::analysis::{completion_rate, ordered_response_times, truncate_task_hint};
use crate::models::{
    ParsedBlock, Report, ReportMetadata, TaskCompletion, TokenRecord, UnifiedAnalysis,
};
use anyhow::Result;

/// Format a USD amount: six decimals below one cent, four otherwise.
pub fn format_cost(cost: f64) -> String {
    if cost.abs() < 0.01 {
        format!("{:.6}", cost)
    } else {
        format!("{:.4}", cost)
    }
}

/// Blank for zero, otherwise seconds with two decimals.
fn format_seconds(secs: f64) -> String {
    if secs > 0.0 {
        format!("{:.2}", secs)
    } else {
        String::new()
    }
}

/// Left-justified text table sized to its widest cells.
fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let format_row = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut table = String::new();
    table.push_str(&format_row(headers.to_vec()));
    table.push('\n');
    for row in rows {
        table.push_str(&format_row(row.iter().map(String::as_str).collect()));
        table.push('\n');
    }
    table
}

const UNIFIED_HEADERS: [&str; 10] = [
    "Step",
    "Task",
    "Model",
    "Prompt Tokens",
    "Completion Tokens",
    "Total Tokens",
    "Cost (USD)",
    "Response Time (s)",
    "Final Answer",
    "Tool Used",
];

/// Rows of the unified table, ending with the TOTAL row.
fn unified_rows(analysis: &UnifiedAnalysis) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = analysis
        .tasks
        .iter()
        .map(|t| {
            vec![
                t.first_step.to_string(),
                t.task.clone(),
                t.model_label(),
                t.prompt_tokens.to_string(),
                t.completion_tokens.to_string(),
                t.total_tokens.to_string(),
                format_cost(t.cost_usd),
                format_seconds(t.response_time_secs),
                t.final_answer_label(),
                t.tools_label(),
            ]
        })
        .collect();

    let totals = &analysis.totals;
    rows.push(vec![
        String::new(),
        "TOTAL".to_string(),
        String::new(),
        totals.prompt_tokens.to_string(),
        totals.completion_tokens.to_string(),
        totals.total_tokens.to_string(),
        format_cost(totals.cost_usd),
        format_seconds(totals.response_time_secs),
        format!("{}/{}", totals.final_answers, totals.block_count),
        String::new(),
    ]);
    rows
}

/// Unified per-task table followed by the overall tool usage summary.
pub fn render_unified_table(analysis: &UnifiedAnalysis) -> String {
    let mut output = String::new();

    output.push_str("\n--- Unified Analysis (Tasks Combined) ---\n");
    output.push_str(&render_table(&UNIFIED_HEADERS, &unified_rows(analysis)));

    output.push_str("\n--- Overall Tool Usage Summary ---\n");
    if analysis.tool_usage.is_empty() {
        output.push_str("No tool usage detected.\n");
    } else {
        for (tool, count) in &analysis.tool_usage {
            output.push_str(&format!("Tool: {:35} | Times Used: {}\n", tool, count));
        }
    }

    output
}

/// One row per call that reported token usage.
pub fn render_token_table(records: &[TokenRecord]) -> String {
    let mut output = String::from("\n--- Token Usage Summary ---\n");

    if records.is_empty() {
        output.push_str("No valid token usage could be parsed.\n");
        return output;
    }

    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| {
            vec![
                r.step.to_string(),
                truncate_task_hint(&r.task_hint, 50),
                r.model.clone(),
                r.prompt_tokens.to_string(),
                r.completion_tokens.to_string(),
                r.total_tokens.to_string(),
                format_cost(r.cost_usd),
            ]
        })
        .collect();

    output.push_str(&render_table(
        &[
            "Step",
            "Task",
            "Model",
            "Prompt Tokens",
            "Completion Tokens",
            "Total Tokens",
            "Cost (USD)",
        ],
        &rows,
    ));
    output
}

/// Time between consecutive calls, per call.
pub fn render_response_times(blocks: &[ParsedBlock]) -> String {
    let times = ordered_response_times(blocks);
    if times.is_empty() {
        return "\nNot enough tasks with valid timestamps to analyze response times.\n"
            .to_string();
    }

    let mut output = String::from("\n--- Response Time Analysis ---\n");
    for (step, secs) in times {
        let hint = blocks
            .iter()
            .find(|b| b.step == step)
            .map(|b| truncate_task_hint(&b.task_hint, 50))
            .unwrap_or_default();
        output.push_str(&format!(
            "Task: {:50} | Response Time: {:.2}s\n",
            hint, secs
        ));
    }
    output
}

/// Per-call final answer status and the overall completion rate.
pub fn render_task_completion(completions: &[TaskCompletion]) -> String {
    let mut output = String::from("\n--- Task Completion Metrics ---\n");

    for c in completions {
        let mark = if c.completed { "✅" } else { "❌" };
        output.push_str(&format!(
            "Step {:02}: Task Hint: {:80} | Final Answer: {}\n",
            c.step, c.task_hint, mark
        ));
    }

    if let Some(rate) = completion_rate(completions) {
        let done = completions.iter().filter(|c| c.completed).count();
        output.push_str(&format!(
            "\nTask Completion Rate: {}/{} ({:.1}%)\n",
            done,
            completions.len(),
            rate
        ));
    }
    output
}

/// Tool name and use count lines.
pub fn render_tool_usage(tools: &[(String, usize)]) -> String {
    if tools.is_empty() {
        return "\nNo tool usage data available.\n".to_string();
    }

    let mut output = String::from("\n--- Tool Usage Summary ---\n");
    for (tool, count) in tools {
        output.push_str(&format!("Tool: {} | Times Used: {}\n", tool, count));
    }
    output
}

/// Parsing error and final answer counts.
pub fn render_parsing_summary(metadata: &ReportMetadata) -> String {
    format!(
        "\n--- Parsing Summary ---\n\
         Total parsing errors: {} out of {} calls\n\
         Final answers detected: {} out of {} calls\n",
        metadata.parsing_errors, metadata.llm_calls, metadata.final_answers, metadata.llm_calls
    )
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    output.push_str("# CrewLog Analysis Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_tasks_section(report.unified.as_ref()));
    output.push_str(&generate_tools_section(report.unified.as_ref()));
    output.push_str(&generate_tokens_section(&report.token_usage));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Log File:** `{}`\n", metadata.log_path));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Mode:** {}\n", metadata.mode));
    section.push_str(&format!("- **Lines Read:** {}\n", metadata.lines_read));
    section.push_str(&format!("- **Lines Parsed:** {}\n", metadata.lines_parsed));
    section.push_str(&format!("- **LLM Calls:** {}\n", metadata.llm_calls));
    if metadata.parsing_errors > 0 {
        section.push_str(&format!(
            "- **Parsing Errors:** {}\n",
            metadata.parsing_errors
        ));
    }
    section.push_str(&format!(
        "- **Final Answers:** {}\n",
        metadata.final_answers
    ));
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Markdown table row from cells; pipes in cells are escaped.
fn markdown_row(cells: &[String]) -> String {
    let escaped: Vec<String> = cells.iter().map(|c| c.replace('|', "\\|")).collect();
    format!("| {} |\n", escaped.join(" | "))
}

/// Generate the per-task section.
fn generate_tasks_section(unified: Option<&UnifiedAnalysis>) -> String {
    let mut section = String::from("## Tasks\n\n");

    let Some(analysis) = unified else {
        section.push_str("No LLM calls were detected in this log.\n\n");
        return section;
    };

    let headers: Vec<String> = UNIFIED_HEADERS.iter().map(|h| h.to_string()).collect();
    section.push_str(&markdown_row(&headers));
    section.push_str(&format!("|{}\n", ":---|".repeat(UNIFIED_HEADERS.len())));

    let mut rows = unified_rows(analysis);
    if let Some(total) = rows.last_mut() {
        total[1] = "**TOTAL**".to_string();
    }
    for row in &rows {
        section.push_str(&markdown_row(row));
    }
    section.push('\n');

    section
}

/// Generate the tool usage section.
fn generate_tools_section(unified: Option<&UnifiedAnalysis>) -> String {
    let tools = match unified {
        Some(analysis) if !analysis.tool_usage.is_empty() => &analysis.tool_usage,
        _ => return String::new(),
    };

    let mut section = String::new();
    section.push_str("## Tool Usage\n\n");
    section.push_str("| Tool | Times Used |\n");
    section.push_str("|:---|:---:|\n");
    for (tool, count) in tools {
        section.push_str(&markdown_row(&[tool.clone(), count.to_string()]));
    }
    section.push('\n');

    section
}

/// Generate the per-call token usage section.
fn generate_tokens_section(records: &[TokenRecord]) -> String {
    let mut section = String::from("## Token Usage\n\n");

    if records.is_empty() {
        section.push_str("No token usage was found in the parsed log.\n\n");
        return section;
    }

    section.push_str("| Step | Task | Model | Prompt | Completion | Total | Cost (USD) |\n");
    section.push_str("|:---:|:---|:---|---:|---:|---:|---:|\n");
    for r in records {
        section.push_str(&markdown_row(&[
            r.step.to_string(),
            truncate_task_hint(&r.task_hint, 50),
            r.model.clone(),
            r.prompt_tokens.to_string(),
            r.completion_tokens.to_string(),
            r.total_tokens.to_string(),
            format_cost(r.cost_usd),
        ]));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    "---\n\n*Report generated by CrewLog*\n".to_string()
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
