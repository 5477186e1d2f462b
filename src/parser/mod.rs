//! Block parser for CrewAI/litellm console logs.
//!
//! Splits a (filtered or raw) log into LLM call blocks and extracts the
//! task, model, timing, token usage and reasoning steps of each call.

pub mod extract;

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, trace, warn};

use crate::config::PricingConfig;
use crate::models::{ParsedBlock, TokenRecord};
use extract::{
    decode_response_payload, extract_model_name, extract_reasoning, extract_task_hint,
    extract_timestamp, extract_token_usage, message_content, ResponsePayload, RESPONSE_MARKER,
};

/// Marker that opens a new LLM call.
pub const REQUEST_MARKER: &str = "Request to litellm:";

const API_ERROR_MARKER: &str = "APIStatusError";

/// Everything recovered from one log.
#[derive(Debug, Clone, Default)]
pub struct ParsedLog {
    pub blocks: Vec<ParsedBlock>,
    /// Token usage of every call that reported it, in log order.
    pub token_records: Vec<TokenRecord>,
}

impl ParsedLog {
    pub fn parsing_errors(&self) -> usize {
        self.blocks.iter().filter(|b| b.parsing_error).count()
    }

    pub fn final_answers(&self) -> usize {
        self.blocks.iter().filter(|b| b.has_final_answer()).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Request,
    Response,
}

/// Parse the log file at `path`.
pub fn parse_log_file(path: &Path, pricing: &PricingConfig) -> Result<ParsedLog> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read log file: {}", path.display()))?;
    Ok(parse_log(&content, pricing))
}

/// Parse log text into LLM call blocks.
pub fn parse_log(content: &str, pricing: &PricingConfig) -> ParsedLog {
    let mut blocks = split_blocks(content);
    debug!("Detected {} LLM call blocks", blocks.len());

    let mut token_records = Vec::new();
    for block in &mut blocks {
        enrich_block(block);

        if let Some(usage) = block.usage {
            trace!("Token usage for step {}: {:?}", block.step, usage);
            token_records.push(TokenRecord {
                step: block.step,
                task_hint: block.task_hint.clone(),
                model: block.model.clone().unwrap_or_else(|| "unknown".to_string()),
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
                cost_usd: usage.cost(pricing),
            });
        }
    }

    ParsedLog {
        blocks,
        token_records,
    }
}

/// Cut the log into request/response sections. Lines before the first
/// request are ignored.
fn split_blocks(content: &str) -> Vec<ParsedBlock> {
    let mut blocks: Vec<ParsedBlock> = Vec::new();
    let mut current: Option<ParsedBlock> = None;
    let mut section = Section::Request;

    for line in content.lines() {
        if line.contains(REQUEST_MARKER) {
            if let Some(done) = current.take() {
                blocks.push(done);
            }
            let mut block = ParsedBlock::new(blocks.len() + 1);
            block.start_time = extract_timestamp(line);
            push_line(&mut block.request, line);
            current = Some(block);
            section = Section::Request;
            continue;
        }

        let Some(block) = current.as_mut() else {
            continue;
        };

        if line.contains(RESPONSE_MARKER) {
            section = Section::Response;
            push_line(&mut block.response, line);
        } else if line.contains(API_ERROR_MARKER) {
            block.api_errors.push(line.trim().to_string());
        } else {
            match section {
                Section::Request => push_line(&mut block.request, line),
                Section::Response => push_line(&mut block.response, line),
            }
        }
    }

    if let Some(done) = current {
        blocks.push(done);
    }

    blocks
}

fn push_line(buf: &mut String, line: &str) {
    buf.push_str(line);
    buf.push('\n');
}

/// Fill in the derived fields of a block from its raw sections.
fn enrich_block(block: &mut ParsedBlock) {
    block.task_hint = extract_task_hint(&block.request);
    block.model =
        extract_model_name(&block.request).or_else(|| extract_model_name(&block.response));
    block.usage = extract_token_usage(&block.response);

    let steps = match decode_response_payload(&block.response) {
        ResponsePayload::Decoded(payload) => {
            // Decoded content first: raw text holds escaped `\n`, so a
            // raw-first scan runs `Action:` into `Action Input:`.
            let from_content = message_content(&payload).map(extract_reasoning);
            match from_content {
                Some(steps) if !steps.is_empty() => steps,
                _ => extract_reasoning(&block.response),
            }
        }
        ResponsePayload::Malformed => {
            warn!(
                "Step {}: response JSON could not be decoded, scanning raw text",
                block.step
            );
            block.parsing_error = true;
            extract_reasoning(&block.response)
        }
        ResponsePayload::Absent => extract_reasoning(&block.response),
    };

    block.thought = steps.thought;
    block.action = steps.action;
    block.final_answer = steps.final_answer;
    trace!(
        "Step {}: thought={:?} action={:?} api_errors={}",
        block.step,
        block.thought,
        block.action,
        block.api_errors.len()
    );
}
