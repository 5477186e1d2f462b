//! Field extraction from request/response sections.
//!
//! Every extractor is best-effort: it tries a list of patterns in order and
//! returns the first hit, or `None`.

use chrono::NaiveDateTime;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::trace;

use crate::models::{TokenUsage, UNKNOWN_TASK};

/// Marker that opens the response section of an LLM call.
pub const RESPONSE_MARKER: &str = "RAW RESPONSE:";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})").expect("invalid timestamp pattern")
});

static CURRENT_TASK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Current Task: ([^\n]*)").expect("invalid task pattern"));

static MESSAGES_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)messages=(\[.*\])").expect("invalid messages pattern"));

static MESSAGE_CONTENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""content":\s*"([^"]*)""#).expect("invalid message content pattern")
});

static ESCAPED_TASK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Task:(.*?)(?:\\n|$)").expect("invalid escaped task pattern")
});

static LABELED_TASK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)[Tt]ask:?\s+(.*?)(?:\n|$)").expect("invalid labeled task pattern")
});

static VERB_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:Analyze|Calculate|Process|Generate|Create|Determine|Evaluate|Find|Identify|Extract)\s",
    )
    .expect("invalid verb pattern")
});

static MODEL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"model="([^"]+)""#,
        r"model='([^']+)'",
        r"model=([a-zA-Z0-9\-\.]+)",
        r#""model":\s*"([^"]+)""#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid model pattern"))
    .collect()
});

static USAGE_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""usage":\s*(\{[^}]*\})"#).expect("invalid usage pattern"));

static PROMPT_TOKENS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""prompt_tokens":\s*(\d+)"#).expect("invalid token pattern"));

static COMPLETION_TOKENS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""completion_tokens":\s*(\d+)"#).expect("invalid token pattern")
});

static TOTAL_TOKENS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""total_tokens":\s*(\d+)"#).expect("invalid token pattern"));

static FIRST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("invalid number pattern"));

static FINAL_ANSWER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Final Answer:(.*?)(?:\n\n|$)").expect("invalid final answer pattern")
});

static ACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Action:([^\n]*)").expect("invalid action pattern"));

static THOUGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Thought:([^\n]*)").expect("invalid thought pattern"));

/// Leading `YYYY-MM-DD HH:MM:SS` timestamp of a line.
pub fn extract_timestamp(line: &str) -> Option<NaiveDateTime> {
    let raw = TIMESTAMP.captures(line)?.get(1)?.as_str();
    match NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT) {
        Ok(ts) => Some(ts),
        Err(e) => {
            trace!("Ignoring invalid timestamp '{}': {}", raw, e);
            None
        }
    }
}

/// Find the task an LLM request was working on.
pub fn extract_task_hint(request: &str) -> String {
    if let Some(caps) = CURRENT_TASK.captures(request) {
        return caps[1].trim().to_string();
    }

    // Task label inside the first message content of a messages=[...] list.
    if let Some(messages) = MESSAGES_LIST.captures(request) {
        if let Some(content) = MESSAGE_CONTENT.captures(&messages[1]) {
            if let Some(task) = ESCAPED_TASK.captures(&content[1]) {
                return task[1].trim().to_string();
            }
        }
    }

    if let Some(caps) = LABELED_TASK.captures(request) {
        return caps[1].trim().to_string();
    }

    request
        .lines()
        .find(|line| VERB_LINE.is_match(line))
        .map(|line| line.trim().to_string())
        .unwrap_or_else(|| UNKNOWN_TASK.to_string())
}

/// Model name from `model=...` or `"model": "..."` fragments.
pub fn extract_model_name(text: &str) -> Option<String> {
    MODEL_PATTERNS
        .iter()
        .find_map(|re| re.captures(text).map(|caps| caps[1].to_string()))
}

/// Token counts from a raw response section.
pub fn extract_token_usage(response: &str) -> Option<TokenUsage> {
    if let Some(caps) = USAGE_OBJECT.captures(response) {
        if let Ok(usage) = serde_json::from_str::<TokenUsage>(&caps[1]) {
            if !usage.is_empty() {
                return Some(usage);
            }
        }
    }

    let capture = |re: &Regex| -> Option<u64> { re.captures(response)?[1].parse().ok() };
    if let (Some(prompt), Some(completion), Some(total)) = (
        capture(&PROMPT_TOKENS),
        capture(&COMPLETION_TOKENS),
        capture(&TOTAL_TOKENS),
    ) {
        return Some(TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: total,
        });
    }

    // Last resort: the first number on each line naming a counter. Later
    // lines overwrite earlier ones.
    let mut usage = TokenUsage::default();
    for line in response.lines() {
        let first_number = || -> Option<u64> { FIRST_NUMBER.find(line)?.as_str().parse().ok() };
        if line.contains("\"prompt_tokens\"") {
            if let Some(n) = first_number() {
                usage.prompt_tokens = n;
            }
        }
        if line.contains("\"completion_tokens\"") {
            if let Some(n) = first_number() {
                usage.completion_tokens = n;
            }
        }
        if line.contains("\"total_tokens\"") {
            if let Some(n) = first_number() {
                usage.total_tokens = n;
            }
        }
    }

    if usage.is_empty() {
        return None;
    }
    if usage.total_tokens == 0 && usage.prompt_tokens > 0 && usage.completion_tokens > 0 {
        usage.total_tokens = usage.prompt_tokens.saturating_add(usage.completion_tokens);
    }
    Some(usage)
}

/// Outcome of decoding the JSON payload that follows `RAW RESPONSE:`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    /// No `{` after the marker.
    Absent,
    /// A JSON value was decoded.
    Decoded(Value),
    /// A `{` was present but no JSON value could be read from it.
    Malformed,
}

/// Decode the first JSON value after the response marker. Trailing text
/// (tool dumps printed after the response) is ignored.
pub fn decode_response_payload(response: &str) -> ResponsePayload {
    let body = match response.split_once(RESPONSE_MARKER) {
        Some((_, rest)) => rest,
        None => response,
    };

    let Some(start) = body.find('{') else {
        return ResponsePayload::Absent;
    };

    let mut stream = serde_json::Deserializer::from_str(&body[start..]).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) => ResponsePayload::Decoded(value),
        _ => ResponsePayload::Malformed,
    }
}

/// Assistant message text of a chat completion payload.
pub fn message_content(payload: &Value) -> Option<&str> {
    payload
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
}

/// Thought, action and final answer found in `text`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReasoningSteps {
    pub thought: Option<String>,
    pub action: Option<String>,
    pub final_answer: Option<String>,
}

impl ReasoningSteps {
    pub fn is_empty(&self) -> bool {
        self.thought.is_none() && self.action.is_none() && self.final_answer.is_none()
    }
}

/// Pull `Thought:`, `Action:` and `Final Answer:` sections out of `text`.
/// Empty captures count as absent.
pub fn extract_reasoning(text: &str) -> ReasoningSteps {
    let grab = |re: &Regex| {
        re.captures(text)
            .map(|caps| caps[1].trim().to_string())
            .filter(|s| !s.is_empty())
    };

    ReasoningSteps {
        thought: grab(&THOUGHT),
        action: grab(&ACTION),
        final_answer: grab(&FINAL_ANSWER),
    }
}
