use crate::prompt::PromptPair;
use webgist_core::{CaptureMode, ChatBackend, ChatRequest, Result, TokenUsage};

pub const TEMPERATURE: f64 = 0.2;
pub const PLAIN_MAX_TOKENS: u64 = 1_024;
/// Reasoning replies carry the rationale as well as the answer.
pub const REASONING_MAX_TOKENS: u64 = 2_048;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionOutcome {
    pub answer: String,
    pub reasoning: Option<String>,
    pub steps: Option<Vec<serde_json::Value>>,
    pub usage: Option<TokenUsage>,
}

pub fn chat_request(prompts: &PromptPair, mode: CaptureMode) -> ChatRequest {
    let (max_tokens, json_object) = match mode {
        CaptureMode::Plain => (PLAIN_MAX_TOKENS, false),
        CaptureMode::Reasoning => (REASONING_MAX_TOKENS, true),
    };
    ChatRequest {
        system: prompts.system.clone(),
        user: prompts.user.clone(),
        temperature: TEMPERATURE,
        max_tokens,
        json_object,
    }
}

/// One completion call. Transport failures surface as `Error::Llm`; a reply
/// that is not the requested JSON is not an error (see [`parse_reasoning_reply`]).
pub async fn complete(
    backend: &dyn ChatBackend,
    prompts: &PromptPair,
    mode: CaptureMode,
) -> Result<CompletionOutcome> {
    let reply = backend.chat(&chat_request(prompts, mode)).await?;
    let mut out = match mode {
        CaptureMode::Plain => CompletionOutcome {
            answer: reply.content,
            ..Default::default()
        },
        CaptureMode::Reasoning => parse_reasoning_reply(&reply.content),
    };
    out.usage = reply.usage;
    Ok(out)
}

fn value_to_text(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Decode a JSON-mode reply. Anything that is not a JSON object becomes the
/// answer verbatim, with no reasoning or steps.
pub fn parse_reasoning_reply(raw: &str) -> CompletionOutcome {
    let Ok(serde_json::Value::Object(obj)) = serde_json::from_str::<serde_json::Value>(raw) else {
        return CompletionOutcome {
            answer: raw.to_string(),
            ..Default::default()
        };
    };
    CompletionOutcome {
        answer: obj.get("answer").and_then(value_to_text).unwrap_or_default(),
        reasoning: obj.get("reasoning").and_then(value_to_text),
        steps: match obj.get("intermediate_steps") {
            Some(serde_json::Value::Array(steps)) => Some(steps.clone()),
            _ => None,
        },
        usage: None,
    }
}
