use serde::Serialize;
use webgist_core::CaptureMode;

pub const SYSTEM_PROMPT: &str = "You are a precise web analyst. Use only the provided content. \
If information is missing, say so clearly. Keep answers concise.";

const PLAIN_INSTRUCTIONS: &str = "Provide a clear, factual, carefully structured answer.";

const REASONING_INSTRUCTIONS: &str = "Respond with a single JSON object with exactly these keys:\n\
- \"reasoning\": your multi-step internal rationale. It is recorded for review and is never shown \
to the end user. Do not include credentials, API keys, email addresses or other personal data.\n\
- \"intermediate_steps\": optional array of objects {\"step\": <integer>, \"thought\": <string>}, \
in order.\n\
- \"answer\": the user-facing answer, 1-3 short paragraphs.\n\
The JSON must be syntactically valid. Each of \"reasoning\", \"intermediate_steps\" and \"answer\" \
must appear exactly once; do not duplicate a key or copy the page content into any field.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

pub fn build_prompts(content: &str, question: &str, mode: CaptureMode) -> PromptPair {
    let instructions = match mode {
        CaptureMode::Plain => PLAIN_INSTRUCTIONS,
        CaptureMode::Reasoning => REASONING_INSTRUCTIONS,
    };
    let user = format!(
        "Below is content scraped from a public website.\n\n\
         Content:\n{content}\n\n\
         User question:\n{question}\n\n\
         {instructions}"
    );
    PromptPair {
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}
