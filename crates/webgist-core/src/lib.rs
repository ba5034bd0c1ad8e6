use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("llm failed: {0}")]
    Llm(String),
    #[error("telemetry failed: {0}")]
    Telemetry(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Which completion contract the pipeline uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Free-text answer only.
    #[default]
    Plain,
    /// Strict JSON with `reasoning`, `intermediate_steps` and `answer`.
    Reasoning,
}

impl CaptureMode {
    pub fn from_flag(enabled: bool) -> Self {
        if enabled {
            Self::Reasoning
        } else {
            Self::Plain
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Reasoning => "reasoning",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    /// Timeout for the operation (connect + body).
    pub timeout_ms: Option<u64>,
    /// Hard cap on bytes read from the response body.
    pub max_bytes: Option<u64>,
    /// Optional headers to add (best-effort; adapter may drop unsafe headers).
    pub headers: BTreeMap<String, String>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_ms: None,
            max_bytes: None,
            headers: BTreeMap::new(),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub truncated: bool,
    pub elapsed_ms: u128,
}

impl FetchResponse {
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).to_string()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Retrieves page bytes. Non-2xx statuses are returned as responses, not errors.
#[async_trait::async_trait]
pub trait FetchBackend: Send + Sync {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub temperature: f64,
    pub max_tokens: u64,
    /// Ask the provider to constrain output to a JSON object.
    pub json_object: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatReply {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    /// Model identifier sent with every request (and recorded on generations).
    fn model(&self) -> &str;
    async fn chat(&self, req: &ChatRequest) -> Result<ChatReply>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObservationId(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationKind {
    Span,
    Generation,
}

/// Severity attached to a closed observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObservationLevel {
    Debug,
    #[default]
    Default,
    Warning,
    Error,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceStart {
    pub name: String,
    pub input: Option<serde_json::Value>,
    pub output: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationStart {
    pub trace_id: TraceId,
    pub parent_id: Option<ObservationId>,
    pub kind: ObservationKind,
    pub name: String,
    pub input: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
    /// Generations only.
    pub model: Option<String>,
    /// Generations only.
    pub model_parameters: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationEnd {
    pub trace_id: TraceId,
    pub id: ObservationId,
    pub kind: ObservationKind,
    pub output: Option<serde_json::Value>,
    pub level: ObservationLevel,
    pub status_message: Option<String>,
    pub usage: Option<TokenUsage>,
}

/// Sink for traces, spans and generations.
///
/// Creation and closing are synchronous (implementations buffer); only
/// `flush` performs IO. Callers treat every error as non-fatal.
#[async_trait::async_trait]
pub trait TelemetryRecorder: Send + Sync {
    fn create_trace(&self, trace: TraceStart) -> Result<TraceId>;
    fn update_trace(&self, id: &TraceId, output: serde_json::Value) -> Result<()>;
    fn start_observation(&self, obs: ObservationStart) -> Result<ObservationId>;
    fn end_observation(&self, end: ObservationEnd) -> Result<()>;
    async fn flush(&self) -> Result<()>;
}
