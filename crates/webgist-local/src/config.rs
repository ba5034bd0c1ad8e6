use crate::langfuse::{LangfuseConfig, DEFAULT_HOST as LANGFUSE_DEFAULT_HOST};
use crate::openai::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use std::time::Duration;
use webgist_core::{CaptureMode, Error, Result};

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Process configuration, read once at startup and never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,
    pub capture_mode: CaptureMode,
    pub fetch_timeout: Duration,
    pub completion_timeout: Duration,
    /// `None` when Langfuse credentials are absent.
    pub langfuse: Option<LangfuseConfig>,
}

// Secrets stay out of `{:?}` output.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("openai_model", &self.openai_model)
            .field("openai_base_url", &self.openai_base_url)
            .field("capture_mode", &self.capture_mode)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("completion_timeout", &self.completion_timeout)
            .field(
                "langfuse_host",
                &self.langfuse.as_ref().map(|l| l.host.as_str()),
            )
            .finish()
    }
}

/// `1/true/yes/on`, case-insensitive.
pub fn parse_bool_flag(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary variable source (tests, env files).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |k: &str| {
            lookup(k)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        let get_ms = |k: &str, default_ms: u64| -> Result<Duration> {
            match get(k) {
                None => Ok(Duration::from_millis(default_ms)),
                Some(s) => s
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|_| Error::NotConfigured(format!("{k} must be an integer (ms), got {s:?}"))),
            }
        };

        let openai_api_key = get(OPENAI_API_KEY_ENV)
            .ok_or_else(|| Error::NotConfigured(format!("missing {OPENAI_API_KEY_ENV}")))?;

        let langfuse = match (get("LANGFUSE_PUBLIC_KEY"), get("LANGFUSE_SECRET_KEY")) {
            (Some(public_key), Some(secret_key)) => Some(LangfuseConfig {
                host: get("LANGFUSE_HOST").unwrap_or_else(|| LANGFUSE_DEFAULT_HOST.to_string()),
                public_key,
                secret_key,
                flush_timeout: get_ms("WEBGIST_TELEMETRY_TIMEOUT_MS", 5_000)?,
            }),
            _ => None,
        };

        Ok(Self {
            openai_api_key,
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            capture_mode: CaptureMode::from_flag(
                get("LANGFUSE_CAPTURE_COT")
                    .map(|s| parse_bool_flag(&s))
                    .unwrap_or(false),
            ),
            fetch_timeout: get_ms("WEBGIST_FETCH_TIMEOUT_MS", 15_000)?,
            completion_timeout: get_ms("WEBGIST_LLM_TIMEOUT_MS", 60_000)?,
            langfuse,
        })
    }
}
