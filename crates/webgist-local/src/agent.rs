//! The request pipeline: URL → page → paragraphs → prompts → completion.

use crate::completion::{self, CompletionOutcome};
use crate::config::Config;
use crate::openai::OpenAiClient;
use crate::prompt;
use crate::scrape::{self, FetchOutcome};
use crate::scrub;
use crate::telemetry::{ObservationScope, Telemetry, TraceScope};
use crate::urls;
use crate::LocalFetcher;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use webgist_core::{
    CaptureMode, ChatBackend, Error, FetchBackend, ObservationLevel, Result, TraceStart,
};

pub const NO_URL_MESSAGE: &str = "Please provide a valid website URL in your query.";
pub const TRACE_NAME: &str = "web-scraper-respond";

/// What the caller shows the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Response {
    pub url: String,
    pub scraped_text: String,
    pub summary: String,
}

pub struct WebGist {
    fetcher: Arc<dyn FetchBackend>,
    chat: Arc<dyn ChatBackend>,
    telemetry: Telemetry,
    mode: CaptureMode,
    fetch_timeout: Duration,
}

impl WebGist {
    pub fn new(
        fetcher: Arc<dyn FetchBackend>,
        chat: Arc<dyn ChatBackend>,
        telemetry: Telemetry,
        mode: CaptureMode,
    ) -> Self {
        Self {
            fetcher,
            chat,
            telemetry,
            mode,
            fetch_timeout: scrape::DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Real fetcher and OpenAI client from process configuration.
    pub fn from_config(cfg: &Config, telemetry: Telemetry) -> Result<Self> {
        let fetcher = LocalFetcher::new()?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Llm(e.to_string()))?;
        let chat = OpenAiClient::new(
            http,
            cfg.openai_base_url.clone(),
            cfg.openai_api_key.clone(),
            cfg.openai_model.clone(),
            cfg.completion_timeout,
        );
        Ok(
            Self::new(Arc::new(fetcher), Arc::new(chat), telemetry, cfg.capture_mode)
                .with_fetch_timeout(cfg.fetch_timeout),
        )
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    /// Answer one free-form request.
    ///
    /// Fetch failures are not errors: the error line replaces the page text
    /// and the model is still asked. A failed completion is `Err(Error::Llm)`.
    /// Telemetry is flushed before returning on every path that opened a trace.
    pub async fn respond(&self, input: &str) -> Result<Response> {
        let Some(url) = urls::extract_first_url(input) else {
            debug!("no url in request");
            return Ok(Response {
                summary: NO_URL_MESSAGE.to_string(),
                ..Default::default()
            });
        };

        let result = {
            let mut trace = self.telemetry.trace(TraceStart {
                name: TRACE_NAME.to_string(),
                input: Some(json!({ "query": input, "url": url })),
                metadata: Some(json!({ "capture_mode": self.mode.as_str() })),
                tags: vec!["web-scraper".to_string(), self.mode.as_str().to_string()],
                ..Default::default()
            });
            let result = self.run(&trace, input, url).await;
            if let Ok(resp) = &result {
                trace.set_output(json!({ "summary": resp.summary }));
            }
            result
        };
        self.telemetry.flush().await;
        result
    }

    async fn run(&self, trace: &TraceScope, question: &str, url: &str) -> Result<Response> {
        let scraped_text = {
            let mut span = trace.span("scrape_website", Some(json!({ "url": url })), None);
            let outcome = scrape::fetch_page(self.fetcher.as_ref(), url, self.fetch_timeout).await;
            let mut output = match &outcome {
                FetchOutcome::Fetched {
                    status,
                    final_url,
                    truncated,
                    ..
                } => json!({ "status": status, "final_url": final_url, "truncated": truncated }),
                FetchOutcome::Failed(f) => {
                    span.set_level(ObservationLevel::Warning, f.to_string());
                    json!({ "truncated": false })
                }
            };
            let text = outcome.into_content();
            // Page text stays out of telemetry; only its size is recorded.
            output["characters"] = json!(text.chars().count());
            span.set_output(output);
            text
        };

        let prompts = prompt::build_prompts(&scraped_text, question, self.mode);
        let req = completion::chat_request(&prompts, self.mode);
        let mut generation = trace.generation(
            "summarize_content",
            self.chat.model(),
            Some(json!({ "system": prompts.system, "user": prompts.user })),
            Some(json!({ "url": url, "capture_mode": self.mode.as_str() })),
            Some(json!({ "temperature": req.temperature, "max_tokens": req.max_tokens })),
        );

        let outcome = match completion::complete(self.chat.as_ref(), &prompts, self.mode).await {
            Ok(o) => o,
            Err(e) => {
                warn!(error = %e, "completion failed");
                generation.set_level(ObservationLevel::Error, e.to_string());
                return Err(e);
            }
        };
        generation.set_output(json!(outcome.answer));
        generation.set_usage(outcome.usage);

        if self.mode == CaptureMode::Reasoning {
            record_reasoning(&generation, &outcome);
        }
        generation.end();

        Ok(Response {
            url: url.to_string(),
            scraped_text,
            summary: outcome.answer,
        })
    }
}

/// Nest the model's rationale under the generation. Text that cannot be
/// scrubbed is left out.
fn record_reasoning(generation: &ObservationScope, outcome: &CompletionOutcome) {
    if !generation.is_active() || (outcome.reasoning.is_none() && outcome.steps.is_none()) {
        return;
    }
    let reasoning = outcome.reasoning.as_deref().and_then(scrub::scrub);
    let steps = outcome
        .steps
        .as_ref()
        .and_then(|s| scrub::scrub_json(&serde_json::Value::Array(s.clone())));
    let mut span = generation.span("chain_of_thought", None, None);
    span.set_output(json!({
        "reasoning": reasoning,
        "intermediate_steps": steps,
    }));
}
