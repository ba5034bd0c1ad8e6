//! Langfuse ingestion client.
//!
//! Events are buffered in memory and sent as one batch per `flush` to
//! `POST {host}/api/public/ingestion` (basic auth: public key / secret key).
//! Docs: https://api.reference.langfuse.com/#tag/ingestion

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};
use webgist_core::{
    Error, ObservationEnd, ObservationId, ObservationKind, ObservationStart, Result,
    TelemetryRecorder, TraceId, TraceStart,
};

pub const DEFAULT_HOST: &str = "https://cloud.langfuse.com";

/// Buffered events beyond this are dropped (oldest first).
pub const MAX_BUFFERED_EVENTS: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LangfuseConfig {
    pub host: String,
    pub public_key: String,
    pub secret_key: String,
    pub flush_timeout: Duration,
}

#[derive(Debug, Clone, Serialize)]
struct IngestionEvent {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    timestamp: String,
    body: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct IngestionBatch<'a> {
    batch: &'a [IngestionEvent],
}

#[derive(Debug, Default, Deserialize)]
struct IngestionResponse {
    #[serde(default)]
    successes: Vec<serde_json::Value>,
    #[serde(default)]
    errors: Vec<IngestionError>,
}

#[derive(Debug, Deserialize)]
struct IngestionError {
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    message: Option<String>,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Drop `null` fields so partial updates don't overwrite earlier values.
fn compact(mut v: serde_json::Value) -> serde_json::Value {
    if let Some(obj) = v.as_object_mut() {
        obj.retain(|_, val| !val.is_null());
    }
    v
}

#[derive(Debug)]
pub struct LangfuseRecorder {
    client: reqwest::Client,
    cfg: LangfuseConfig,
    buffer: Mutex<Vec<IngestionEvent>>,
}

impl LangfuseRecorder {
    pub fn new(cfg: LangfuseConfig) -> Result<Self> {
        if cfg.public_key.trim().is_empty() || cfg.secret_key.trim().is_empty() {
            return Err(Error::NotConfigured(
                "missing LANGFUSE_PUBLIC_KEY / LANGFUSE_SECRET_KEY".to_string(),
            ));
        }
        let host = url::Url::parse(&cfg.host)
            .map_err(|e| Error::Telemetry(format!("invalid LANGFUSE_HOST: {e}")))?;
        if !matches!(host.scheme(), "http" | "https") {
            return Err(Error::Telemetry(format!(
                "invalid LANGFUSE_HOST scheme: {}",
                host.scheme()
            )));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(cfg.flush_timeout)
            .build()
            .map_err(|e| Error::Telemetry(e.to_string()))?;
        Ok(Self {
            client,
            cfg,
            buffer: Mutex::new(Vec::new()),
        })
    }

    pub fn host(&self) -> &str {
        &self.cfg.host
    }

    fn endpoint_ingestion(&self) -> String {
        format!(
            "{}/api/public/ingestion",
            self.cfg.host.trim_end_matches('/')
        )
    }

    fn push(&self, kind: &'static str, body: serde_json::Value) -> Result<()> {
        let mut buf = self
            .buffer
            .lock()
            .map_err(|_| Error::Telemetry("event buffer poisoned".to_string()))?;
        if buf.len() >= MAX_BUFFERED_EVENTS {
            let excess = buf.len() + 1 - MAX_BUFFERED_EVENTS;
            buf.drain(..excess);
            warn!(dropped = excess, "langfuse event buffer full; dropping oldest events");
        }
        buf.push(IngestionEvent {
            id: new_id(),
            kind,
            timestamp: now_rfc3339(),
            body: compact(body),
        });
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.buffer.lock().map(|b| b.len()).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl TelemetryRecorder for LangfuseRecorder {
    fn create_trace(&self, trace: TraceStart) -> Result<TraceId> {
        let id = new_id();
        self.push(
            "trace-create",
            serde_json::json!({
                "id": id,
                "timestamp": now_rfc3339(),
                "name": trace.name,
                "input": trace.input,
                "output": trace.output,
                "metadata": trace.metadata,
                "tags": trace.tags,
            }),
        )?;
        Ok(TraceId(id))
    }

    fn update_trace(&self, id: &TraceId, output: serde_json::Value) -> Result<()> {
        // trace-create is an upsert keyed by id.
        self.push(
            "trace-create",
            serde_json::json!({ "id": id.0, "output": output }),
        )
    }

    fn start_observation(&self, obs: ObservationStart) -> Result<ObservationId> {
        let id = new_id();
        let kind = match obs.kind {
            ObservationKind::Span => "span-create",
            ObservationKind::Generation => "generation-create",
        };
        self.push(
            kind,
            serde_json::json!({
                "id": id,
                "traceId": obs.trace_id.0,
                "parentObservationId": obs.parent_id.map(|p| p.0),
                "name": obs.name,
                "startTime": now_rfc3339(),
                "input": obs.input,
                "metadata": obs.metadata,
                "model": obs.model,
                "modelParameters": obs.model_parameters,
            }),
        )?;
        Ok(ObservationId(id))
    }

    fn end_observation(&self, end: ObservationEnd) -> Result<()> {
        let kind = match end.kind {
            ObservationKind::Span => "span-update",
            ObservationKind::Generation => "generation-update",
        };
        let usage = end.usage.map(|u| {
            serde_json::json!({
                "input": u.input,
                "output": u.output,
                "total": u.total,
                "unit": "TOKENS",
            })
        });
        self.push(
            kind,
            serde_json::json!({
                "id": end.id.0,
                "traceId": end.trace_id.0,
                "endTime": now_rfc3339(),
                "output": end.output,
                "level": end.level,
                "statusMessage": end.status_message,
                "usage": usage,
            }),
        )
    }

    async fn flush(&self) -> Result<()> {
        let batch = {
            let mut buf = self
                .buffer
                .lock()
                .map_err(|_| Error::Telemetry("event buffer poisoned".to_string()))?;
            std::mem::take(&mut *buf)
        };
        if batch.is_empty() {
            return Ok(());
        }

        // A failed batch is dropped, not re-queued.
        let resp = self
            .client
            .post(self.endpoint_ingestion())
            .basic_auth(&self.cfg.public_key, Some(&self.cfg.secret_key))
            .json(&IngestionBatch { batch: &batch })
            .send()
            .await
            .map_err(|e| Error::Telemetry(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Telemetry(format!(
                "langfuse ingestion HTTP {status} ({} events dropped)",
                batch.len()
            )));
        }

        let parsed: IngestionResponse = resp.json().await.unwrap_or_default();
        if !parsed.errors.is_empty() {
            let first = parsed
                .errors
                .first()
                .map(|e| {
                    format!(
                        "{} {}",
                        e.status.unwrap_or(0),
                        e.message.as_deref().unwrap_or("")
                    )
                })
                .unwrap_or_default();
            return Err(Error::Telemetry(format!(
                "langfuse rejected {} of {} events (first: {first})",
                parsed.errors.len(),
                batch.len()
            )));
        }
        debug!(
            events = batch.len(),
            accepted = parsed.successes.len(),
            "langfuse batch flushed"
        );
        Ok(())
    }
}
