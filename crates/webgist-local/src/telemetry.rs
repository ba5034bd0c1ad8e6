//! Best-effort observability around the pipeline.
//!
//! Nothing in here can fail a request: every recorder call is guarded, errors
//! (and panics) are logged and discarded, and a disabled or broken recorder
//! yields inert scopes. Scopes close their observation on `Drop`, so an early
//! return or `?` inside a stage still ends the span it opened.

use crate::langfuse::{LangfuseConfig, LangfuseRecorder};
use futures_util::FutureExt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use webgist_core::{
    ObservationEnd, ObservationId, ObservationKind, ObservationLevel, ObservationStart, Result,
    TelemetryRecorder, TokenUsage, TraceId, TraceStart,
};

/// Upper bound on the end-of-request flush.
pub const FLUSH_DEADLINE: Duration = Duration::from_secs(5);

fn guarded<T>(what: &'static str, f: impl FnOnce() -> Result<T>) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(v)) => Some(v),
        Ok(Err(e)) => {
            warn!(op = what, error = %e, "telemetry call failed");
            None
        }
        Err(_) => {
            warn!(op = what, "telemetry call panicked");
            None
        }
    }
}

/// Recorder used when telemetry is off.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

#[async_trait::async_trait]
impl TelemetryRecorder for NoopRecorder {
    fn create_trace(&self, _trace: TraceStart) -> Result<TraceId> {
        Ok(TraceId(String::new()))
    }

    fn update_trace(&self, _id: &TraceId, _output: serde_json::Value) -> Result<()> {
        Ok(())
    }

    fn start_observation(&self, _obs: ObservationStart) -> Result<ObservationId> {
        Ok(ObservationId(String::new()))
    }

    fn end_observation(&self, _end: ObservationEnd) -> Result<()> {
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Process-wide telemetry handle; cheap to clone.
#[derive(Clone)]
pub struct Telemetry {
    recorder: Arc<dyn TelemetryRecorder>,
    enabled: bool,
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl Telemetry {
    pub fn disabled() -> Self {
        Self {
            recorder: Arc::new(NoopRecorder),
            enabled: false,
        }
    }

    pub fn new(recorder: Arc<dyn TelemetryRecorder>) -> Self {
        Self {
            recorder,
            enabled: true,
        }
    }

    /// Build the Langfuse recorder. Any construction failure leaves telemetry
    /// disabled for the life of the process.
    pub fn connect(cfg: Option<&LangfuseConfig>) -> Self {
        let Some(cfg) = cfg else {
            info!("langfuse not configured; telemetry disabled");
            return Self::disabled();
        };
        match LangfuseRecorder::new(cfg.clone()) {
            Ok(rec) => {
                info!(host = %rec.host(), "langfuse telemetry enabled");
                Self::new(Arc::new(rec))
            }
            Err(e) => {
                warn!(error = %e, "langfuse initialization failed; telemetry disabled");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// One-shot connectivity check at startup. Failure is only logged.
    pub async fn send_startup_trace(&self) -> bool {
        if !self.enabled {
            return false;
        }
        let created = guarded("create_trace", || {
            self.recorder.create_trace(TraceStart {
                name: "startup-test-trace".to_string(),
                input: Some(serde_json::json!("process startup")),
                output: Some(serde_json::json!("langfuse connection verified")),
                metadata: None,
                tags: vec!["init".to_string(), "connectivity-check".to_string()],
            })
        });
        if created.is_none() {
            return false;
        }
        let ok = self.flush().await;
        if ok {
            info!("langfuse startup trace sent");
        }
        ok
    }

    /// Open a trace. Returns an inert scope when disabled or when the
    /// recorder refuses.
    pub fn trace(&self, start: TraceStart) -> TraceScope {
        if !self.enabled {
            return TraceScope::inert();
        }
        let recorder = self.recorder.clone();
        match guarded("create_trace", || recorder.create_trace(start)) {
            Some(id) => TraceScope {
                recorder: Some(recorder),
                id: Some(id),
                output: None,
            },
            None => TraceScope::inert(),
        }
    }

    /// Send buffered events. Bounded by [`FLUSH_DEADLINE`]; failures are logged.
    pub async fn flush(&self) -> bool {
        if !self.enabled {
            return true;
        }
        let flush = AssertUnwindSafe(self.recorder.flush()).catch_unwind();
        match tokio::time::timeout(FLUSH_DEADLINE, flush).await {
            Ok(Ok(Ok(()))) => {
                debug!("telemetry flushed");
                true
            }
            Ok(Ok(Err(e))) => {
                warn!(error = %e, "telemetry flush failed");
                false
            }
            Ok(Err(_)) => {
                warn!(op = "flush", "telemetry call panicked");
                false
            }
            Err(_) => {
                warn!(deadline_ms = FLUSH_DEADLINE.as_millis() as u64, "telemetry flush timed out");
                false
            }
        }
    }
}

/// An open trace. Sets its output (if any) when dropped.
pub struct TraceScope {
    recorder: Option<Arc<dyn TelemetryRecorder>>,
    id: Option<TraceId>,
    output: Option<serde_json::Value>,
}

impl TraceScope {
    fn inert() -> Self {
        Self {
            recorder: None,
            id: None,
            output: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.id.is_some()
    }

    pub fn set_output(&mut self, output: serde_json::Value) {
        self.output = Some(output);
    }

    pub fn span(
        &self,
        name: &str,
        input: Option<serde_json::Value>,
        metadata: Option<serde_json::Value>,
    ) -> ObservationScope {
        ObservationScope::start(
            self.recorder.as_ref(),
            self.id.as_ref(),
            None,
            ObservationKind::Span,
            name,
            input,
            metadata,
            None,
            None,
        )
    }

    pub fn generation(
        &self,
        name: &str,
        model: &str,
        input: Option<serde_json::Value>,
        metadata: Option<serde_json::Value>,
        model_parameters: Option<serde_json::Value>,
    ) -> ObservationScope {
        ObservationScope::start(
            self.recorder.as_ref(),
            self.id.as_ref(),
            None,
            ObservationKind::Generation,
            name,
            input,
            metadata,
            Some(model.to_string()),
            model_parameters,
        )
    }
}

impl Drop for TraceScope {
    fn drop(&mut self) {
        if let (Some(rec), Some(id), Some(output)) =
            (self.recorder.as_ref(), self.id.as_ref(), self.output.take())
        {
            guarded("update_trace", || rec.update_trace(id, output));
        }
    }
}

/// An open span or generation. Ended exactly once, on drop.
pub struct ObservationScope {
    recorder: Option<Arc<dyn TelemetryRecorder>>,
    trace_id: Option<TraceId>,
    id: Option<ObservationId>,
    kind: ObservationKind,
    output: Option<serde_json::Value>,
    level: ObservationLevel,
    status_message: Option<String>,
    usage: Option<TokenUsage>,
}

impl ObservationScope {
    #[allow(clippy::too_many_arguments)]
    fn start(
        recorder: Option<&Arc<dyn TelemetryRecorder>>,
        trace_id: Option<&TraceId>,
        parent_id: Option<&ObservationId>,
        kind: ObservationKind,
        name: &str,
        input: Option<serde_json::Value>,
        metadata: Option<serde_json::Value>,
        model: Option<String>,
        model_parameters: Option<serde_json::Value>,
    ) -> Self {
        let mut scope = Self {
            recorder: None,
            trace_id: None,
            id: None,
            kind,
            output: None,
            level: ObservationLevel::Default,
            status_message: None,
            usage: None,
        };
        let (Some(rec), Some(trace_id)) = (recorder, trace_id) else {
            return scope;
        };
        let obs = ObservationStart {
            trace_id: trace_id.clone(),
            parent_id: parent_id.cloned(),
            kind,
            name: name.to_string(),
            input,
            metadata,
            model,
            model_parameters,
        };
        if let Some(id) = guarded("start_observation", || rec.start_observation(obs)) {
            scope.recorder = Some(rec.clone());
            scope.trace_id = Some(trace_id.clone());
            scope.id = Some(id);
        }
        scope
    }

    pub fn is_active(&self) -> bool {
        self.id.is_some()
    }

    /// Child span nested under this observation.
    pub fn span(
        &self,
        name: &str,
        input: Option<serde_json::Value>,
        metadata: Option<serde_json::Value>,
    ) -> ObservationScope {
        Self::start(
            self.recorder.as_ref(),
            self.trace_id.as_ref(),
            self.id.as_ref(),
            ObservationKind::Span,
            name,
            input,
            metadata,
            None,
            None,
        )
    }

    pub fn set_output(&mut self, output: serde_json::Value) {
        self.output = Some(output);
    }

    pub fn set_usage(&mut self, usage: Option<TokenUsage>) {
        self.usage = usage;
    }

    pub fn set_level(&mut self, level: ObservationLevel, message: impl Into<String>) {
        self.level = level;
        self.status_message = Some(message.into());
    }

    /// Close now instead of at end of scope.
    pub fn end(self) {}
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        let (Some(rec), Some(trace_id), Some(id)) =
            (self.recorder.take(), self.trace_id.take(), self.id.take())
        else {
            return;
        };
        let end = ObservationEnd {
            trace_id,
            id,
            kind: self.kind,
            output: self.output.take(),
            level: self.level,
            status_message: self.status_message.take(),
            usage: self.usage.take(),
        };
        guarded("end_observation", || rec.end_observation(end));
    }
}
