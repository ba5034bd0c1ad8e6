//! In-process fakes shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use webgist_core::{
    ChatBackend, ChatReply, ChatRequest, Error, FetchBackend, FetchRequest, FetchResponse,
    ObservationEnd, ObservationId, ObservationStart, Result, TelemetryRecorder, TraceId,
    TraceStart,
};

/// Serves a fixed status/body for every URL and counts calls.
pub struct FakeFetcher {
    pub status: u16,
    pub body: String,
    pub fail: Option<String>,
    pub truncated: bool,
    pub calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn page(body: &str) -> Self {
        Self {
            status: 200,
            body: body.to_string(),
            fail: None,
            truncated: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
            fail: None,
            truncated: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(msg: &str) -> Self {
        Self {
            status: 0,
            body: String::new(),
            fail: Some(msg.to_string()),
            truncated: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// A page whose body hit the byte cap.
    pub fn truncated_page(body: &str) -> Self {
        Self {
            truncated: true,
            ..Self::page(body)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl FetchBackend for FakeFetcher {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = &self.fail {
            return Err(Error::Fetch(msg.clone()));
        }
        Ok(FetchResponse {
            url: req.url.clone(),
            final_url: req.url.clone(),
            status: self.status,
            content_type: Some("text/html".to_string()),
            bytes: self.body.clone().into_bytes(),
            truncated: self.truncated,
            elapsed_ms: 0,
        })
    }
}

/// Replies with a fixed string (or error) and remembers every request.
pub struct ScriptedChat {
    pub reply: std::result::Result<String, String>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChat {
    pub fn ok(content: &str) -> Self {
        Self {
            reply: Ok(content.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(msg: &str) -> Self {
        Self {
            reply: Err(msg.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ChatBackend for ScriptedChat {
    fn model(&self) -> &str {
        "test-model"
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatReply> {
        self.requests.lock().unwrap().push(req.clone());
        match &self.reply {
            Ok(content) => Ok(ChatReply {
                content: content.clone(),
                usage: None,
            }),
            Err(msg) => Err(Error::Llm(msg.clone())),
        }
    }
}

#[derive(Default)]
struct RecorderState {
    next: usize,
    names: HashMap<String, String>,
    events: Vec<String>,
    starts: Vec<ObservationStart>,
    ends: Vec<(String, ObservationEnd)>,
    trace_outputs: Vec<serde_json::Value>,
}

/// Keeps everything in memory; `events()` is a compact call log.
#[derive(Default)]
pub struct RecordingRecorder {
    state: Mutex<RecorderState>,
    panic_on_flush: bool,
}

impl RecordingRecorder {
    /// Records normally, then panics inside `flush`.
    pub fn panicking_on_flush() -> Self {
        Self {
            panic_on_flush: true,
            ..Default::default()
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn starts(&self) -> Vec<ObservationStart> {
        self.state.lock().unwrap().starts.clone()
    }

    /// `(observation name, end record)` in close order.
    pub fn ends(&self) -> Vec<(String, ObservationEnd)> {
        self.state.lock().unwrap().ends.clone()
    }

    pub fn trace_outputs(&self) -> Vec<serde_json::Value> {
        self.state.lock().unwrap().trace_outputs.clone()
    }
}

#[async_trait::async_trait]
impl TelemetryRecorder for RecordingRecorder {
    fn create_trace(&self, trace: TraceStart) -> Result<TraceId> {
        let mut s = self.state.lock().unwrap();
        s.next += 1;
        let id = format!("trace-{}", s.next);
        s.names.insert(id.clone(), trace.name.clone());
        s.events.push(format!("trace:{}", trace.name));
        Ok(TraceId(id))
    }

    fn update_trace(&self, id: &TraceId, output: serde_json::Value) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        let name = s.names.get(&id.0).cloned().unwrap_or_default();
        s.events.push(format!("update_trace:{name}"));
        s.trace_outputs.push(output);
        Ok(())
    }

    fn start_observation(&self, obs: ObservationStart) -> Result<ObservationId> {
        let mut s = self.state.lock().unwrap();
        s.next += 1;
        let id = format!("obs-{}", s.next);
        s.names.insert(id.clone(), obs.name.clone());
        s.events.push(format!("start:{}", obs.name));
        s.starts.push(obs);
        Ok(ObservationId(id))
    }

    fn end_observation(&self, end: ObservationEnd) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        let name = s.names.get(&end.id.0).cloned().unwrap_or_default();
        s.events.push(format!("end:{name}"));
        s.ends.push((name, end));
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.state.lock().unwrap().events.push("flush".to_string());
        if self.panic_on_flush {
            panic!("flush exploded");
        }
        Ok(())
    }
}

/// Every call errors (or panics, when `panic` is set).
#[derive(Default)]
pub struct FailingRecorder {
    pub panic: bool,
}

impl FailingRecorder {
    fn fail<T>(&self) -> Result<T> {
        if self.panic {
            panic!("recorder exploded");
        }
        Err(Error::Telemetry("backend unavailable".to_string()))
    }
}

#[async_trait::async_trait]
impl TelemetryRecorder for FailingRecorder {
    fn create_trace(&self, _trace: TraceStart) -> Result<TraceId> {
        self.fail()
    }

    fn update_trace(&self, _id: &TraceId, _output: serde_json::Value) -> Result<()> {
        self.fail()
    }

    fn start_observation(&self, _obs: ObservationStart) -> Result<ObservationId> {
        self.fail()
    }

    fn end_observation(&self, _end: ObservationEnd) -> Result<()> {
        self.fail()
    }

    async fn flush(&self) -> Result<()> {
        self.fail()
    }
}
