#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use sitechat::chat::{AnalyticsEvent, AnalyticsSink, ChatSurface, Role, SurfaceUpdate};
use sitechat_transport::{
    BoxFuture, ChatConfig, ChatRequest, ChatResponse, ChatService, ConnectionSnafu,
    EVENT_STREAM_CONTENT_TYPE, TransportError, TransportResult,
};
use tokio::sync::Notify;

/// Encodes one completion delta as an event-stream frame.
pub fn frame(content: &str) -> String {
    let payload = serde_json::json!({ "choices": [{ "delta": { "content": content } }] });
    format!("data: {payload}\n\n")
}

pub fn done() -> String {
    "data: [DONE]\n\n".to_string()
}

pub enum Reply {
    Stream(Vec<String>),
    StreamThenFail(Vec<String>),
    Json(String),
    Status(u16),
    Offline,
}

#[derive(Default)]
pub struct ScriptedService {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ChatRequest>>,
    config: Option<ChatConfig>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedService {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn with_config(mut self, config: ChatConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Holds every `send` until the gate is notified.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    fn respond(reply: Reply) -> TransportResult<ChatResponse> {
        let event_stream = Some(EVENT_STREAM_CONTENT_TYPE.to_string());
        match reply {
            Reply::Stream(chunks) => {
                let body = futures::stream::iter(
                    chunks
                        .into_iter()
                        .map(|chunk| Ok::<_, TransportError>(chunk.into_bytes())),
                );
                Ok(ChatResponse::new(200, event_stream, Box::pin(body)))
            }
            Reply::StreamThenFail(chunks) => {
                let mut items: Vec<TransportResult<Vec<u8>>> =
                    chunks.into_iter().map(|chunk| Ok(chunk.into_bytes())).collect();
                items.push(
                    ConnectionSnafu {
                        stage: "scripted-body",
                        details: "connection reset",
                    }
                    .fail(),
                );
                Ok(ChatResponse::new(
                    200,
                    event_stream,
                    Box::pin(futures::stream::iter(items)),
                ))
            }
            Reply::Json(body) => {
                let body = futures::stream::iter([Ok::<_, TransportError>(body.into_bytes())]);
                Ok(ChatResponse::new(
                    200,
                    Some("application/json".to_string()),
                    Box::pin(body),
                ))
            }
            Reply::Status(status) => {
                let body = futures::stream::iter([Ok::<_, TransportError>(
                    b"internal error".to_vec(),
                )]);
                Ok(ChatResponse::new(
                    status,
                    Some("text/plain".to_string()),
                    Box::pin(body),
                ))
            }
            Reply::Offline => ConnectionSnafu {
                stage: "scripted-send",
                details: "connection refused",
            }
            .fail(),
        }
    }
}

impl ChatService for ScriptedService {
    fn send<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> BoxFuture<'a, TransportResult<ChatResponse>> {
        Box::pin(async move {
            self.requests
                .lock()
                .expect("requests lock")
                .push(request.clone());

            if let Some(gate) = &self.gate {
                gate.notified().await;
            }

            let reply = self
                .replies
                .lock()
                .expect("replies lock")
                .pop_front()
                .unwrap_or(Reply::Offline);
            Self::respond(reply)
        })
    }

    fn fetch_config<'a>(&'a self) -> BoxFuture<'a, TransportResult<ChatConfig>> {
        Box::pin(async move {
            match &self.config {
                Some(config) => Ok(config.clone()),
                None => ConnectionSnafu {
                    stage: "scripted-config",
                    details: "config endpoint offline",
                }
                .fail(),
            }
        })
    }
}

#[derive(Default)]
pub struct RecordingSurface {
    updates: Mutex<Vec<SurfaceUpdate>>,
}

impl RecordingSurface {
    pub fn updates(&self) -> Vec<SurfaceUpdate> {
        self.updates.lock().expect("updates lock").clone()
    }

    pub fn progress(&self) -> Vec<String> {
        self.updates()
            .into_iter()
            .filter_map(|update| match update {
                SurfaceUpdate::StreamProgress { markup } => Some(markup.into_string()),
                _ => None,
            })
            .collect()
    }

    pub fn appended(&self, role: Role) -> Vec<String> {
        self.updates()
            .into_iter()
            .filter_map(|update| match update {
                SurfaceUpdate::AppendMessage { role: seen, markup } if seen == role => {
                    Some(markup.into_string())
                }
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&SurfaceUpdate) -> bool) -> usize {
        self.updates().iter().filter(|update| predicate(update)).count()
    }
}

impl ChatSurface for RecordingSurface {
    fn render(&self, update: SurfaceUpdate) {
        self.updates.lock().expect("updates lock").push(update);
    }
}

#[derive(Default)]
pub struct RecordingAnalytics {
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl RecordingAnalytics {
    pub fn names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .expect("events lock")
            .iter()
            .map(|event| event.name)
            .collect()
    }
}

impl AnalyticsSink for RecordingAnalytics {
    fn track(&self, event: AnalyticsEvent) {
        self.events.lock().expect("events lock").push(event);
    }
}

/// Sink whose every call panics.
pub struct PanickingAnalytics;

impl AnalyticsSink for PanickingAnalytics {
    fn track(&self, event: AnalyticsEvent) {
        panic!("analytics backend rejected {}", event.name);
    }
}
