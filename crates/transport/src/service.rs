use std::fmt;
use std::future::Future;
use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};
use snafu::Snafu;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type ByteStream = Pin<Box<dyn Stream<Item = TransportResult<Vec<u8>>> + Send + 'static>>;
pub type TransportResult<T> = Result<T, TransportError>;

/// Speaker of one transcript entry, serialized the way the chat service expects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One `{ role, content }` item replayed to the chat service as context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

impl HistoryEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Body of `POST <chat endpoint>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub history: Vec<HistoryEntry>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, history: Vec<HistoryEntry>) -> Self {
        Self {
            message: message.into(),
            history,
        }
    }
}

/// Widget configuration served by the config endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfig {
    #[serde(default)]
    pub suggested_questions: Vec<String>,
}

/// Raw chat service reply: status, declared content type and a lazily read body.
pub struct ChatResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: ByteStream,
}

impl ChatResponse {
    /// Creates a response from captured headers and an unread body.
    pub fn new(status: u16, content_type: Option<String>, body: ByteStream) -> Self {
        Self {
            status,
            content_type,
            body,
        }
    }

    /// Returns true for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns true when the declared content type announces an event stream.
    pub fn is_event_stream(&self) -> bool {
        is_event_stream(self.content_type.as_deref())
    }
}

impl fmt::Debug for ChatResponse {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ChatResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

pub(crate) fn is_event_stream(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|value| {
        value
            .to_ascii_lowercase()
            .contains(crate::event_stream::EVENT_STREAM_CONTENT_TYPE)
    })
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransportError {
    #[snafu(display("endpoint '{endpoint}' is invalid on `{stage}`: {details}"))]
    InvalidEndpoint {
        stage: &'static str,
        endpoint: String,
        details: String,
    },
    #[snafu(display("failed to build http client on `{stage}`: {source}"))]
    BuildClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("could not reach chat service on `{stage}`: {details}"))]
    Connection {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("request to '{endpoint}' failed on `{stage}`: {source}"))]
    SendRequest {
        stage: &'static str,
        endpoint: String,
        source: reqwest::Error,
    },
    #[snafu(display("failed to read response body on `{stage}`: {source}"))]
    ReadBody {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("config endpoint returned status {status}"))]
    ConfigStatus { stage: &'static str, status: u16 },
    #[snafu(display("failed to decode chat config on `{stage}`: {source}"))]
    DecodeConfig {
        stage: &'static str,
        source: reqwest::Error,
    },
}

/// Capability the session uses to talk to the outside world.
///
/// `send` resolves once response headers are available; the body is read lazily
/// through [`ChatResponse::body`].
pub trait ChatService: Send + Sync {
    fn send<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> BoxFuture<'a, TransportResult<ChatResponse>>;
    fn fetch_config<'a>(&'a self) -> BoxFuture<'a, TransportResult<ChatConfig>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_serializes_with_lowercase_roles() {
        let request = ChatRequest::new(
            "pricing?",
            vec![
                HistoryEntry::new(Role::Assistant, "Hello!"),
                HistoryEntry::new(Role::User, "pricing?"),
            ],
        );

        let value = serde_json::to_value(&request).expect("request serializes");
        assert_eq!(
            value,
            serde_json::json!({
                "message": "pricing?",
                "history": [
                    { "role": "assistant", "content": "Hello!" },
                    { "role": "user", "content": "pricing?" },
                ],
            })
        );
    }

    #[test]
    fn chat_config_tolerates_missing_questions() {
        let config: ChatConfig = serde_json::from_str("{}").expect("empty config parses");
        assert!(config.suggested_questions.is_empty());

        let config: ChatConfig =
            serde_json::from_str(r#"{"suggestedQuestions":["Do you deliver?","Hours?"]}"#)
                .expect("config parses");
        assert_eq!(config.suggested_questions, vec!["Do you deliver?", "Hours?"]);
    }

    #[test]
    fn event_stream_detection_ignores_parameters_and_case() {
        assert!(is_event_stream(Some("text/event-stream; charset=utf-8")));
        assert!(is_event_stream(Some("Text/Event-Stream")));
        assert!(!is_event_stream(Some("application/json")));
        assert!(!is_event_stream(None));
    }
}
