use std::collections::VecDeque;
use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde::Deserialize;
use snafu::Snafu;

use crate::service::{ByteStream, ChatResponse, TransportError};

pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";
pub const FRAME_MARKER: &str = "data:";
pub const DONE_SENTINEL: &str = "[DONE]";

pub type FragmentStream = Pin<Box<dyn Stream<Item = StreamResult<StreamFragment>> + Send>>;
pub type StreamResult<T> = Result<T, StreamError>;

/// One incremental piece of assistant text decoded from a single frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFragment {
    pub text: String,
}

impl StreamFragment {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StreamError {
    #[snafu(display("failed to read response stream on `{stage}`: {source}"))]
    ReadChunk {
        stage: &'static str,
        source: TransportError,
    },
    #[snafu(display("response body is not a chat reply on `{stage}`: {details}"))]
    MalformedBody {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("response stream ended without any content"))]
    EmptyResponse { stage: &'static str },
}

/// Splits raw body chunks into complete lines.
///
/// Bytes after the last newline of a chunk are held back and prefixed to the next
/// chunk, so frames split across reads (including multi-byte UTF-8 sequences) are
/// only decoded once whole.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    pending: Vec<u8>,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|byte| *byte == b'\n') else {
            return Vec::new();
        };

        let complete = self.pending.drain(..=last_newline).collect::<Vec<_>>();
        complete[..complete.len() - 1]
            .split(|byte| *byte == b'\n')
            .map(decode_line)
            .collect()
    }

    /// Flushes the trailing line that never received a newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }

        let rest = std::mem::take(&mut self.pending);
        Some(decode_line(&rest))
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FrameOutcome {
    Fragment(StreamFragment),
    Done,
    Ignored,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Option<Vec<ChunkChoice>>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

impl CompletionChunk {
    fn into_text(self) -> Option<String> {
        self.choices?
            .into_iter()
            .next()?
            .delta?
            .content
            .filter(|content| !content.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct JsonReply {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl JsonReply {
    fn into_text(self) -> Option<String> {
        self.response
            .filter(|text| !text.is_empty())
            .or(self.message.filter(|text| !text.is_empty()))
    }
}

fn parse_line(line: &str) -> FrameOutcome {
    let Some(payload) = line.strip_prefix(FRAME_MARKER) else {
        return FrameOutcome::Ignored;
    };
    let payload = payload.strip_prefix(' ').unwrap_or(payload);

    if payload.trim_end() == DONE_SENTINEL {
        return FrameOutcome::Done;
    }

    match serde_json::from_str::<CompletionChunk>(payload) {
        Ok(chunk) => chunk
            .into_text()
            .map(|text| FrameOutcome::Fragment(StreamFragment::new(text)))
            .unwrap_or(FrameOutcome::Ignored),
        Err(error) => {
            tracing::debug!(error = %error, "skipping malformed event-stream frame");
            FrameOutcome::Ignored
        }
    }
}

enum Framing {
    EventStream(SseLineDecoder),
    Json,
}

/// Lazy, finite, non-restartable reader of assistant text from a chat response body.
pub struct FragmentReader {
    body: ByteStream,
    framing: Framing,
    ready: VecDeque<StreamFragment>,
    finished: bool,
}

impl FragmentReader {
    pub fn new(body: ByteStream, content_type: Option<&str>) -> Self {
        let framing = if crate::service::is_event_stream(content_type) {
            Framing::EventStream(SseLineDecoder::new())
        } else {
            Framing::Json
        };

        Self {
            body,
            framing,
            ready: VecDeque::new(),
            finished: false,
        }
    }

    pub fn is_event_stream(&self) -> bool {
        matches!(self.framing, Framing::EventStream(_))
    }

    /// Returns the next fragment, `None` on clean termination, or an error when the
    /// underlying body fails. After an error or termination the reader stays finished.
    pub async fn next_fragment(&mut self) -> Option<StreamResult<StreamFragment>> {
        match self.framing {
            Framing::EventStream(_) => self.next_event_fragment().await,
            Framing::Json => self.next_json_fragment().await,
        }
    }

    pub fn into_stream(self) -> FragmentStream {
        Box::pin(futures::stream::unfold(self, |mut reader| async move {
            reader
                .next_fragment()
                .await
                .map(|fragment| (fragment, reader))
        }))
    }

    async fn next_event_fragment(&mut self) -> Option<StreamResult<StreamFragment>> {
        loop {
            if let Some(fragment) = self.ready.pop_front() {
                return Some(Ok(fragment));
            }

            if self.finished {
                return None;
            }

            match self.body.next().await {
                Some(Ok(chunk)) => {
                    let lines = match &mut self.framing {
                        Framing::EventStream(decoder) => decoder.push(&chunk),
                        Framing::Json => Vec::new(),
                    };
                    self.absorb_lines(lines);
                }
                Some(Err(source)) => {
                    self.finished = true;
                    tracing::warn!(error = %source, "event stream read failed");
                    return Some(Err(StreamError::ReadChunk {
                        stage: "read-event-stream-chunk",
                        source,
                    }));
                }
                None => {
                    let trailing = match &mut self.framing {
                        Framing::EventStream(decoder) => decoder.finish(),
                        Framing::Json => None,
                    };
                    self.absorb_lines(trailing);
                    self.finished = true;
                }
            }
        }
    }

    fn absorb_lines(&mut self, lines: impl IntoIterator<Item = String>) {
        for line in lines {
            match parse_line(&line) {
                FrameOutcome::Fragment(fragment) => self.ready.push_back(fragment),
                FrameOutcome::Done => {
                    self.finished = true;
                    return;
                }
                FrameOutcome::Ignored => {}
            }
        }
    }

    async fn next_json_fragment(&mut self) -> Option<StreamResult<StreamFragment>> {
        if self.finished {
            return None;
        }
        self.finished = true;

        let mut raw = Vec::new();
        while let Some(chunk) = self.body.next().await {
            match chunk {
                Ok(chunk) => raw.extend_from_slice(&chunk),
                Err(source) => {
                    return Some(Err(StreamError::ReadChunk {
                        stage: "read-json-body",
                        source,
                    }));
                }
            }
        }

        let reply = match serde_json::from_slice::<JsonReply>(&raw) {
            Ok(reply) => reply,
            Err(error) => {
                return Some(Err(StreamError::MalformedBody {
                    stage: "parse-json-body",
                    details: error.to_string(),
                }));
            }
        };

        Some(
            reply
                .into_text()
                .map(StreamFragment::new)
                .ok_or_else(|| StreamError::MalformedBody {
                    stage: "extract-json-reply",
                    details: "neither `response` nor `message` carried text".to_string(),
                }),
        )
    }
}

/// Classifies a response by its declared content type and returns its fragments.
pub fn read_response(response: ChatResponse) -> FragmentStream {
    FragmentReader::new(response.body, response.content_type.as_deref()).into_stream()
}
