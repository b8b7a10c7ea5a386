pub use sitechat_transport::Role;
use sitechat_transport::HistoryEntry;

/// Identifier for one request/response cycle.
///
/// A fresh id is allocated on every submit so late transitions can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExchangeId(pub u64);

impl ExchangeId {
    /// Creates a typed exchange identifier from a raw counter value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// One committed transcript message. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
}

impl TranscriptEntry {
    /// Creates an entry for `role` with the given text.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates an entry for text the visitor typed.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates an entry for assistant text or a fallback message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Converts the entry into its wire form for the history array.
    pub fn to_history(&self) -> HistoryEntry {
        HistoryEntry::new(self.role, self.content.clone())
    }
}

/// Append-only, ordered record of the current session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    /// Creates an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one entry at the end. Entries are never reordered or removed.
    pub fn push(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
    }

    /// Returns all entries, oldest first.
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the most recently appended entry.
    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    /// The most recent `limit` entries, oldest first.
    pub fn context_suffix(&self, limit: usize) -> &[TranscriptEntry] {
        let start = self.entries.len().saturating_sub(limit);
        &self.entries[start..]
    }

    /// Builds the context history sent with a request: the last `limit` entries.
    pub fn history(&self, limit: usize) -> Vec<HistoryEntry> {
        self.context_suffix(limit)
            .iter()
            .map(TranscriptEntry::to_history)
            .collect()
    }
}

/// Widget-local presentation state, owned by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UiState {
    pub is_open: bool,
    pub input_enabled: bool,
    pub has_shown_suggestions: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            is_open: false,
            input_enabled: true,
            has_shown_suggestions: false,
        }
    }
}

/// Why an exchange ended without a reply from the chat service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Unreachable service or a body that is not a chat reply.
    Network,
    /// The service answered with a non-2xx status.
    Server { status: u16 },
    /// The body failed or came back empty after the exchange started streaming.
    StreamRead,
}

impl FailureKind {
    /// Returns the fixed apology committed in place of a reply.
    pub fn fallback_message(self) -> &'static str {
        match self {
            Self::Network => super::events::CONNECTION_FALLBACK,
            Self::Server { .. } => super::events::SERVER_FALLBACK,
            Self::StreamRead => super::events::STREAM_FALLBACK,
        }
    }
}

/// Lifecycle of the single exchange a session may run at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExchangeState {
    #[default]
    Idle,
    Sent(ExchangeId),
    Streaming(ExchangeId),
    Received(ExchangeId),
    Committed(ExchangeId),
    Failed {
        exchange: ExchangeId,
        kind: FailureKind,
    },
}

/// State transition input for the exchange lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeTransition {
    Send(ExchangeId),
    BeginStream(ExchangeId),
    Receive(ExchangeId),
    Commit(ExchangeId),
    Fail {
        exchange: ExchangeId,
        kind: FailureKind,
    },
    /// The caller stopped driving the exchange before it resolved.
    Abandon(ExchangeId),
    Settle,
}

/// Rejection reason for illegal exchange transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeTransitionRejection {
    AlreadyActive {
        active: ExchangeId,
        attempted: ExchangeId,
    },
    NoActiveExchange,
    ExchangeMismatch {
        active: ExchangeId,
        attempted: ExchangeId,
    },
    OutOfOrder {
        phase: &'static str,
        transition: &'static str,
    },
}

pub type ExchangeTransitionResult = Result<ExchangeState, ExchangeTransitionRejection>;

impl ExchangeState {
    /// Returns the in-flight exchange while one is sent, streaming or received.
    pub fn active_exchange(&self) -> Option<ExchangeId> {
        match self {
            Self::Sent(exchange) | Self::Streaming(exchange) | Self::Received(exchange) => {
                Some(*exchange)
            }
            Self::Idle | Self::Committed(_) | Self::Failed { .. } => None,
        }
    }

    /// Returns a stable label for logs and rejections.
    pub fn phase(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Sent(_) => "sent",
            Self::Streaming(_) => "streaming",
            Self::Received(_) => "received",
            Self::Committed(_) => "committed",
            Self::Failed { .. } => "failed",
        }
    }

    /// Applies one transition deterministically.
    ///
    /// Only `Send` may start from a resting state (`Idle`, `Committed`, `Failed`), and
    /// `Settle` only leaves a terminal one. Every other transition must name the
    /// in-flight exchange exactly.
    pub fn apply(&self, transition: ExchangeTransition) -> ExchangeTransitionResult {
        match transition {
            ExchangeTransition::Send(exchange) => self.apply_send(exchange),
            ExchangeTransition::BeginStream(exchange) => {
                self.advance(exchange, "begin-stream", |state| match state {
                    Self::Sent(_) => Some(Self::Streaming(exchange)),
                    _ => None,
                })
            }
            ExchangeTransition::Receive(exchange) => {
                self.advance(exchange, "receive", |state| match state {
                    Self::Sent(_) => Some(Self::Received(exchange)),
                    _ => None,
                })
            }
            ExchangeTransition::Commit(exchange) => {
                self.advance(exchange, "commit", |state| match state {
                    Self::Streaming(_) | Self::Received(_) => Some(Self::Committed(exchange)),
                    _ => None,
                })
            }
            ExchangeTransition::Fail { exchange, kind } => {
                self.advance(exchange, "fail", |_| Some(Self::Failed { exchange, kind }))
            }
            ExchangeTransition::Abandon(exchange) => {
                self.advance(exchange, "abandon", |_| Some(Self::Idle))
            }
            ExchangeTransition::Settle => self.apply_settle(),
        }
    }

    fn apply_send(&self, exchange: ExchangeId) -> ExchangeTransitionResult {
        match self.active_exchange() {
            Some(active) => Err(ExchangeTransitionRejection::AlreadyActive {
                active,
                attempted: exchange,
            }),
            None => Ok(Self::Sent(exchange)),
        }
    }

    fn advance(
        &self,
        exchange: ExchangeId,
        transition: &'static str,
        next: impl FnOnce(&Self) -> Option<Self>,
    ) -> ExchangeTransitionResult {
        let Some(active) = self.active_exchange() else {
            return Err(ExchangeTransitionRejection::NoActiveExchange);
        };

        if active != exchange {
            return Err(ExchangeTransitionRejection::ExchangeMismatch {
                active,
                attempted: exchange,
            });
        }

        next(self).ok_or(ExchangeTransitionRejection::OutOfOrder {
            phase: self.phase(),
            transition,
        })
    }

    fn apply_settle(&self) -> ExchangeTransitionResult {
        match self {
            Self::Idle | Self::Committed(_) | Self::Failed { .. } => Ok(Self::Idle),
            Self::Sent(_) | Self::Streaming(_) | Self::Received(_) => {
                Err(ExchangeTransitionRejection::OutOfOrder {
                    phase: self.phase(),
                    transition: "settle",
                })
            }
        }
    }
}
