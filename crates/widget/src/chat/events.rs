use std::fmt;

use crate::chat::message::{FailureKind, Role};

pub const CONNECTION_FALLBACK: &str =
    "Sorry, I'm having trouble connecting. Please try again later or contact us directly.";
pub const SERVER_FALLBACK: &str =
    "Sorry, I encountered an error. Please try again or contact us directly.";
pub const STREAM_FALLBACK: &str = "Sorry, there was an error receiving the response.";

/// Display markup produced by the renderer. Hosts insert it verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Markup(String);

impl Markup {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Markup {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Presentation change requested by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceUpdate {
    Visibility { open: bool },
    FocusInput,
    InputEnabled(bool),
    TypingIndicator(bool),
    Suggestions(Vec<String>),
    SuggestionsDismissed,
    /// A committed message that was never shown as in-progress.
    AppendMessage { role: Role, markup: Markup },
    /// Full re-render of the in-progress assistant message.
    StreamProgress { markup: Markup },
    /// Final content for the in-progress assistant message.
    StreamCommitted { markup: Markup },
}

/// Host-supplied rendering capability. The session never touches presentation
/// primitives directly.
pub trait ChatSurface: Send + Sync {
    fn render(&self, update: SurfaceUpdate);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnalyticsEvent {
    pub name: &'static str,
    pub category: &'static str,
}

impl AnalyticsEvent {
    pub const ENGAGEMENT: &'static str = "engagement";

    pub const fn chat_opened() -> Self {
        Self {
            name: "chat_opened",
            category: Self::ENGAGEMENT,
        }
    }

    pub const fn chat_message_sent() -> Self {
        Self {
            name: "chat_message_sent",
            category: Self::ENGAGEMENT,
        }
    }
}

/// Fire-and-forget event emitter. Implementations must swallow their own failures.
pub trait AnalyticsSink: Send + Sync {
    fn track(&self, event: AnalyticsEvent);
}

/// Result of one `submit` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Empty or whitespace-only input; nothing happened.
    Ignored,
    /// Another exchange is in flight; nothing was sent.
    Busy,
    Committed,
    Failed(FailureKind),
}

impl SubmitOutcome {
    pub fn is_committed(self) -> bool {
        matches!(self, Self::Committed)
    }
}
