/// Host-facing contracts: surface updates, analytics and submit outcomes.
pub mod events;
/// Transcript entries and the deterministic exchange lifecycle.
pub mod message;
pub mod render;
pub mod session;

pub use events::{
    AnalyticsEvent, AnalyticsSink, CONNECTION_FALLBACK, ChatSurface, Markup, SERVER_FALLBACK,
    STREAM_FALLBACK, SubmitOutcome, SurfaceUpdate,
};
pub use message::{
    ExchangeId, ExchangeState, ExchangeTransition, ExchangeTransitionRejection,
    ExchangeTransitionResult, FailureKind, Role, Transcript, TranscriptEntry, UiState,
};
pub use render::{render_markdown, render_plain};
pub use session::{ChatSession, DEFAULT_HISTORY_LIMIT, DEFAULT_MOBILE_BREAKPOINT, SessionOptions};
