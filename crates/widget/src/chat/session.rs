use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use sitechat_transport::{
    ChatConfig, ChatRequest, ChatResponse, ChatService, StreamError, fetch_config_or_default,
    read_response,
};

use crate::chat::events::{
    AnalyticsEvent, AnalyticsSink, ChatSurface, SubmitOutcome, SurfaceUpdate,
};
use crate::chat::message::{
    ExchangeId, ExchangeState, ExchangeTransition, FailureKind, Role, Transcript,
    TranscriptEntry, UiState,
};
use crate::chat::render::{render_markdown, render_plain};

pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const DEFAULT_MOBILE_BREAKPOINT: u32 = 768;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub history_limit: usize,
    /// Viewports at or below this width never get the input auto-focused.
    pub mobile_breakpoint: u32,
    pub greeting: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            mobile_breakpoint: DEFAULT_MOBILE_BREAKPOINT,
            greeting: None,
        }
    }
}

struct SessionState {
    transcript: Transcript,
    ui: UiState,
    exchange: ExchangeState,
    config: ChatConfig,
    viewport_width: u32,
    typing_visible: bool,
    next_exchange_id: u64,
}

impl SessionState {
    fn alloc_exchange_id(&mut self) -> ExchangeId {
        let id = ExchangeId::new(self.next_exchange_id);
        self.next_exchange_id = self.next_exchange_id.saturating_add(1);
        id
    }

    fn transition(&mut self, transition: ExchangeTransition) -> bool {
        match self.exchange.apply(transition) {
            Ok(next) => {
                self.exchange = next;
                true
            }
            Err(rejection) => {
                tracing::warn!(
                    phase = self.exchange.phase(),
                    ?transition,
                    ?rejection,
                    "rejected exchange transition"
                );
                false
            }
        }
    }
}

/// How an exchange that did not commit ended.
struct ExchangeFailure {
    kind: FailureKind,
    partial_shown: bool,
}

impl ExchangeFailure {
    fn before_stream(kind: FailureKind) -> Self {
        Self {
            kind,
            partial_shown: false,
        }
    }
}

/// Returns the session to rest when an exchange ends, including when the `submit`
/// future is dropped before it resolves.
struct ExchangeGuard<'a> {
    session: &'a ChatSession,
    exchange: ExchangeId,
}

impl Drop for ExchangeGuard<'_> {
    fn drop(&mut self) {
        self.session.settle(self.exchange);
    }
}

/// Conversation controller for one widget instance.
///
/// Owns the transcript and [`UiState`]; collaborators are injected so hosts decide how
/// requests travel and how markup is shown. At most one exchange is in flight: a
/// `submit` issued while another is active returns [`SubmitOutcome::Busy`] without
/// touching the transcript or the network.
pub struct ChatSession {
    service: Arc<dyn ChatService>,
    surface: Arc<dyn ChatSurface>,
    analytics: Option<Arc<dyn AnalyticsSink>>,
    options: SessionOptions,
    state: Mutex<SessionState>,
}

impl ChatSession {
    /// Creates an idle, closed session with an empty transcript.
    pub fn new(
        service: Arc<dyn ChatService>,
        surface: Arc<dyn ChatSurface>,
        options: SessionOptions,
    ) -> Self {
        Self {
            service,
            surface,
            analytics: None,
            options,
            state: Mutex::new(SessionState {
                transcript: Transcript::new(),
                ui: UiState::default(),
                exchange: ExchangeState::Idle,
                config: ChatConfig::default(),
                viewport_width: 0,
                typing_visible: false,
                next_exchange_id: 1,
            }),
        }
    }

    /// Attaches a sink for engagement events.
    pub fn with_analytics(mut self, analytics: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics = Some(analytics);
        self
    }

    /// Returns a snapshot of the committed transcript.
    pub fn transcript(&self) -> Transcript {
        self.state().transcript.clone()
    }

    pub fn ui_state(&self) -> UiState {
        self.state().ui
    }

    pub fn exchange_state(&self) -> ExchangeState {
        self.state().exchange
    }

    pub fn suggested_questions(&self) -> Vec<String> {
        self.state().config.suggested_questions.clone()
    }

    /// Records the host viewport width used for the focus decision in [`Self::toggle`].
    pub fn set_viewport_width(&self, width: u32) {
        self.state().viewport_width = width;
    }

    /// Loads the widget config, greets, and offers suggested questions once.
    ///
    /// A config failure only means there are no suggestions.
    pub async fn start(&self) {
        let config = fetch_config_or_default(self.service.as_ref()).await;

        let suggestions = {
            let mut state = self.state();
            state.config = config;
            if let Some(greeting) = &self.options.greeting {
                state.transcript.push(TranscriptEntry::assistant(greeting.clone()));
            }

            let questions = state.config.suggested_questions.clone();
            if questions.is_empty() || state.ui.has_shown_suggestions {
                None
            } else {
                state.ui.has_shown_suggestions = true;
                Some(questions)
            }
        };

        if let Some(greeting) = &self.options.greeting {
            self.surface.render(SurfaceUpdate::AppendMessage {
                role: Role::Assistant,
                markup: render_markdown(greeting),
            });
        }

        if let Some(questions) = suggestions {
            tracing::debug!(count = questions.len(), "showing suggested questions");
            self.surface.render(SurfaceUpdate::Suggestions(questions));
        }
    }

    /// Flips the widget open or closed. Closing keeps the transcript.
    pub fn toggle(&self) -> bool {
        let (open, focus) = {
            let mut state = self.state();
            state.ui.is_open = !state.ui.is_open;
            let open = state.ui.is_open;
            (open, open && state.viewport_width > self.options.mobile_breakpoint)
        };

        self.surface.render(SurfaceUpdate::Visibility { open });
        if focus {
            self.surface.render(SurfaceUpdate::FocusInput);
        }
        if open {
            self.track(AnalyticsEvent::chat_opened());
        }

        open
    }

    /// Closes the widget when the user interacts outside of it.
    pub fn dismiss(&self) {
        if self.ui_state().is_open {
            self.toggle();
        }
    }

    /// Programmatic entry point: opens the widget if needed, then submits.
    pub async fn send_message(&self, text: &str) -> SubmitOutcome {
        if !self.ui_state().is_open {
            self.toggle();
        }
        self.submit(text).await
    }

    /// Submits the suggested question at `index` as if it had been typed.
    pub async fn choose_suggestion(&self, index: usize) -> SubmitOutcome {
        let Some(question) = self.state().config.suggested_questions.get(index).cloned() else {
            return SubmitOutcome::Ignored;
        };

        self.surface.render(SurfaceUpdate::SuggestionsDismissed);
        self.submit(&question).await
    }

    /// Runs one exchange to completion.
    ///
    /// Dropping the returned future abandons the exchange: the session goes back to
    /// idle with input enabled and no assistant entry is appended.
    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        let message = text.trim();
        if message.is_empty() {
            return SubmitOutcome::Ignored;
        }

        let (exchange, request) = {
            let mut state = self.state();
            if let Some(active) = state.exchange.active_exchange() {
                tracing::debug!(active = ?active, "submit ignored while an exchange is in flight");
                return SubmitOutcome::Busy;
            }

            let exchange = state.alloc_exchange_id();
            if !state.transition(ExchangeTransition::Send(exchange)) {
                return SubmitOutcome::Busy;
            }

            state.transcript.push(TranscriptEntry::user(message));
            state.ui.input_enabled = false;
            state.typing_visible = true;

            let history = state.transcript.history(self.options.history_limit);
            (exchange, ChatRequest::new(message, history))
        };
        let guard = ExchangeGuard {
            session: self,
            exchange,
        };

        self.surface.render(SurfaceUpdate::AppendMessage {
            role: Role::User,
            markup: render_plain(message),
        });
        self.surface.render(SurfaceUpdate::InputEnabled(false));
        self.surface.render(SurfaceUpdate::TypingIndicator(true));

        let result = match self.service.send(&request).await {
            Ok(response) => self.consume_response(exchange, response).await,
            Err(error) => {
                tracing::warn!(exchange = ?exchange, error = %error, "chat request failed");
                Err(ExchangeFailure::before_stream(FailureKind::Network))
            }
        };

        let outcome = match result {
            Ok(()) => SubmitOutcome::Committed,
            Err(failure) => {
                self.fail_exchange(exchange, &failure);
                SubmitOutcome::Failed(failure.kind)
            }
        };

        drop(guard);
        if outcome.is_committed() {
            self.track(AnalyticsEvent::chat_message_sent());
        }
        outcome
    }

    async fn consume_response(
        &self,
        exchange: ExchangeId,
        response: ChatResponse,
    ) -> Result<(), ExchangeFailure> {
        if !response.is_success() {
            tracing::warn!(
                exchange = ?exchange,
                status = response.status,
                "chat service returned an error status"
            );
            return Err(ExchangeFailure::before_stream(FailureKind::Server {
                status: response.status,
            }));
        }

        let streaming = response.is_event_stream();
        if streaming {
            self.state().transition(ExchangeTransition::BeginStream(exchange));
        }

        let mut fragments = read_response(response);
        let mut accumulated = String::new();
        let mut partial_shown = false;

        while let Some(item) = fragments.next().await {
            let fragment = match item {
                Ok(fragment) => fragment,
                Err(error) => {
                    tracing::warn!(
                        exchange = ?exchange,
                        error = %error,
                        "chat response could not be read"
                    );
                    return Err(ExchangeFailure {
                        kind: classify_stream_error(&error, streaming),
                        partial_shown,
                    });
                }
            };

            self.hide_typing();
            accumulated.push_str(&fragment.text);

            if streaming {
                // Always re-render from the plain accumulator, never from prior markup.
                self.surface.render(SurfaceUpdate::StreamProgress {
                    markup: render_markdown(&accumulated),
                });
                partial_shown = true;
            }
        }

        if accumulated.is_empty() {
            let error = StreamError::EmptyResponse {
                stage: "consume-response",
            };
            tracing::warn!(exchange = ?exchange, error = %error, "chat response carried no text");
            return Err(ExchangeFailure {
                kind: FailureKind::StreamRead,
                partial_shown,
            });
        }

        {
            let mut state = self.state();
            if !streaming {
                state.transition(ExchangeTransition::Receive(exchange));
            }
            if !state.transition(ExchangeTransition::Commit(exchange)) {
                return Err(ExchangeFailure {
                    kind: FailureKind::StreamRead,
                    partial_shown,
                });
            }
            state
                .transcript
                .push(TranscriptEntry::assistant(accumulated.clone()));
        }

        let markup = render_markdown(&accumulated);
        if partial_shown {
            self.surface.render(SurfaceUpdate::StreamCommitted { markup });
        } else {
            self.surface.render(SurfaceUpdate::AppendMessage {
                role: Role::Assistant,
                markup,
            });
        }

        tracing::info!(
            exchange = ?exchange,
            streamed = streaming,
            chars = accumulated.chars().count(),
            "exchange committed"
        );
        Ok(())
    }

    fn fail_exchange(&self, exchange: ExchangeId, failure: &ExchangeFailure) {
        let fallback = failure.kind.fallback_message();

        {
            let mut state = self.state();
            state.transition(ExchangeTransition::Fail {
                exchange,
                kind: failure.kind,
            });
            state.transcript.push(TranscriptEntry::assistant(fallback));
        }

        self.hide_typing();
        let markup = render_markdown(fallback);
        if failure.partial_shown {
            self.surface.render(SurfaceUpdate::StreamCommitted { markup });
        } else {
            self.surface.render(SurfaceUpdate::AppendMessage {
                role: Role::Assistant,
                markup,
            });
        }
    }

    fn settle(&self, exchange: ExchangeId) {
        let typing_was_visible = {
            let mut state = self.state();
            if state.exchange.active_exchange() == Some(exchange) {
                tracing::debug!(
                    exchange = ?exchange,
                    phase = state.exchange.phase(),
                    "exchange abandoned before it resolved"
                );
                state.transition(ExchangeTransition::Abandon(exchange));
            }
            state.transition(ExchangeTransition::Settle);
            state.ui.input_enabled = true;
            std::mem::replace(&mut state.typing_visible, false)
        };

        if typing_was_visible {
            self.surface.render(SurfaceUpdate::TypingIndicator(false));
        }
        self.surface.render(SurfaceUpdate::InputEnabled(true));
    }

    fn hide_typing(&self) {
        let was_visible = std::mem::replace(&mut self.state().typing_visible, false);
        if was_visible {
            self.surface.render(SurfaceUpdate::TypingIndicator(false));
        }
    }

    fn track(&self, event: AnalyticsEvent) {
        let Some(analytics) = &self.analytics else {
            return;
        };

        if panic::catch_unwind(AssertUnwindSafe(|| analytics.track(event))).is_err() {
            tracing::warn!(event = event.name, "analytics sink panicked; event dropped");
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn classify_stream_error(error: &StreamError, streaming: bool) -> FailureKind {
    match error {
        StreamError::ReadChunk { .. } if streaming => FailureKind::StreamRead,
        StreamError::EmptyResponse { .. } => FailureKind::StreamRead,
        StreamError::ReadChunk { .. } | StreamError::MalformedBody { .. } => FailureKind::Network,
    }
}
