use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use sitechat::chat::{ChatSession, ChatSurface, Role, SubmitOutcome, SurfaceUpdate};
use sitechat::settings::SettingsStore;
use sitechat::telemetry::{TracingAnalytics, init_tracing};
use sitechat_transport::create_service;
use snafu::{ResultExt, Whatever};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Viewport width reported by the terminal host; wide enough to auto-focus input.
const TERMINAL_VIEWPORT_WIDTH: u32 = 1280;

/// Prints surface updates to stdout, streaming only the new tail of each progress render.
#[derive(Default)]
struct TerminalSurface {
    printed: Mutex<String>,
}

impl TerminalSurface {
    fn print_delta(&self, markup: &str) {
        let mut printed = self.printed.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tail) = markup.strip_prefix(printed.as_str()) {
            print!("{tail}");
            let _ = std::io::stdout().flush();
        }
        *printed = markup.to_string();
    }

    fn finish_stream(&self, markup: &str) {
        let mut printed = self.printed.lock().unwrap_or_else(PoisonError::into_inner);
        if printed.is_empty() {
            println!("assistant> {markup}");
        } else {
            println!("\n[final] {markup}");
        }
        printed.clear();
    }
}

impl ChatSurface for TerminalSurface {
    fn render(&self, update: SurfaceUpdate) {
        match update {
            SurfaceUpdate::Visibility { open } => {
                println!("[chat {}]", if open { "opened" } else { "closed" });
            }
            SurfaceUpdate::FocusInput | SurfaceUpdate::InputEnabled(_) => {}
            SurfaceUpdate::TypingIndicator(visible) => {
                if visible {
                    println!("assistant is typing...");
                }
            }
            SurfaceUpdate::Suggestions(questions) => {
                println!("Suggested questions (use /ask N):");
                for (index, question) in questions.iter().enumerate() {
                    println!("  {index}. {question}");
                }
            }
            SurfaceUpdate::SuggestionsDismissed => {}
            SurfaceUpdate::AppendMessage { role, markup } => match role {
                Role::User => println!("you> {markup}"),
                Role::Assistant => println!("assistant> {markup}"),
            },
            SurfaceUpdate::StreamProgress { markup } => {
                {
                    let printed = self.printed.lock().unwrap_or_else(PoisonError::into_inner);
                    if printed.is_empty() {
                        print!("assistant> ");
                    }
                }
                self.print_delta(markup.as_str());
            }
            SurfaceUpdate::StreamCommitted { markup } => self.finish_stream(markup.as_str()),
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(error) = run().await {
        tracing::error!(error = %error, "sitechat terminated");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Whatever> {
    let store = SettingsStore::load();

    if std::env::args().nth(1).as_deref() == Some("init") {
        store
            .save()
            .whatever_context("could not write default settings")?;
        println!("wrote {}", store.config_path().display());
        return Ok(());
    }

    let settings = store.settings();
    let service = create_service(settings.to_service_config())
        .whatever_context("could not create chat service")?;

    let session = ChatSession::new(
        service,
        Arc::new(TerminalSurface::default()),
        settings.session_options(),
    )
    .with_analytics(Arc::new(TracingAnalytics));
    session.set_viewport_width(TERMINAL_VIEWPORT_WIDTH);

    session.start().await;
    session.toggle();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .whatever_context("could not read from stdin")?
    {
        let command = line.trim();
        let outcome = match command {
            "/quit" => break,
            "/close" => {
                session.dismiss();
                continue;
            }
            "/open" => {
                if !session.ui_state().is_open {
                    session.toggle();
                }
                continue;
            }
            _ => match command.strip_prefix("/ask ") {
                Some(index) => match index.trim().parse::<usize>() {
                    Ok(index) => session.choose_suggestion(index).await,
                    Err(_) => {
                        println!("usage: /ask N");
                        continue;
                    }
                },
                None => session.send_message(command).await,
            },
        };

        if let SubmitOutcome::Failed(kind) = outcome {
            tracing::debug!(?kind, "exchange ended with a fallback reply");
        }
    }

    Ok(())
}
