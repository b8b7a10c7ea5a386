use tracing_subscriber::EnvFilter;

use crate::chat::{AnalyticsEvent, AnalyticsSink};

pub const DEFAULT_LOG_FILTER: &str = "info,sitechat=debug,sitechat_transport=debug";

/// Installs the stderr subscriber. `RUST_LOG` overrides [`DEFAULT_LOG_FILTER`].
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

/// Analytics sink that records engagement events as structured log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAnalytics;

impl AnalyticsSink for TracingAnalytics {
    fn track(&self, event: AnalyticsEvent) {
        tracing::info!(
            target: "sitechat::analytics",
            event = event.name,
            category = event.category,
            "analytics event"
        );
    }
}
