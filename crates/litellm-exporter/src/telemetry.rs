//! Logging setup

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingSettings};

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over `logging.level` when set.
pub fn init(settings: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_for(&settings.level));
    let registry = tracing_subscriber::registry().with(filter);

    match settings.format {
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).init(),
        LogFormat::Json => registry.with(fmt::layer().json().with_current_span(true)).init(),
    }
}

/// Filter for a configured level, falling back to `info` when it does not parse
fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_new(level.to_ascii_lowercase()).unwrap_or_else(|_| EnvFilter::new("info"))
}
