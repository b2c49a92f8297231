//! # Structured Logging
//!
//! Sets up the global `tracing` subscriber and provides the request id that
//! every request span carries.
//!
//! Captured identity headers are never logged by value; log sites record the
//! header names only.

use tracing::level_filters::LevelFilter;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};
use uuid::Uuid;

use crate::caching::key_generator::AuthContext;
use crate::observability::config::{LogConfig, LogFormat};

/// Request id attached to each request span
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a new request id
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Map a configured level name onto a tracing level, defaulting to INFO
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Install the global subscriber.
///
/// A valid `RUST_LOG` replaces the configured level entirely; otherwise the
/// configured level applies. Calling this twice is harmless; the second call
/// only logs a warning.
pub fn init_logging(config: &LogConfig) {
    let level = parse_level(&config.level);
    let env_filter = build_filter(level);

    let result = match config.format {
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init(),
        LogFormat::Text => Registry::default()
            .with(env_filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init(),
    };

    if result.is_err() {
        warn!("Tracing subscriber already initialized, skipping initialization");
        return;
    }

    info!(level = %level, format = %config.format, "Logging initialized");
}

/// `RUST_LOG` when it parses, the configured level otherwise
fn build_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(LevelFilter::from_level(level).to_string()))
}

/// Header names of a captured identity context, for log fields
pub fn auth_header_names(auth_headers: &AuthContext) -> String {
    auth_headers
        .keys()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(",")
}
