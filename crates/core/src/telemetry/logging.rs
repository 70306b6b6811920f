//! Subscriber configuration and span helpers

use std::str::FromStr;
use thiserror::Error;
use tracing::{span, Level, Span};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging setup errors
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Unknown log format: {0} (expected 'pretty' or 'json')")]
    UnknownFormat(String),

    #[error("Failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Output format of the fmt layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(TelemetryError::UnknownFormat(other.to_string())),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Service name attached to the startup event
    pub service_name: String,

    /// Filter used when `RUST_LOG` is not set
    pub default_filter: String,

    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            service_name: "catalog-gateway".to_string(),
            default_filter: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl LoggingConfig {
    /// Create config from environment variables
    ///
    /// - SERVICE_NAME: Service identifier
    /// - CATALOG_GATEWAY_LOG_FORMAT: `pretty` or `json`
    /// - RUST_ENV: If "production" and no format is set, defaults to JSON
    pub fn from_env() -> Self {
        let service_name =
            std::env::var("SERVICE_NAME").unwrap_or_else(|_| "catalog-gateway".to_string());

        let is_production = std::env::var("RUST_ENV")
            .map(|e| e == "production")
            .unwrap_or(false);

        let format = std::env::var("CATALOG_GATEWAY_LOG_FORMAT")
            .ok()
            .and_then(|f| f.parse().ok())
            .unwrap_or(if is_production {
                LogFormat::Json
            } else {
                LogFormat::Pretty
            });

        Self {
            service_name,
            format,
            ..Self::default()
        }
    }
}

/// Install the global tracing subscriber
///
/// Must be called once at startup.
///
/// # Errors
///
/// Returns `SubscriberInit` if a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format {
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init(),
    }
    .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;

    tracing::info!(
        service_name = %config.service_name,
        format = ?config.format,
        "Logging initialized"
    );

    Ok(())
}

/// Create a cache-store command span
///
/// ```rust
/// use catalog_gateway_core::telemetry::store_op_span;
///
/// let _span = store_op_span("GET", "douban:hero:movies");
/// ```
pub fn store_op_span(operation: &str, key: &str) -> Span {
    span!(
        Level::DEBUG,
        "store.command",
        db.system = "redis",
        db.operation = %operation,
        db.key = %key,
    )
}

/// Create an outbound HTTP call span
///
/// ```rust
/// use catalog_gateway_core::telemetry::external_api_span;
///
/// let _span = external_api_span("GET", "https://movie.douban.com/j/search_tags", "douban");
/// ```
pub fn external_api_span(method: &str, url: &str, service: &str) -> Span {
    span!(
        Level::INFO,
        "http.client",
        http.method = %method,
        http.url = %url,
        peer.service = %service,
    )
}
