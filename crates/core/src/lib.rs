//! # Catalog Gateway Core
//!
//! Ambient building blocks shared by the catalog gateway crates.
//!
//! ## Modules
//!
//! - `config`: Configuration loading and validation from the environment
//! - `error`: Configuration error type
//! - `retry`: Exponential backoff retry utilities
//! - `telemetry`: Structured logging initialization and span helpers

pub mod config;
pub mod error;
pub mod retry;
pub mod telemetry;

// Re-export commonly used types
pub use config::{
    load_dotenv, AggregationConfig, CacheTtlConfig, ConfigLoader, EnrichmentConfig,
    GatewayConfig, RedisConfig, UpstreamConfig,
};
pub use error::GatewayError;
pub use retry::{retry_with_backoff, RetryPolicy};
pub use telemetry::{
    external_api_span, init_logging, store_op_span, LogFormat, LoggingConfig, TelemetryError,
};

/// Result type alias for core gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
