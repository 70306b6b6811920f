//! Structured logging for the catalog gateway
//!
//! Provides subscriber initialization (human-readable or JSON output filtered
//! through `RUST_LOG`) and span constructors for outbound HTTP calls and
//! cache-store commands.
//!
//! # Example
//!
//! ```rust,no_run
//! use catalog_gateway_core::telemetry::{init_logging, LoggingConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging(&LoggingConfig::from_env())?;
//!     Ok(())
//! }
//! ```

pub mod logging;

pub use self::logging::{
    external_api_span, init_logging, store_op_span, LogFormat, LoggingConfig, TelemetryError,
};
