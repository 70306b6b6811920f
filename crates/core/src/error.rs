//! Error types shared across the catalog gateway

use thiserror::Error;

/// Errors raised while assembling gateway configuration
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A configuration value is missing, unparsable or out of range
    #[error("Configuration error: {message}")]
    ConfigurationError {
        message: String,
        /// Environment variable responsible for the error, if known
        key: Option<String>,
    },
}

impl GatewayError {
    pub fn config(message: impl Into<String>, key: &str) -> Self {
        Self::ConfigurationError {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Environment variable the error refers to
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::ConfigurationError { key, .. } => key.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display_and_key() {
        let err = GatewayError::config("timeout must be positive", "CATALOG_GATEWAY_TIMEOUT");
        assert_eq!(
            err.to_string(),
            "Configuration error: timeout must be positive"
        );
        assert_eq!(err.key(), Some("CATALOG_GATEWAY_TIMEOUT"));
    }
}
