//! Configuration loader for the catalog gateway
//!
//! Every section reads `CATALOG_GATEWAY_`-prefixed environment variables and
//! falls back to the legacy unprefixed names still used by older deployments
//! (`REDIS_URL`, `DOUBAN_API_PROXY`, `TMDB_API_KEY`, `CACHE_TTL_*`, ...).
//!
//! Override hierarchy: defaults < .env < environment.
//!
//! # Example
//!
//! ```no_run
//! use catalog_gateway_core::config::{load_dotenv, ConfigLoader, GatewayConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! load_dotenv();
//!
//! let config = GatewayConfig::from_env()?;
//! config.validate()?;
//! # Ok(())
//! # }
//! ```

use crate::error::GatewayError;
use std::time::Duration;
use url::Url;

/// Configuration loader trait
///
/// Provides standardized methods for loading and validating configuration from
/// environment variables.
pub trait ConfigLoader: Sized {
    /// Load configuration from environment variables, using defaults for
    /// anything that is not set.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if a value is present but cannot be parsed.
    fn from_env() -> Result<Self, GatewayError>;

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` naming the offending variable.
    fn validate(&self) -> Result<(), GatewayError>;
}

/// Redis configuration for the cache and metrics store
///
/// # Environment Variables
///
/// - `CATALOG_GATEWAY_REDIS_URL` / `REDIS_URL` (optional): connection URL (default: `redis://localhost:6379/0`)
/// - `CATALOG_GATEWAY_REDIS_CONNECTION_TIMEOUT` (optional): connect timeout in seconds (default: 5)
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
    /// Connection timeout duration
    pub connection_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
            connection_timeout: Duration::from_secs(5),
        }
    }
}

impl ConfigLoader for RedisConfig {
    fn from_env() -> Result<Self, GatewayError> {
        let defaults = Self::default();

        let url = env_string(&["CATALOG_GATEWAY_REDIS_URL", "REDIS_URL"]).unwrap_or(defaults.url);
        let connection_timeout_secs = parse_env_var(
            "CATALOG_GATEWAY_REDIS_CONNECTION_TIMEOUT",
            defaults.connection_timeout.as_secs(),
        )?;

        Ok(Self {
            url,
            connection_timeout: Duration::from_secs(connection_timeout_secs),
        })
    }

    fn validate(&self) -> Result<(), GatewayError> {
        Url::parse(&self.url).map_err(|e| {
            GatewayError::config(format!("Invalid REDIS_URL: {}", e), "CATALOG_GATEWAY_REDIS_URL")
        })?;

        if self.connection_timeout.is_zero() {
            return Err(GatewayError::config(
                "connection_timeout must be greater than 0 seconds",
                "CATALOG_GATEWAY_REDIS_CONNECTION_TIMEOUT",
            ));
        }

        Ok(())
    }
}

/// Upstream content API configuration
///
/// # Environment Variables
///
/// - `CATALOG_GATEWAY_UPSTREAM_BASE_URL` (optional): content API origin (default: `https://movie.douban.com`)
/// - `CATALOG_GATEWAY_UPSTREAM_PROXIES` / `DOUBAN_API_PROXY` (optional): comma-separated egress proxy base URLs
/// - `CATALOG_GATEWAY_UPSTREAM_PROXY_HOST` (optional): host fragment that routes through a proxy (default: `douban.com`)
/// - `CATALOG_GATEWAY_UPSTREAM_MAX_ATTEMPTS` (optional): attempts per fetch (default: 3)
/// - `CATALOG_GATEWAY_UPSTREAM_BACKOFF_MS` (optional): base backoff in milliseconds (default: 1000)
/// - `CATALOG_GATEWAY_UPSTREAM_TIMEOUT` (optional): per-request timeout in seconds (default: 10)
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub proxies: Vec<String>,
    pub proxy_host_match: String,
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub request_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://movie.douban.com".to_string(),
            proxies: Vec::new(),
            proxy_host_match: "douban.com".to_string(),
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ConfigLoader for UpstreamConfig {
    fn from_env() -> Result<Self, GatewayError> {
        let defaults = Self::default();

        let base_url =
            env_string(&["CATALOG_GATEWAY_UPSTREAM_BASE_URL"]).unwrap_or(defaults.base_url);
        let proxies = env_string(&["CATALOG_GATEWAY_UPSTREAM_PROXIES", "DOUBAN_API_PROXY"])
            .map(|raw| split_list(&raw))
            .unwrap_or_default();
        let proxy_host_match = env_string(&["CATALOG_GATEWAY_UPSTREAM_PROXY_HOST"])
            .unwrap_or(defaults.proxy_host_match);
        let max_attempts =
            parse_env_var("CATALOG_GATEWAY_UPSTREAM_MAX_ATTEMPTS", defaults.max_attempts)?;
        let backoff_ms = parse_env_var("CATALOG_GATEWAY_UPSTREAM_BACKOFF_MS", 1000u64)?;
        let timeout_secs = parse_env_var(
            "CATALOG_GATEWAY_UPSTREAM_TIMEOUT",
            defaults.request_timeout.as_secs(),
        )?;

        Ok(Self {
            base_url,
            proxies,
            proxy_host_match,
            max_attempts,
            base_backoff: Duration::from_millis(backoff_ms),
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }

    fn validate(&self) -> Result<(), GatewayError> {
        Url::parse(&self.base_url).map_err(|e| {
            GatewayError::config(
                format!("Invalid upstream base URL: {}", e),
                "CATALOG_GATEWAY_UPSTREAM_BASE_URL",
            )
        })?;

        for proxy in &self.proxies {
            Url::parse(proxy).map_err(|e| {
                GatewayError::config(
                    format!("Invalid proxy URL '{}': {}", proxy, e),
                    "CATALOG_GATEWAY_UPSTREAM_PROXIES",
                )
            })?;
        }

        if self.max_attempts == 0 {
            return Err(GatewayError::config(
                "max_attempts must be greater than 0",
                "CATALOG_GATEWAY_UPSTREAM_MAX_ATTEMPTS",
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(GatewayError::config(
                "request_timeout must be greater than 0 seconds",
                "CATALOG_GATEWAY_UPSTREAM_TIMEOUT",
            ));
        }

        Ok(())
    }
}

/// Enrichment (backdrop lookup) API configuration
///
/// An empty key list is valid: enrichment is then reported as unavailable.
///
/// # Environment Variables
///
/// - `CATALOG_GATEWAY_ENRICHMENT_API_KEYS` / `TMDB_API_KEY` (optional): comma-separated bearer tokens
/// - `CATALOG_GATEWAY_ENRICHMENT_BASE_URL` / `TMDB_BASE_URL` (optional): API base (default: `https://api.themoviedb.org/3`)
/// - `CATALOG_GATEWAY_ENRICHMENT_IMAGE_BASE` / `TMDB_IMAGE_BASE` (optional): image base (default: `https://image.tmdb.org/t/p/original`)
/// - `CATALOG_GATEWAY_ENRICHMENT_TIMEOUT` (optional): request timeout in seconds (default: 5)
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub api_keys: Vec<String>,
    pub base_url: String,
    pub image_base: String,
    pub request_timeout: Duration,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            base_url: "https://api.themoviedb.org/3".to_string(),
            image_base: "https://image.tmdb.org/t/p/original".to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl ConfigLoader for EnrichmentConfig {
    fn from_env() -> Result<Self, GatewayError> {
        let defaults = Self::default();

        let api_keys = env_string(&["CATALOG_GATEWAY_ENRICHMENT_API_KEYS", "TMDB_API_KEY"])
            .map(|raw| split_list(&raw))
            .unwrap_or_default();
        let base_url = env_string(&["CATALOG_GATEWAY_ENRICHMENT_BASE_URL", "TMDB_BASE_URL"])
            .unwrap_or(defaults.base_url);
        let image_base = env_string(&["CATALOG_GATEWAY_ENRICHMENT_IMAGE_BASE", "TMDB_IMAGE_BASE"])
            .unwrap_or(defaults.image_base);
        let timeout_secs = parse_env_var(
            "CATALOG_GATEWAY_ENRICHMENT_TIMEOUT",
            defaults.request_timeout.as_secs(),
        )?;

        Ok(Self {
            api_keys,
            base_url,
            image_base,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }

    fn validate(&self) -> Result<(), GatewayError> {
        Url::parse(&self.base_url).map_err(|e| {
            GatewayError::config(
                format!("Invalid enrichment base URL: {}", e),
                "CATALOG_GATEWAY_ENRICHMENT_BASE_URL",
            )
        })?;

        Url::parse(&self.image_base).map_err(|e| {
            GatewayError::config(
                format!("Invalid enrichment image base: {}", e),
                "CATALOG_GATEWAY_ENRICHMENT_IMAGE_BASE",
            )
        })?;

        if self.request_timeout.is_zero() {
            return Err(GatewayError::config(
                "request_timeout must be greater than 0 seconds",
                "CATALOG_GATEWAY_ENRICHMENT_TIMEOUT",
            ));
        }

        Ok(())
    }
}

/// Cache lifetimes per data-set class, configured in minutes
///
/// # Environment Variables
///
/// - `CATALOG_GATEWAY_CACHE_TTL_HERO` / `CACHE_TTL_HERO` (default: 360)
/// - `CATALOG_GATEWAY_CACHE_TTL_DETAIL` / `CACHE_TTL_DETAIL` (default: 1440)
/// - `CATALOG_GATEWAY_CACHE_TTL_CATEGORY` / `CACHE_TTL_CATEGORY` (default: 60)
/// - `CATALOG_GATEWAY_CACHE_TTL_SEARCH` / `CACHE_TTL_SEARCH` (default: 30)
/// - `CATALOG_GATEWAY_CACHE_TTL_DEFAULT` / `CACHE_TTL_DEFAULT` (default: 60)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheTtlConfig {
    pub hero: Duration,
    pub detail: Duration,
    pub category: Duration,
    pub search: Duration,
    pub default: Duration,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            hero: minutes(360),
            detail: minutes(1440),
            category: minutes(60),
            search: minutes(30),
            default: minutes(60),
        }
    }
}

impl ConfigLoader for CacheTtlConfig {
    fn from_env() -> Result<Self, GatewayError> {
        Ok(Self {
            hero: minutes(ttl_minutes("HERO", 360)?),
            detail: minutes(ttl_minutes("DETAIL", 1440)?),
            category: minutes(ttl_minutes("CATEGORY", 60)?),
            search: minutes(ttl_minutes("SEARCH", 30)?),
            default: minutes(ttl_minutes("DEFAULT", 60)?),
        })
    }

    fn validate(&self) -> Result<(), GatewayError> {
        let classes = [
            ("HERO", self.hero),
            ("DETAIL", self.detail),
            ("CATEGORY", self.category),
            ("SEARCH", self.search),
            ("DEFAULT", self.default),
        ];

        for (name, ttl) in classes {
            if ttl.is_zero() {
                return Err(GatewayError::config(
                    format!("cache TTL for {} must be greater than 0 minutes", name),
                    &format!("CATALOG_GATEWAY_CACHE_TTL_{}", name),
                ));
            }
        }

        Ok(())
    }
}

/// Deadlines applied while assembling data sets
///
/// # Environment Variables
///
/// - `CATALOG_GATEWAY_REQUEST_TIMEOUT` (optional): whole-request deadline in seconds (default: 30)
/// - `CATALOG_GATEWAY_ITEM_TIMEOUT` (optional): per-item deadline in seconds (default: 10)
#[derive(Debug, Clone)]
pub struct AggregationConfig {
    pub request_timeout: Duration,
    pub item_timeout: Duration,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            item_timeout: Duration::from_secs(10),
        }
    }
}

impl ConfigLoader for AggregationConfig {
    fn from_env() -> Result<Self, GatewayError> {
        let request_secs = parse_env_var("CATALOG_GATEWAY_REQUEST_TIMEOUT", 30u64)?;
        let item_secs = parse_env_var("CATALOG_GATEWAY_ITEM_TIMEOUT", 10u64)?;

        Ok(Self {
            request_timeout: Duration::from_secs(request_secs),
            item_timeout: Duration::from_secs(item_secs),
        })
    }

    fn validate(&self) -> Result<(), GatewayError> {
        if self.request_timeout.is_zero() {
            return Err(GatewayError::config(
                "request_timeout must be greater than 0 seconds",
                "CATALOG_GATEWAY_REQUEST_TIMEOUT",
            ));
        }

        if self.item_timeout.is_zero() || self.item_timeout > self.request_timeout {
            return Err(GatewayError::config(
                format!(
                    "item_timeout ({:?}) must be positive and no longer than request_timeout ({:?})",
                    self.item_timeout, self.request_timeout
                ),
                "CATALOG_GATEWAY_ITEM_TIMEOUT",
            ));
        }

        Ok(())
    }
}

/// Full gateway configuration
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub redis: RedisConfig,
    pub upstream: UpstreamConfig,
    pub enrichment: EnrichmentConfig,
    pub cache_ttl: CacheTtlConfig,
    pub aggregation: AggregationConfig,
}

impl ConfigLoader for GatewayConfig {
    fn from_env() -> Result<Self, GatewayError> {
        Ok(Self {
            redis: RedisConfig::from_env()?,
            upstream: UpstreamConfig::from_env()?,
            enrichment: EnrichmentConfig::from_env()?,
            cache_ttl: CacheTtlConfig::from_env()?,
            aggregation: AggregationConfig::from_env()?,
        })
    }

    fn validate(&self) -> Result<(), GatewayError> {
        self.redis.validate()?;
        self.upstream.validate()?;
        self.enrichment.validate()?;
        self.cache_ttl.validate()?;
        self.aggregation.validate()
    }
}

fn minutes(value: u64) -> Duration {
    Duration::from_secs(value * 60)
}

fn ttl_minutes(class: &str, default: u64) -> Result<u64, GatewayError> {
    let primary = format!("CATALOG_GATEWAY_CACHE_TTL_{}", class);
    let legacy = format!("CACHE_TTL_{}", class);

    if std::env::var(&primary).is_ok() {
        parse_env_var(&primary, default)
    } else {
        parse_env_var(&legacy, default)
    }
}

/// Read the first non-empty variable among `keys`
fn env_string(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// Split a comma-separated list, trimming items and dropping empty ones
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Parse environment variable with default value
///
/// # Errors
///
/// Returns `ConfigurationError` if the variable exists but cannot be parsed
fn parse_env_var<T>(key: &str, default: T) -> Result<T, GatewayError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(key)
        .ok()
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|e| GatewayError::config(format!("Failed to parse {}: {}", key, e), key))
        })
        .unwrap_or(Ok(default))
}

/// Load .env file if present
///
/// Missing files are ignored; any other failure is reported on stderr since
/// logging is usually not initialized yet.
pub fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }
}
