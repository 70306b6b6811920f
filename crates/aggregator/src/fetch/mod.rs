//! Resilient outbound GET with proxy rotation, client-identity rotation and
//! exponential backoff
//!
//! Every attempt independently decides its route. When a proxy pool is
//! configured and the target host matches the upstream domain, the request is
//! rewritten to `proxy_base + path?query` and sent without browser headers
//! (the proxy sets its own). Otherwise the request goes direct with a random
//! browser user agent, a static referer and accept headers.
//!
//! Transport errors, 403/429 (rate limited) and any other non-2xx status are
//! retried. After the attempt budget is spent a single
//! [`FetchError::Exhausted`] wraps the last observed error.

mod rotation;

pub use rotation::{KeyRotator, ProxyPool};

use catalog_gateway_core::config::UpstreamConfig;
use catalog_gateway_core::retry::{retry_with_backoff, RetryPolicy};
use catalog_gateway_core::telemetry::external_api_span;
use rand::seq::SliceRandom;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, REFERER, USER_AGENT};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn, Instrument};
use url::Url;

/// Browser signatures used for direct requests
const USER_AGENTS: [&str; 7] = [
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 18_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Mobile Safari/537.36",
];

const ACCEPT_VALUE: &str = "application/json, text/plain, */*";
const ACCEPT_LANGUAGE_VALUE: &str = "zh-CN,zh;q=0.9,en;q=0.8";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Rate limited: HTTP {status}")]
    RateLimited { status: u16 },

    #[error("Unexpected status: HTTP {status}")]
    Status { status: u16 },

    #[error("Failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("All {attempts} attempts failed: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<FetchError>,
    },
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidUrl { .. } | Self::Exhausted { .. })
    }

    /// HTTP status of the last failed attempt, when one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { status } | Self::Status { status } => Some(*status),
            Self::Exhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}

/// Chooses a random browser signature
pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// HTTP GET with retries, shared by every upstream call
#[derive(Clone)]
pub struct ResilientFetcher {
    client: Client,
    proxies: ProxyPool,
    proxy_host_match: String,
    referer: String,
    policy: RetryPolicy,
}

impl ResilientFetcher {
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            client,
            proxies: ProxyPool::new(config.proxies.clone()),
            proxy_host_match: config.proxy_host_match.clone(),
            referer: format!("{}/", config.base_url.trim_end_matches('/')),
            policy: RetryPolicy::exponential(config.max_attempts, config.base_backoff),
        })
    }

    pub fn has_proxy(&self) -> bool {
        !self.proxies.is_empty()
    }

    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts.max(1)
    }

    /// Fetch `url`, returning the full response body of the first 2xx answer
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let target = Url::parse(url).map_err(|source| FetchError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;

        let max_attempts = self.max_attempts();
        let result = retry_with_backoff(
            |attempt| {
                let target = &target;
                async move {
                    let outcome = self.attempt(target).await;
                    if let Err(e) = &outcome {
                        warn!(
                            attempt = attempt,
                            max_attempts = max_attempts,
                            status = ?e.status(),
                            url = %target,
                            error = %e,
                            "Fetch attempt failed"
                        );
                    }
                    outcome
                }
            },
            self.policy.clone(),
            FetchError::is_retryable,
        )
        .instrument(external_api_span("GET", url, "upstream"))
        .await;

        result.map_err(|last| {
            if last.is_retryable() {
                FetchError::Exhausted {
                    attempts: max_attempts,
                    last: Box::new(last),
                }
            } else {
                last
            }
        })
    }

    fn routes_through_proxy(&self, target: &Url) -> bool {
        !self.proxies.is_empty()
            && target
                .host_str()
                .is_some_and(|host| host.contains(&self.proxy_host_match))
    }

    async fn attempt(&self, target: &Url) -> Result<Vec<u8>, FetchError> {
        let proxy = if self.routes_through_proxy(target) {
            self.proxies.pick()
        } else {
            None
        };

        let request = match proxy {
            Some(base) => {
                let rewritten = format!("{}{}", base, path_and_query(target));
                debug!(proxy = %base, url = %rewritten, "Routing through proxy");
                self.client.get(rewritten)
            }
            None => self
                .client
                .get(target.clone())
                .header(USER_AGENT, random_user_agent())
                .header(REFERER, &self.referer)
                .header(ACCEPT, ACCEPT_VALUE)
                .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_VALUE)
                .header(CACHE_CONTROL, "no-cache"),
        };

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            // Release the connection without reading the body
            drop(response);
            return Err(FetchError::RateLimited {
                status: status.as_u16(),
            });
        }

        if !status.is_success() {
            drop(response);
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(FetchError::Body)?;
        Ok(body.to_vec())
    }
}

fn path_and_query(target: &Url) -> String {
    match target.query() {
        Some(query) => format!("{}?{}", target.path(), query),
        None => target.path().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_and_query() {
        let url = Url::parse("https://movie.douban.com/j/search_subjects?type=movie&tag=%E7%83%AD")
            .unwrap();
        assert_eq!(
            path_and_query(&url),
            "/j/search_subjects?type=movie&tag=%E7%83%AD"
        );

        let bare = Url::parse("https://movie.douban.com/j/search_tags").unwrap();
        assert_eq!(path_and_query(&bare), "/j/search_tags");
    }

    #[test]
    fn test_retry_classification() {
        assert!(FetchError::RateLimited { status: 429 }.is_retryable());
        assert!(FetchError::Status { status: 502 }.is_retryable());

        let exhausted = FetchError::Exhausted {
            attempts: 3,
            last: Box::new(FetchError::Status { status: 503 }),
        };
        assert!(!exhausted.is_retryable());
        assert_eq!(exhausted.status(), Some(503));
        assert_eq!(
            exhausted.to_string(),
            "All 3 attempts failed: Unexpected status: HTTP 503"
        );
    }

    #[test]
    fn test_proxy_routing_requires_matching_host() {
        let config = UpstreamConfig {
            proxies: vec!["http://proxy.example".to_string()],
            ..UpstreamConfig::default()
        };
        let fetcher = ResilientFetcher::from_config(&config).unwrap();

        let upstream = Url::parse("https://movie.douban.com/j/x").unwrap();
        let enrichment = Url::parse("https://api.themoviedb.org/3").unwrap();

        assert!(fetcher.routes_through_proxy(&upstream));
        assert!(!fetcher.routes_through_proxy(&enrichment));

        let direct = ResilientFetcher::from_config(&UpstreamConfig::default()).unwrap();
        assert!(!direct.routes_through_proxy(&upstream));
    }

    #[test]
    fn test_user_agent_pool() {
        assert!(USER_AGENTS.contains(&random_user_agent()));
    }
}
