//! Enrichment API client (backdrop artwork lookup)
//!
//! Searches the enrichment catalog by title and release year, authenticating
//! each call with the next key from a [`KeyRotator`], and picks the best
//! candidate with [`select_best`].

use crate::fetch::KeyRotator;
use crate::matcher::{select_best, Candidate};
use catalog_gateway_core::config::EnrichmentConfig;
use catalog_gateway_core::telemetry::external_api_span;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tracing::{debug, info, Instrument};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum EnrichmentError {
    #[error("Enrichment API key not configured")]
    Unconfigured,

    #[error("Invalid enrichment URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Enrichment request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Enrichment API returned status {status}")]
    Status { status: u16 },

    #[error("Failed to parse enrichment response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Candidate>,
}

/// Backdrop lookup against the enrichment API
#[derive(Clone)]
pub struct EnrichmentClient {
    client: Client,
    keys: KeyRotator,
    base_url: String,
    image_base: String,
}

impl EnrichmentClient {
    pub fn from_config(config: &EnrichmentConfig) -> Result<Self, EnrichmentError> {
        Self::with_cursor(config, Arc::new(AtomicUsize::new(0)))
    }

    /// Build a client whose key rotation shares an externally owned cursor
    pub fn with_cursor(
        config: &EnrichmentConfig,
        cursor: Arc<AtomicUsize>,
    ) -> Result<Self, EnrichmentError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        let keys = KeyRotator::with_cursor(config.api_keys.clone(), cursor);

        if keys.is_configured() {
            info!(count = keys.len(), "Enrichment API keys configured, rotating");
        }

        Ok(Self {
            client,
            keys,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            image_base: config.image_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.keys.is_configured()
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Absolute backdrop URL for the best match, `Ok(None)` when nothing
    /// matches
    ///
    /// A trailing `(YYYY)` in `title` is stripped and overrides `year`.
    pub async fn backdrop_for(
        &self,
        title: &str,
        year: Option<i32>,
    ) -> Result<Option<String>, EnrichmentError> {
        let api_key = self.keys.next_key().ok_or(EnrichmentError::Unconfigured)?;

        let (clean_title, title_year) = split_title_year(title);
        let year = title_year.or(year);

        let mut url = Url::parse(&format!("{}/search/movie", self.base_url))?;
        url.query_pairs_mut()
            .append_pair("query", clean_title)
            .append_pair("language", "zh-CN");
        if let Some(year) = year {
            url.query_pairs_mut().append_pair("year", &year.to_string());
        }

        let span = external_api_span("GET", url.as_str(), "enrichment");
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", api_key))
            .send()
            .instrument(span)
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(EnrichmentError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        let parsed: SearchResponse = serde_json::from_slice(&body)?;

        if parsed.results.is_empty() {
            debug!(title = %title, "Enrichment: no results");
            return Ok(None);
        }

        let Some(best) = select_best(&parsed.results, clean_title, year) else {
            debug!(
                title = %title,
                candidates = parsed.results.len(),
                "Enrichment: no usable match"
            );
            return Ok(None);
        };

        debug!(
            title = %title,
            matched = %best.candidate.title,
            score = best.score,
            "Enrichment: matched"
        );

        Ok(best
            .candidate
            .image_path
            .map(|path| format!("{}{}", self.image_base, path)))
    }
}

/// Split a trailing `(YYYY)` off a title
///
/// `"Dune (2021)"` becomes `("Dune", Some(2021))`; titles without a
/// parenthesised four-digit year are returned unchanged.
pub fn split_title_year(title: &str) -> (&str, Option<i32>) {
    let bytes = title.as_bytes();

    for close in (5..bytes.len()).rev() {
        if bytes[close] != b')' || bytes[close - 5] != b'(' {
            continue;
        }
        let digits = &bytes[close - 4..close];
        if digits.iter().all(u8::is_ascii_digit) {
            let year = title[close - 4..close].parse().ok();
            return (title[..close - 5].trim(), year);
        }
    }

    (title, None)
}
