//! Request metrics kept in the shared key-value store
//!
//! Layout (all under the `metrics:` prefix):
//!
//! - `metrics:path:{path}` hash: `total`, `success`, `error`, `cache_hits`,
//!   `cache_misses`, `latency_sum`, `min_latency`, `max_latency`
//! - `metrics:daily:{YYYY-MM-DD}` hash: `total`, `latency_sum`, `path:{path}`;
//!   expires after 30 days
//! - `metrics:hourly:{YYYY-MM-DD-HH}` hash: `total`, `latency_sum`; expires
//!   after 48 hours
//! - `metrics:global:total`, `metrics:global:latency_sum` counters
//! - `metrics:paths` set of every recorded path
//! - `metrics:server:start_time` unix seconds of the last process start
//!
//! Calendar buckets use UTC.

use crate::cache::{KeyValueStore, StoreError, StoreOp};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const PATHS_KEY: &str = "metrics:paths";
const GLOBAL_TOTAL_KEY: &str = "metrics:global:total";
const GLOBAL_LATENCY_KEY: &str = "metrics:global:latency_sum";
const START_TIME_KEY: &str = "metrics:server:start_time";

const DAILY_RETENTION: Duration = Duration::from_secs(30 * 24 * 3600);
const HOURLY_RETENTION: Duration = Duration::from_secs(48 * 3600);

const TOP_ENDPOINTS: usize = 10;
const TREND_DAYS: i64 = 7;

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Metrics store error: {0}")]
    Backend(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, MetricsError>;

/// Statistics for one endpoint path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiStats {
    pub path: String,
    pub total_calls: i64,
    pub success_calls: i64,
    pub error_calls: i64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: f64,
    pub min_latency_ms: f64,
    pub cache_hits: i64,
    pub cache_misses: i64,
}

/// One day of the trailing trend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    pub date: String,
    pub total_calls: i64,
    pub avg_latency: f64,
}

/// Whole-service snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallStats {
    pub total_api_calls: i64,
    pub today_api_calls: i64,
    pub avg_latency_ms: f64,
    /// Percentage of cache lookups that hit
    pub cache_hit_rate: f64,
    pub top_endpoints: Vec<ApiStats>,
    /// Oldest day first
    pub daily_trend: Vec<DailyStats>,
    /// Percentage of calls answered with a status outside 200-399
    pub error_rate: f64,
    pub uptime_seconds: i64,
}

/// Records request outcomes and derives snapshots from them
#[derive(Clone)]
pub struct MetricsRecorder {
    store: Arc<dyn KeyValueStore>,
}

fn path_key(path: &str) -> String {
    format!("metrics:path:{}", path)
}

fn daily_key(at: DateTime<Utc>) -> String {
    format!("metrics:daily:{}", day_label(at))
}

fn day_label(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

fn hourly_key(at: DateTime<Utc>) -> String {
    format!("metrics:hourly:{}", at.format("%Y-%m-%d-%H"))
}

fn int_field(fields: &HashMap<String, String>, name: &str) -> i64 {
    fields
        .get(name)
        .and_then(|v| {
            v.parse::<i64>()
                .ok()
                .or_else(|| v.parse::<f64>().ok().map(|f| f as i64))
        })
        .unwrap_or(0)
}

fn float_field(fields: &HashMap<String, String>, name: &str) -> f64 {
    fields
        .get(name)
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn percentage(part: i64, whole: i64) -> f64 {
    if whole > 0 {
        part as f64 / whole as f64 * 100.0
    } else {
        0.0
    }
}

/// Collapse numeric path segments so `/api/v1/detail/1292052` groups as
/// `/api/v1/detail/:id`
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

impl MetricsRecorder {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Record one request outcome as a single atomic batch
    ///
    /// Statuses 200-399 count as success, everything else as error.
    #[instrument(skip(self), fields(path = %path, status = status_code))]
    pub async fn record(
        &self,
        path: &str,
        status_code: u16,
        latency_ms: f64,
        cache_hit: bool,
    ) -> Result<()> {
        self.record_at(Utc::now(), path, status_code, latency_ms, cache_hit)
            .await
    }

    async fn record_at(
        &self,
        now: DateTime<Utc>,
        path: &str,
        status_code: u16,
        latency_ms: f64,
        cache_hit: bool,
    ) -> Result<()> {
        let path_key = path_key(path);
        let daily_key = daily_key(now);
        let hourly_key = hourly_key(now);

        let outcome = if (200..400).contains(&status_code) {
            "success"
        } else {
            "error"
        };
        let cache_field = if cache_hit { "cache_hits" } else { "cache_misses" };

        let hash_incr = |key: &str, field: &str| StoreOp::HashIncr {
            key: key.to_string(),
            field: field.to_string(),
            by: 1,
        };
        let latency_incr = |key: &str| StoreOp::HashIncrFloat {
            key: key.to_string(),
            field: "latency_sum".to_string(),
            by: latency_ms,
        };

        let ops = vec![
            hash_incr(&path_key, "total"),
            latency_incr(&path_key),
            StoreOp::HashMin {
                key: path_key.clone(),
                field: "min_latency".to_string(),
                value: latency_ms,
            },
            StoreOp::HashMax {
                key: path_key.clone(),
                field: "max_latency".to_string(),
                value: latency_ms,
            },
            hash_incr(&path_key, outcome),
            hash_incr(&path_key, cache_field),
            hash_incr(&daily_key, "total"),
            latency_incr(&daily_key),
            hash_incr(&daily_key, &format!("path:{}", path)),
            StoreOp::Expire {
                key: daily_key.clone(),
                ttl: DAILY_RETENTION,
            },
            hash_incr(&hourly_key, "total"),
            latency_incr(&hourly_key),
            StoreOp::Expire {
                key: hourly_key.clone(),
                ttl: HOURLY_RETENTION,
            },
            StoreOp::Incr {
                key: GLOBAL_TOTAL_KEY.to_string(),
                by: 1,
            },
            StoreOp::IncrFloat {
                key: GLOBAL_LATENCY_KEY.to_string(),
                by: latency_ms,
            },
            StoreOp::SetAdd {
                key: PATHS_KEY.to_string(),
                member: path.to_string(),
            },
        ];

        self.store.apply(ops).await?;
        debug!(
            path = %path,
            latency_ms = latency_ms,
            cache_hit = cache_hit,
            "Recorded API call"
        );
        Ok(())
    }

    /// Fail-open variant of [`record`](Self::record) for request paths
    pub async fn observe(&self, path: &str, status_code: u16, latency_ms: f64, cache_hit: bool) {
        if let Err(e) = self.record(path, status_code, latency_ms, cache_hit).await {
            warn!(path = %path, error = %e, "Failed to record metrics");
        }
    }

    /// Store the process start time used for uptime
    pub async fn record_server_start(&self) -> Result<()> {
        self.store
            .set(START_TIME_KEY, Utc::now().timestamp().to_string(), None)
            .await?;
        info!("Recorded server start time");
        Ok(())
    }

    /// Statistics for a single path; an unknown path yields zeroed stats
    pub async fn stats_for(&self, path: &str) -> Result<ApiStats> {
        let fields = self.store.hash_get_all(&path_key(path)).await?;

        let total = int_field(&fields, "total");
        let avg_latency_ms = if total > 0 {
            float_field(&fields, "latency_sum") / total as f64
        } else {
            0.0
        };

        Ok(ApiStats {
            path: path.to_string(),
            total_calls: total,
            success_calls: int_field(&fields, "success"),
            error_calls: int_field(&fields, "error"),
            avg_latency_ms,
            max_latency_ms: float_field(&fields, "max_latency"),
            min_latency_ms: float_field(&fields, "min_latency"),
            cache_hits: int_field(&fields, "cache_hits"),
            cache_misses: int_field(&fields, "cache_misses"),
        })
    }

    pub async fn overall_stats(&self) -> Result<OverallStats> {
        self.overall_stats_at(Utc::now()).await
    }

    async fn overall_stats_at(&self, now: DateTime<Utc>) -> Result<OverallStats> {
        let total: i64 = self
            .store
            .get(GLOBAL_TOTAL_KEY)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let latency_sum: f64 = self
            .store
            .get(GLOBAL_LATENCY_KEY)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0);

        let today = self.store.hash_get_all(&daily_key(now)).await?;

        let mut endpoints = Vec::new();
        for path in self.store.set_members(PATHS_KEY).await? {
            let stats = self.stats_for(&path).await?;
            if stats.total_calls > 0 {
                endpoints.push(stats);
            }
        }

        let path_calls: i64 = endpoints.iter().map(|s| s.total_calls).sum();
        let hits: i64 = endpoints.iter().map(|s| s.cache_hits).sum();
        let misses: i64 = endpoints.iter().map(|s| s.cache_misses).sum();
        let errors: i64 = endpoints.iter().map(|s| s.error_calls).sum();

        // Stable sort keeps enumeration order among equal totals
        endpoints.sort_by(|a, b| b.total_calls.cmp(&a.total_calls));
        endpoints.truncate(TOP_ENDPOINTS);

        let uptime_seconds = self
            .store
            .get(START_TIME_KEY)
            .await?
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|start| *start > 0)
            .map(|start| (now.timestamp() - start).max(0))
            .unwrap_or(0);

        Ok(OverallStats {
            total_api_calls: total,
            today_api_calls: int_field(&today, "total"),
            avg_latency_ms: if total > 0 {
                latency_sum / total as f64
            } else {
                0.0
            },
            cache_hit_rate: percentage(hits, hits + misses),
            top_endpoints: endpoints,
            daily_trend: self.daily_trend(now).await?,
            error_rate: percentage(errors, path_calls),
            uptime_seconds,
        })
    }

    /// Probe each of the last seven daily buckets, oldest first
    async fn daily_trend(&self, now: DateTime<Utc>) -> Result<Vec<DailyStats>> {
        let mut trend = Vec::with_capacity(TREND_DAYS as usize);

        for days_ago in (0..TREND_DAYS).rev() {
            let day = now - ChronoDuration::days(days_ago);
            let fields = self.store.hash_get_all(&daily_key(day)).await?;

            let total_calls = int_field(&fields, "total");
            let avg_latency = if total_calls > 0 {
                float_field(&fields, "latency_sum") / total_calls as f64
            } else {
                0.0
            };

            trend.push(DailyStats {
                date: day_label(day),
                total_calls,
                avg_latency,
            });
        }

        Ok(trend)
    }

    /// Delete every metrics key, returning how many were removed
    pub async fn reset(&self) -> Result<u64> {
        let keys = self.store.keys("metrics:*").await?;
        let removed = self.store.delete(&keys).await?;
        info!(removed = removed, "Reset metrics");
        Ok(removed)
    }
}
