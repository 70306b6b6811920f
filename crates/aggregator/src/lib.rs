//! Catalog Gateway Aggregator
//!
//! The fetch-aggregate-cache engine behind the catalog gateway: a resilient
//! HTTP fetcher with proxy and credential rotation, an order-preserving
//! concurrent fan-out with per-task deadlines, a cross-source matcher for
//! enrichment lookups, a TTL cache adapter with fail-open helpers, and a
//! metrics recorder, all composed by [`CatalogService`] into named data sets.

pub mod cache;
pub mod catalog;
pub mod enrichment;
pub mod fanout;
pub mod fetch;
pub mod matcher;
pub mod metrics;
pub mod upstream;

// Re-export main types
pub use cache::{
    CacheError, CacheKey, CacheStore, KeyValueStore, MemoryStore, RedisStore, Served, StoreError,
    StoreOp, TtlClass, TtlStatus,
};
pub use catalog::{
    CatalogError, CatalogService, Dataset, HeroMovie, Lane, LaneSet, Listing, ListingFilters,
    SearchQuery,
};
pub use enrichment::{EnrichmentClient, EnrichmentError};
pub use fanout::{Deadline, FanOutTask};
pub use fetch::{FetchError, KeyRotator, ProxyPool, ResilientFetcher};
pub use matcher::{select_best, Candidate, MatchResult};
pub use metrics::{ApiStats, DailyStats, MetricsError, MetricsRecorder, OverallStats};
pub use upstream::{ContentApi, UpstreamError};
