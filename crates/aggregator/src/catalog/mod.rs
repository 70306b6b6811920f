//! Catalog data sets assembled cache-aside from the upstream and enrichment
//! APIs
//!
//! Every read first consults the cache. On a miss the data set is rebuilt
//! through the fan-out runner: each sub-fetch owns one result slot, failures
//! and timeouts degrade that slot only, and the assembled value is written
//! back. Only the complete absence of primary data is an error.

mod lanes;
mod models;

pub use lanes::{
    category_source, filter_display_name, filter_tag, search_term, LaneSet, LaneSpec, HOT_TAG,
};
pub use models::{
    high_resolution_cover, CategoryPage, HeroMovie, Lane, Listing, ListingFilters, Pagination,
    SearchQuery, SearchResult, SubjectDetail,
};

use crate::cache::{CacheError, CacheKey, CacheStore, KeyValueStore, Served, TtlClass};
use crate::enrichment::{EnrichmentClient, EnrichmentError};
use crate::fanout::{self, within, Deadline, FanOutTask};
use crate::upstream::{AdvancedQuery, ContentApi, Subject, SubjectAbstract, UpstreamError};
use catalog_gateway_core::config::{AggregationConfig, GatewayConfig};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const HERO_KEY: &str = "douban:hero:movies";
const CATEGORY_NS: &str = "douban:category";
const FILTERED_NS: &str = "douban:new:filtered";
const DETAIL_NS: &str = "douban:detail";
const SEARCH_NS: &str = "douban:search";
const TAGS_NS: &str = "douban:tags";

const HERO_SOURCE_SIZE: u32 = 20;
const HERO_COUNT: usize = 5;
const LANE_SIZE: u32 = 24;
const MAX_PAGE_SIZE: u32 = 50;
const CATEGORY_ESTIMATED_TOTAL: u32 = 100;
const DETAIL_PHOTOS: u32 = 6;
const DETAIL_COMMENTS: u32 = 5;
const DETAIL_RECOMMENDATIONS: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Invalid parameter {param}: {reason}")]
    InvalidParameter { param: &'static str, reason: String },

    #[error("Subject not found: {id}")]
    NotFound { id: String },

    #[error("No primary data available for {dataset}")]
    NoPrimaryData { dataset: Dataset },

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Enrichment(#[from] EnrichmentError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl CatalogError {
    fn invalid(param: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Cached data sets, addressable for invalidation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    Hero,
    Lanes(LaneSet),
    Category,
    Filtered,
    Detail,
    Search,
    Tags,
}

impl Dataset {
    pub const ALL: [Dataset; 10] = [
        Self::Hero,
        Self::Lanes(LaneSet::Movies),
        Self::Lanes(LaneSet::Tv),
        Self::Lanes(LaneSet::Latest),
        Self::Lanes(LaneSet::Featured),
        Self::Category,
        Self::Filtered,
        Self::Detail,
        Self::Search,
        Self::Tags,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hero => "hero",
            Self::Lanes(set) => set.as_str(),
            Self::Category => "category",
            Self::Filtered => "filtered",
            Self::Detail => "detail",
            Self::Search => "search",
            Self::Tags => "tags",
        }
    }

    /// Single key for fixed data sets, glob for parameterised ones
    fn target(&self) -> Target {
        match self {
            Self::Hero => Target::Key(HERO_KEY),
            Self::Lanes(set) => Target::Key(set.cache_key()),
            Self::Category => Target::Namespace(CATEGORY_NS),
            Self::Filtered => Target::Namespace(FILTERED_NS),
            Self::Detail => Target::Namespace(DETAIL_NS),
            Self::Search => Target::Namespace(SEARCH_NS),
            Self::Tags => Target::Namespace(TAGS_NS),
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dataset {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CatalogError::invalid("dataset", format!("unknown data set '{}'", s)))
    }
}

enum Target {
    Key(&'static str),
    Namespace(&'static str),
}

/// Assembles and caches every catalog data set
#[derive(Clone)]
pub struct CatalogService {
    api: ContentApi,
    enrichment: EnrichmentClient,
    cache: CacheStore,
    aggregation: AggregationConfig,
}

impl CatalogService {
    pub fn new(
        api: ContentApi,
        enrichment: EnrichmentClient,
        cache: CacheStore,
        aggregation: AggregationConfig,
    ) -> Self {
        Self {
            api,
            enrichment,
            cache,
            aggregation,
        }
    }

    /// Wire every client from configuration over a shared store
    pub fn from_config(config: &GatewayConfig, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let api = ContentApi::from_config(&config.upstream).map_err(UpstreamError::from)?;
        let enrichment = EnrichmentClient::from_config(&config.enrichment)?;
        let cache = CacheStore::new(store, config.cache_ttl.clone());

        Ok(Self::new(api, enrichment, cache, config.aggregation.clone()))
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn has_proxy(&self) -> bool {
        self.api.has_proxy()
    }

    pub fn proxy_count(&self) -> usize {
        self.api.proxy_count()
    }

    pub fn enrichment_configured(&self) -> bool {
        self.enrichment.is_configured()
    }

    fn request_deadline(&self) -> Deadline {
        Deadline::after(self.aggregation.request_timeout)
    }

    /// Top rated titles of the hot list, enriched with genres, a short
    /// description and a backdrop
    #[instrument(skip(self))]
    pub async fn hero(&self) -> Result<Served<Vec<HeroMovie>>> {
        let ttl = self.cache.ttl_for(TtlClass::Hero);
        self.cache
            .get_or_compute(HERO_KEY, ttl, |heroes: &Vec<HeroMovie>| !heroes.is_empty(), || {
                self.build_hero()
            })
            .await
    }

    async fn build_hero(&self) -> Result<Vec<HeroMovie>> {
        let deadline = self.request_deadline();
        info!(
            has_proxy = self.has_proxy(),
            proxies = self.proxy_count(),
            "Building hero banner"
        );

        let listing = within(
            deadline,
            self.api.search_subjects("", HOT_TAG, HERO_SOURCE_SIZE, 0),
        )
        .await
        .ok_or(CatalogError::NoPrimaryData {
            dataset: Dataset::Hero,
        })??;

        if listing.is_empty() {
            return Err(CatalogError::NoPrimaryData {
                dataset: Dataset::Hero,
            });
        }

        let mut subjects = listing;
        subjects.sort_by(|a, b| b.rating().total_cmp(&a.rating()));
        subjects.truncate(HERO_COUNT);

        let tasks = subjects
            .into_iter()
            .map(|subject| {
                let fallback = HeroMovie::from_subject(&subject, None);
                let item_deadline = deadline.child(self.aggregation.item_timeout);
                let api = self.api.clone();
                let enrichment = self.enrichment.clone();
                FanOutTask::new(subject.title.clone(), fallback, async move {
                    let hero = enrich_hero(&api, &enrichment, subject, item_deadline).await;
                    Ok::<_, anyhow::Error>(hero)
                })
            })
            .collect();

        let heroes = fanout::run_within(tasks, None, deadline).await;
        info!(count = heroes.len(), "Hero banner built");
        Ok(heroes)
    }

    /// A fixed set of named lanes, one upstream query per lane
    #[instrument(skip(self), fields(lanes = set.as_str()))]
    pub async fn lanes(&self, set: LaneSet) -> Result<Served<Vec<Lane>>> {
        let ttl = self.cache.ttl_for(TtlClass::Category);
        self.cache
            .get_or_compute(set.cache_key(), ttl, |lanes: &Vec<Lane>| has_any(lanes), || async {
                let lanes = self.build_lanes(set).await;
                if has_any(&lanes) {
                    Ok(lanes)
                } else {
                    Err(CatalogError::NoPrimaryData {
                        dataset: Dataset::Lanes(set),
                    })
                }
            })
            .await
    }

    async fn build_lanes(&self, set: LaneSet) -> Vec<Lane> {
        let tasks = set
            .lanes()
            .iter()
            .map(|spec| {
                let api = self.api.clone();
                let spec = *spec;
                FanOutTask::new(spec.tag, Lane::empty(spec.name), async move {
                    let data = api.search_subjects(spec.kind, spec.tag, LANE_SIZE, 0).await?;
                    debug!(tag = spec.tag, count = data.len(), "Lane fetched");
                    Ok::<_, anyhow::Error>(Lane::new(spec.name, data))
                })
            })
            .collect();

        let lanes = fanout::run_within(
            tasks,
            Some(self.aggregation.item_timeout),
            self.request_deadline(),
        )
        .await;

        info!(
            lanes = lanes.len(),
            items = lanes.iter().map(|l| l.data.len()).sum::<usize>(),
            "Lanes built"
        );
        lanes
    }

    /// One page of a known category
    #[instrument(skip(self))]
    pub async fn category_page(
        &self,
        category: &str,
        page: u32,
        limit: u32,
    ) -> Result<Served<CategoryPage>> {
        validate_paging(page, limit, "limit")?;
        let (kind, tag) = category_source(category).ok_or_else(|| {
            CatalogError::invalid("category", format!("unknown category '{}'", category))
        })?;

        let key = CacheKey::new(CATEGORY_NS)
            .segment(category)
            .segment(page)
            .segment(limit);
        let ttl = self.cache.ttl_for(TtlClass::Category);

        self.cache
            .get_or_compute(key.as_str(), ttl, |_: &CategoryPage| true, || async {
                let start = (page - 1) * limit;
                let subjects = self.api.search_subjects(kind, tag, limit, start).await?;
                let len = subjects.len() as u32;

                let total = if len < limit {
                    start + len
                } else {
                    CATEGORY_ESTIMATED_TOTAL
                };

                debug!(category = %category, page = page, count = len, "Category page fetched");
                Ok::<_, CatalogError>(CategoryPage {
                    subjects,
                    pagination: Pagination {
                        page,
                        limit,
                        total,
                        has_more: len == limit,
                    },
                })
            })
            .await
    }

    /// Listing narrowed by type/year/region/genre; the featured lanes when
    /// no filter is set
    #[instrument(skip(self))]
    pub async fn filtered(&self, filters: &ListingFilters) -> Result<Served<Listing>> {
        if !filters.has_filters() {
            let lanes = self.lanes(LaneSet::Featured).await?;
            return Ok(lanes.map(|lanes| Listing {
                lanes,
                pagination: None,
            }));
        }

        validate_paging(filters.page, filters.page_size, "page_size")?;

        let key = CacheKey::new(FILTERED_NS)
            .optional(filters.kind.as_deref())
            .optional(filters.year.as_deref())
            .optional(filters.region.as_deref())
            .optional(filters.genre.as_deref())
            .segment(&filters.sort)
            .segment(filters.page)
            .segment(filters.page_size);
        let ttl = self.cache.ttl_for(TtlClass::Category);

        self.cache
            .get_or_compute(key.as_str(), ttl, |_: &Listing| true, || async {
                let kind = lanes::search_kind(filters);
                let tag = filter_tag(filters);
                let (page, size) = (filters.page, filters.page_size);

                let subjects = self
                    .api
                    .search_subjects(kind, &tag, size, (page - 1) * size)
                    .await?;
                let len = subjects.len() as u32;
                let full = len >= size;

                let total = if full {
                    page * size + size
                } else {
                    (page - 1) * size + len
                };

                Ok::<_, CatalogError>(Listing {
                    lanes: vec![Lane::new(filter_display_name(filters), subjects)],
                    pagination: Some(Pagination {
                        page,
                        limit: size,
                        total,
                        has_more: full,
                    }),
                })
            })
            .await
    }

    /// Detail page: summary plus cover, photos, comments and
    /// recommendations fetched concurrently
    #[instrument(skip(self))]
    pub async fn detail(&self, id: &str) -> Result<Served<SubjectDetail>> {
        let id = id.trim();
        if id.is_empty() {
            return Err(CatalogError::invalid("id", "must not be empty"));
        }

        let key = CacheKey::new(DETAIL_NS).segment(id);
        let ttl = self.cache.ttl_for(TtlClass::Detail);

        self.cache
            .get_or_compute(key.as_str(), ttl, |_: &SubjectDetail| true, || {
                self.build_detail(id)
            })
            .await
    }

    async fn build_detail(&self, id: &str) -> Result<SubjectDetail> {
        let deadline = self.request_deadline();
        let summary = within(deadline, self.api.subject_abstract(id))
            .await
            .ok_or(CatalogError::NoPrimaryData {
                dataset: Dataset::Detail,
            })??
            .ok_or_else(|| CatalogError::NotFound { id: id.to_string() })?;

        let query = search_term(&summary.title);
        let item_deadline = deadline.child(self.aggregation.item_timeout);

        let cover = async {
            if query.is_empty() {
                return Ok(String::new());
            }
            let suggestions = self.api.suggest(&query).await?;
            Ok::<_, UpstreamError>(suggestions
                .into_iter()
                .find(|s| s.id == id)
                .map(|s| s.img)
                .unwrap_or_default())
        };
        let recommendations = async {
            let mut subjects = self.api.recommendations(id).await?;
            subjects.truncate(DETAIL_RECOMMENDATIONS);
            Ok::<_, UpstreamError>(subjects)
        };

        let (cover, photos, comments, recommendations) = tokio::join!(
            or_empty("cover", item_deadline, cover),
            or_empty("photos", item_deadline, self.api.photos(id, DETAIL_PHOTOS, "S")),
            or_empty("comments", item_deadline, self.api.comments(id, DETAIL_COMMENTS)),
            or_empty("recommendations", item_deadline, recommendations),
        );

        Ok(SubjectDetail {
            cover,
            photos,
            comments,
            recommendations,
            ..SubjectDetail::from_abstract(summary)
        })
    }

    /// Suggestions plus, when a type is given, an advanced search
    #[instrument(skip(self, query), fields(q = %query.query))]
    pub async fn search(&self, query: &SearchQuery) -> Result<Served<SearchResult>> {
        let text = query.query.trim();
        if text.is_empty() {
            return Err(CatalogError::invalid("q", "must not be empty"));
        }

        let key = CacheKey::new(SEARCH_NS)
            .segment(text)
            .optional(query.kind.as_deref())
            .segment(&query.sort)
            .optional(query.genres.as_deref())
            .optional(query.year_range.as_deref())
            .segment(query.start)
            .segment(query.limit);
        let ttl = self.cache.ttl_for(TtlClass::Search);

        self.cache
            .get_or_compute(key.as_str(), ttl, |_: &SearchResult| true, || async {
                let kind = query.kind.as_deref().filter(|k| !k.is_empty());
                let deadline = self.request_deadline().child(self.aggregation.item_timeout);

                let suggest = async {
                    let items = self.api.suggest(text).await?;
                    Ok::<_, UpstreamError>(match kind {
                        Some(kind) => items.into_iter().filter(|i| i.kind == kind).collect(),
                        None => items,
                    })
                };
                let advanced = async {
                    let Some(kind) = kind else {
                        return Ok(Vec::new());
                    };
                    let tags = if kind == "tv" { "电视剧" } else { "电影" };
                    self.api
                        .advanced_search(&AdvancedQuery {
                            tags: tags.to_string(),
                            sort: query.sort.clone(),
                            genres: query.genres.clone(),
                            year_range: query.year_range.clone(),
                            start: query.start,
                            limit: query.limit,
                        })
                        .await
                };

                let (suggest, advanced) = tokio::join!(
                    or_empty("suggest", deadline, suggest),
                    or_empty("advanced", deadline, advanced),
                );

                info!(suggest = suggest.len(), advanced = advanced.len(), "Search complete");
                Ok(SearchResult { suggest, advanced })
            })
            .await
    }

    /// Tags available for advanced search of `kind` (`movie` or `tv`)
    #[instrument(skip(self))]
    pub async fn search_tags(&self, kind: &str) -> Result<Served<Vec<String>>> {
        if kind != "movie" && kind != "tv" {
            return Err(CatalogError::invalid("type", "must be 'movie' or 'tv'"));
        }

        let key = CacheKey::new(TAGS_NS).segment(kind);
        let ttl = self.cache.ttl_for(TtlClass::Detail);

        self.cache
            .get_or_compute(key.as_str(), ttl, |tags: &Vec<String>| !tags.is_empty(), || async {
                Ok::<_, CatalogError>(self.api.search_tags(kind).await?)
            })
            .await
    }

    /// Drop the cached entries of one data set, returning how many went
    #[instrument(skip(self))]
    pub async fn invalidate(&self, dataset: Dataset) -> Result<u64> {
        let removed = match dataset.target() {
            Target::Key(key) => u64::from(self.cache.delete(key).await?),
            Target::Namespace(ns) => {
                self.cache
                    .delete_pattern(&CacheKey::new(ns).pattern())
                    .await?
            }
        };

        info!(dataset = %dataset, deleted = removed, "Cache invalidated");
        Ok(removed)
    }

    /// Drop the cached detail page of one subject
    pub async fn invalidate_detail(&self, id: &str) -> Result<bool> {
        let key = CacheKey::new(DETAIL_NS).segment(id.trim());
        Ok(self.cache.delete(key.as_str()).await?)
    }

    /// Drop every catalog entry; metrics are left untouched
    pub async fn invalidate_all(&self) -> Result<u64> {
        let mut removed = 0;
        for dataset in Dataset::ALL {
            removed += self.invalidate(dataset).await?;
        }
        Ok(removed)
    }
}

/// Summary then backdrop for one hero entry, both bounded by `deadline`
///
/// Each step that fails or runs out of time leaves its fields at the
/// listing-only values.
async fn enrich_hero(
    api: &ContentApi,
    enrichment: &EnrichmentClient,
    subject: Subject,
    deadline: Deadline,
) -> HeroMovie {
    let summary = match within(deadline, api.subject_abstract(&subject.id)).await {
        Some(Ok(summary)) => summary,
        Some(Err(e)) => {
            warn!(title = %subject.title, error = %e, "Hero summary failed");
            None
        }
        None => {
            debug!(title = %subject.title, "Hero summary timed out");
            None
        }
    };

    let mut backdrop = None;
    if enrichment.is_configured() {
        let year = summary.as_ref().and_then(SubjectAbstract::year);
        match within(deadline, enrichment.backdrop_for(&subject.title, year)).await {
            Some(Ok(found)) => backdrop = found,
            Some(Err(e)) => warn!(title = %subject.title, error = %e, "Backdrop lookup failed"),
            None => debug!(title = %subject.title, "Backdrop lookup timed out"),
        }
    }

    if backdrop.is_none() {
        debug!(title = %subject.title, "Using cover as horizontal poster");
    }

    let hero = HeroMovie::from_subject(&subject, backdrop);
    match &summary {
        Some(summary) => hero.with_abstract(summary),
        None => hero,
    }
}

/// Inner fetch that degrades to the empty value on error or timeout
async fn or_empty<T, F>(label: &'static str, deadline: Deadline, fetch: F) -> T
where
    T: Default,
    F: Future<Output = std::result::Result<T, UpstreamError>>,
{
    match within(deadline, fetch).await {
        Some(Ok(value)) => value,
        Some(Err(e)) => {
            warn!(part = label, error = %e, "Inner fetch failed, using empty value");
            T::default()
        }
        None => {
            debug!(part = label, "Inner fetch timed out, using empty value");
            T::default()
        }
    }
}

fn has_any(lanes: &[Lane]) -> bool {
    lanes.iter().any(|lane| !lane.data.is_empty())
}

fn validate_paging(page: u32, size: u32, size_param: &'static str) -> Result<()> {
    if page < 1 {
        return Err(CatalogError::invalid("page", "must be at least 1"));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&size) {
        return Err(CatalogError::invalid(
            size_param,
            format!("must be between 1 and {}", MAX_PAGE_SIZE),
        ));
    }
    // Offsets and estimated totals reach at most (page + 1) * size
    if page.checked_add(1).and_then(|next| next.checked_mul(size)).is_none() {
        return Err(CatalogError::invalid("page", "out of range"));
    }
    Ok(())
}
