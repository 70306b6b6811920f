//! Typed client for the upstream content API
//!
//! Every call goes through the [`ResilientFetcher`]; the JSON body is then
//! decoded into the models in [`models`]. Decoding failures are reported
//! separately from transport failures so callers can log them apart.

pub mod models;

pub use models::{
    AdvancedQuery, Comment, CommentAuthor, Photo, ShortComment, Subject, SubjectAbstract,
    SuggestItem,
};

use crate::fetch::{FetchError, ResilientFetcher};
use catalog_gateway_core::config::UpstreamConfig;
use models::{
    AbstractEnvelope, AdvancedPage, CommentsPage, PhotosPage, RecommendationsPage, SubjectsPage,
    TagsPage,
};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Upstream fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Failed to decode {endpoint} response: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, UpstreamError>;

/// Content API operations
#[derive(Clone)]
pub struct ContentApi {
    fetcher: ResilientFetcher,
    base_url: String,
}

impl ContentApi {
    pub fn new(fetcher: ResilientFetcher, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &UpstreamConfig) -> std::result::Result<Self, FetchError> {
        Ok(Self::new(
            ResilientFetcher::from_config(config)?,
            config.base_url.clone(),
        ))
    }

    pub fn has_proxy(&self) -> bool {
        self.fetcher.has_proxy()
    }

    pub fn proxy_count(&self) -> usize {
        self.fetcher.proxy_count()
    }

    /// Subjects listed under a tag; an empty `kind` searches every type
    pub async fn search_subjects(
        &self,
        kind: &str,
        tag: &str,
        limit: u32,
        start: u32,
    ) -> Result<Vec<Subject>> {
        let mut url = self.endpoint("/j/search_subjects")?;
        url.query_pairs_mut()
            .append_pair("type", kind)
            .append_pair("tag", tag)
            .append_pair("page_limit", &limit.to_string())
            .append_pair("page_start", &start.to_string());

        let page: SubjectsPage = self.get_json("search_subjects", url).await?;
        debug!(tag = %tag, count = page.subjects.len(), "Fetched subjects");
        Ok(page.subjects)
    }

    /// Summary of one subject; `Ok(None)` when the upstream has no record
    pub async fn subject_abstract(&self, id: &str) -> Result<Option<SubjectAbstract>> {
        let mut url = self.endpoint("/j/subject_abstract")?;
        url.query_pairs_mut().append_pair("subject_id", id);

        let envelope: AbstractEnvelope = self.get_json("subject_abstract", url).await?;
        Ok(envelope.subject)
    }

    pub async fn suggest(&self, query: &str) -> Result<Vec<SuggestItem>> {
        let mut url = self.endpoint("/j/subject_suggest")?;
        url.query_pairs_mut().append_pair("q", query);

        self.get_json("subject_suggest", url).await
    }

    pub async fn photos(&self, id: &str, count: u32, kind: &str) -> Result<Vec<Photo>> {
        let mut url = self.endpoint(&format!("/j/subject/{}/photos", urlencoding::encode(id)))?;
        url.query_pairs_mut()
            .append_pair("type", kind)
            .append_pair("start", "0")
            .append_pair("count", &count.to_string());

        let page: PhotosPage = self.get_json("photos", url).await?;
        Ok(page.photos)
    }

    pub async fn comments(&self, id: &str, limit: u32) -> Result<Vec<Comment>> {
        let mut url =
            self.endpoint(&format!("/j/subject/{}/comments", urlencoding::encode(id)))?;
        url.query_pairs_mut()
            .append_pair("start", "0")
            .append_pair("limit", &limit.to_string())
            .append_pair("sort", "new_score")
            .append_pair("status", "P");

        let page: CommentsPage = self.get_json("comments", url).await?;
        Ok(page.comments)
    }

    pub async fn recommendations(&self, id: &str) -> Result<Vec<Subject>> {
        let url = self.endpoint(&format!(
            "/j/subject/{}/recommendations",
            urlencoding::encode(id)
        ))?;

        let page: RecommendationsPage = self.get_json("recommendations", url).await?;
        Ok(page.recommendations)
    }

    pub async fn advanced_search(&self, query: &AdvancedQuery) -> Result<Vec<Subject>> {
        let mut url = self.endpoint("/j/new_search_subjects")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("tags", &query.tags)
                .append_pair("sort", &query.sort)
                .append_pair("range", "0,10")
                .append_pair("start", &query.start.to_string())
                .append_pair("limit", &query.limit.to_string());
            if let Some(genres) = query.genres.as_deref().filter(|g| !g.is_empty()) {
                pairs.append_pair("genres", genres);
            }
            if let Some(range) = query.year_range.as_deref().filter(|r| !r.is_empty()) {
                pairs.append_pair("year_range", range);
            }
        }

        let page: AdvancedPage = self.get_json("new_search_subjects", url).await?;
        Ok(page.data)
    }

    pub async fn search_tags(&self, kind: &str) -> Result<Vec<String>> {
        let mut url = self.endpoint("/j/search_tags")?;
        url.query_pairs_mut().append_pair("type", kind);

        let page: TagsPage = self.get_json("search_tags", url).await?;
        Ok(page.tags)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let raw = format!("{}{}", self.base_url, path);
        Url::parse(&raw).map_err(|source| {
            UpstreamError::Fetch(FetchError::InvalidUrl { url: raw, source })
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &'static str, url: Url) -> Result<T> {
        let body = self.fetcher.fetch(url.as_str()).await?;
        serde_json::from_slice(&body).map_err(|source| UpstreamError::Decode { endpoint, source })
    }
}
