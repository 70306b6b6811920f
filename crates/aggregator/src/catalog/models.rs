//! Assembled data sets served by the catalog

use crate::upstream::{Comment, Photo, Subject, SubjectAbstract, SuggestItem};
use serde::{Deserialize, Serialize};

const SMALL_POSTER: &str = "/view/photo/s_ratio_poster/";
const LARGE_POSTER: &str = "/view/photo/l/";

/// Featured title for the hero banner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeroMovie {
    pub id: String,
    pub title: String,
    pub rate: String,
    pub cover: String,
    pub poster_horizontal: String,
    pub poster_vertical: String,
    pub url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub episode_info: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl HeroMovie {
    /// Banner entry from listing data alone
    ///
    /// Without a backdrop the horizontal poster falls back to the
    /// high-resolution cover.
    pub fn from_subject(subject: &Subject, backdrop: Option<String>) -> Self {
        let cover = high_resolution_cover(&subject.cover);
        Self {
            id: subject.id.clone(),
            title: subject.title.clone(),
            rate: subject.rate.clone(),
            poster_horizontal: backdrop
                .filter(|b| !b.is_empty())
                .unwrap_or_else(|| cover.clone()),
            poster_vertical: cover.clone(),
            cover,
            url: subject.url.clone(),
            episode_info: subject.episode_info.clone(),
            genres: Vec::new(),
            description: String::new(),
        }
    }

    pub fn with_abstract(mut self, summary: &SubjectAbstract) -> Self {
        self.genres = summary.types.clone();
        if let Some(comment) = &summary.short_comment {
            self.description = comment.content.clone();
        }
        self
    }
}

/// Swap the small listing poster for the large variant
pub fn high_resolution_cover(cover: &str) -> String {
    cover.replacen(SMALL_POSTER, LARGE_POSTER, 1)
}

/// A named row of subjects
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lane {
    pub name: String,
    pub data: Vec<Subject>,
}

impl Lane {
    pub fn new(name: impl Into<String>, data: Vec<Subject>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u32,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

/// One page of a known category
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryPage {
    pub subjects: Vec<Subject>,
    pub pagination: Pagination,
}

/// Filter set for the filtered listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingFilters {
    pub kind: Option<String>,
    pub year: Option<String>,
    pub region: Option<String>,
    pub genre: Option<String>,
    pub sort: String,
    pub page: u32,
    pub page_size: u32,
}

impl Default for ListingFilters {
    fn default() -> Self {
        Self {
            kind: None,
            year: None,
            region: None,
            genre: None,
            sort: "recommend".to_string(),
            page: 1,
            page_size: 30,
        }
    }
}

impl ListingFilters {
    /// Whether any content filter is set; sort and paging alone do not count
    pub fn has_filters(&self) -> bool {
        [&self.kind, &self.year, &self.region, &self.genre]
            .into_iter()
            .any(|f| f.as_deref().is_some_and(|v| !v.is_empty()))
    }
}

/// Filtered listing: a single lane with pagination, or the featured lanes
/// when no filter is set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub lanes: Vec<Lane>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

/// Full detail page for one subject
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectDetail {
    pub id: String,
    pub title: String,
    pub rate: String,
    pub url: String,
    pub cover: String,
    pub types: Vec<String>,
    pub release_year: String,
    pub directors: Vec<String>,
    pub actors: Vec<String>,
    pub duration: String,
    pub region: String,
    pub episodes_count: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_comment: Option<Comment>,
    pub photos: Vec<Photo>,
    pub comments: Vec<Comment>,
    pub recommendations: Vec<Subject>,
}

impl SubjectDetail {
    pub fn from_abstract(summary: SubjectAbstract) -> Self {
        let short_comment = summary.short_comment.map(|c| Comment {
            content: c.content,
            author: crate::upstream::CommentAuthor {
                name: c.author,
                ..Default::default()
            },
            ..Default::default()
        });

        Self {
            id: summary.id,
            title: summary.title,
            rate: summary.rate,
            url: summary.url,
            types: summary.types,
            release_year: summary.release_year,
            directors: summary.directors,
            actors: summary.actors,
            duration: summary.duration,
            region: summary.region,
            episodes_count: summary.episodes_count,
            short_comment,
            ..Default::default()
        }
    }
}

/// Parameters of a free-text search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub query: String,
    pub kind: Option<String>,
    pub sort: String,
    pub genres: Option<String>,
    pub year_range: Option<String>,
    pub start: u32,
    pub limit: u32,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            kind: None,
            sort: "U".to_string(),
            genres: None,
            year_range: None,
            start: 0,
            limit: 20,
        }
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub suggest: Vec<SuggestItem>,
    pub advanced: Vec<Subject>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::ShortComment;

    #[test]
    fn test_hero_falls_back_to_cover() {
        let subject = Subject {
            id: "1".to_string(),
            cover: "https://img.example/view/photo/s_ratio_poster/public/p1.jpg".to_string(),
            ..Subject::default()
        };

        let hero = HeroMovie::from_subject(&subject, None);
        assert_eq!(hero.cover, "https://img.example/view/photo/l/public/p1.jpg");
        assert_eq!(hero.poster_horizontal, hero.cover);
        assert_eq!(hero.poster_vertical, hero.cover);

        let hero = HeroMovie::from_subject(&subject, Some("https://backdrop/b.jpg".to_string()));
        assert_eq!(hero.poster_horizontal, "https://backdrop/b.jpg");
    }

    #[test]
    fn test_hero_with_abstract() {
        let summary = SubjectAbstract {
            types: vec!["剧情".to_string()],
            short_comment: Some(ShortComment {
                content: "好看".to_string(),
                author: "a".to_string(),
            }),
            ..SubjectAbstract::default()
        };

        let hero = HeroMovie::default().with_abstract(&summary);
        assert_eq!(hero.genres, vec!["剧情"]);
        assert_eq!(hero.description, "好看");
    }

    #[test]
    fn test_has_filters_ignores_sort_and_blank_values() {
        let mut filters = ListingFilters {
            sort: "rank".to_string(),
            year: Some(String::new()),
            ..ListingFilters::default()
        };
        assert!(!filters.has_filters());

        filters.genre = Some("动作".to_string());
        assert!(filters.has_filters());
    }

    #[test]
    fn test_pagination_wire_name() {
        let json = serde_json::to_value(Pagination {
            page: 1,
            limit: 20,
            total: 100,
            has_more: true,
        })
        .unwrap();
        assert_eq!(json["hasMore"], true);
    }

    #[test]
    fn test_detail_from_abstract_maps_short_comment() {
        let detail = SubjectDetail::from_abstract(SubjectAbstract {
            id: "42".to_string(),
            short_comment: Some(ShortComment {
                content: "c".to_string(),
                author: "someone".to_string(),
            }),
            ..SubjectAbstract::default()
        });

        assert_eq!(detail.id, "42");
        assert_eq!(detail.short_comment.unwrap().author.name, "someone");
    }
}
