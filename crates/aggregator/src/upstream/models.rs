//! Upstream content API payloads
//!
//! The same structs are cached and served, so every field defaults when the
//! upstream omits it.

use serde::{Deserialize, Serialize};

/// A movie or TV show as listed by the upstream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Subject {
    pub id: String,
    pub title: String,
    pub rate: String,
    pub cover: String,
    pub url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub episode_info: String,
}

impl Subject {
    /// Numeric rating; unrated subjects count as zero
    pub fn rating(&self) -> f64 {
        self.rate.trim().parse().unwrap_or(0.0)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SubjectsPage {
    pub subjects: Vec<Subject>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct AbstractEnvelope {
    pub subject: Option<SubjectAbstract>,
}

/// Short summary of one subject
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectAbstract {
    pub id: String,
    pub title: String,
    pub rate: String,
    pub url: String,
    pub types: Vec<String>,
    pub release_year: String,
    pub directors: Vec<String>,
    pub actors: Vec<String>,
    pub duration: String,
    pub region: String,
    pub episodes_count: String,
    pub short_comment: Option<ShortComment>,
}

impl SubjectAbstract {
    pub fn year(&self) -> Option<i32> {
        self.release_year.trim().parse().ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortComment {
    pub content: String,
    pub author: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Photo {
    pub id: String,
    pub image: String,
    pub thumb: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct PhotosPage {
    pub photos: Vec<Photo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Comment {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub content: String,
    pub author: CommentAuthor,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentAuthor {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub avatar: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct CommentsPage {
    pub comments: Vec<Comment>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RecommendationsPage {
    pub recommendations: Vec<Subject>,
}

/// Title suggestion for a free-text query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestItem {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sub_title: String,
    pub img: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub year: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub episode: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct AdvancedPage {
    pub data: Vec<Subject>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct TagsPage {
    pub tags: Vec<String>,
}

/// Parameters of an advanced (multi-facet) search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvancedQuery {
    pub tags: String,
    pub sort: String,
    pub genres: Option<String>,
    pub year_range: Option<String>,
    pub start: u32,
    pub limit: u32,
}

impl Default for AdvancedQuery {
    fn default() -> Self {
        Self {
            tags: String::new(),
            sort: "U".to_string(),
            genres: None,
            year_range: None,
            start: 0,
            limit: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_tolerates_missing_and_extra_fields() {
        let json = r#"{"id": "1292052", "title": "肖申克的救赎", "rate": "9.7", "is_new": false}"#;
        let subject: Subject = serde_json::from_str(json).unwrap();

        assert_eq!(subject.rating(), 9.7);
        assert!(subject.cover.is_empty());

        let unrated = Subject::default();
        assert_eq!(unrated.rating(), 0.0);
    }

    #[test]
    fn test_empty_episode_info_is_not_serialized() {
        let json = serde_json::to_value(Subject::default()).unwrap();
        assert!(json.get("episode_info").is_none());
    }

    #[test]
    fn test_abstract_envelope_without_subject() {
        let envelope: AbstractEnvelope = serde_json::from_str("{}").unwrap();
        assert!(envelope.subject.is_none());

        let envelope: AbstractEnvelope = serde_json::from_str(
            r#"{"subject": {"id": "1", "release_year": "2021", "types": ["剧情"],
                "short_comment": {"content": "好看", "author": "a"}}}"#,
        )
        .unwrap();
        let subject = envelope.subject.unwrap();
        assert_eq!(subject.year(), Some(2021));
        assert_eq!(subject.short_comment.unwrap().content, "好看");
    }

    #[test]
    fn test_suggest_type_field() {
        let item: SuggestItem =
            serde_json::from_str(r#"{"id": "1", "title": "t", "type": "movie"}"#).unwrap();
        assert_eq!(item.kind, "movie");
    }
}
