//! Cross-source matching: pick the enrichment record that best corresponds
//! to a primary-source title
//!
//! Score = year term + title term + quality term:
//! - year: 100 for the same release year, 50 when one year apart
//! - title: 50 for a case-insensitive exact match, 25 for a substring match
//!   in either direction (original title preferred over display title)
//! - quality: `2 * rating + 5 * log10(popularity + 1)`
//!
//! Candidates without an image never match. The highest score above zero
//! wins; ties keep the earlier candidate.

use serde::{Deserialize, Serialize};

const EXACT_YEAR: f64 = 100.0;
const ADJACENT_YEAR: f64 = 50.0;
const EXACT_TITLE: f64 = 50.0;
const PARTIAL_TITLE: f64 = 25.0;
const RATING_WEIGHT: f64 = 2.0;
const POPULARITY_WEIGHT: f64 = 5.0;

/// One enrichment search result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default, rename = "backdrop_path")]
    pub image_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default, rename = "vote_average")]
    pub rating: f64,
    #[serde(default)]
    pub popularity: f64,
}

impl Candidate {
    /// Release year, taken from the leading four digits of the release date
    pub fn year(&self) -> Option<i32> {
        let date = self.release_date.as_deref()?;
        let year = date.get(..4)?;
        if !year.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        year.parse().ok()
    }

    pub fn has_image(&self) -> bool {
        self.image_path
            .as_deref()
            .is_some_and(|path| !path.trim().is_empty())
    }

    /// Title used for comparison: original title when present
    fn comparison_title(&self) -> &str {
        match self.original_title.as_deref() {
            Some(original) if !original.is_empty() => original,
            _ => &self.title,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub candidate: Candidate,
    pub score: f64,
}

/// Select the best-scoring candidate, or `None` when nothing qualifies
pub fn select_best(candidates: &[Candidate], title: &str, year: Option<i32>) -> Option<MatchResult> {
    let mut best: Option<(&Candidate, f64)> = None;

    for candidate in candidates.iter().filter(|c| c.has_image()) {
        let score = score(candidate, title, year);
        let floor = best.map_or(0.0, |(_, s)| s);
        if score > floor {
            best = Some((candidate, score));
        }
    }

    best.map(|(candidate, score)| MatchResult {
        candidate: candidate.clone(),
        score,
    })
}

/// Weighted score of one candidate against the target
pub fn score(candidate: &Candidate, title: &str, year: Option<i32>) -> f64 {
    year_term(candidate.year(), year)
        + title_term(candidate.comparison_title(), title)
        + quality_term(candidate.rating, candidate.popularity)
}

fn year_term(candidate: Option<i32>, target: Option<i32>) -> f64 {
    match (candidate, target) {
        (Some(c), Some(t)) if c == t => EXACT_YEAR,
        (Some(c), Some(t)) if (c - t).abs() <= 1 => ADJACENT_YEAR,
        _ => 0.0,
    }
}

fn title_term(candidate: &str, target: &str) -> f64 {
    let candidate = candidate.trim().to_lowercase();
    let target = target.trim().to_lowercase();

    if candidate.is_empty() || target.is_empty() {
        return 0.0;
    }

    if candidate == target {
        EXACT_TITLE
    } else if candidate.contains(&target) || target.contains(&candidate) {
        PARTIAL_TITLE
    } else {
        0.0
    }
}

fn quality_term(rating: f64, popularity: f64) -> f64 {
    RATING_WEIGHT * rating + POPULARITY_WEIGHT * (popularity.max(0.0) + 1.0).log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(title: &str, date: &str, image: Option<&str>) -> Candidate {
        Candidate {
            title: title.to_string(),
            image_path: image.map(str::to_string),
            release_date: Some(date.to_string()),
            rating: 7.0,
            popularity: 50.0,
            ..Candidate::default()
        }
    }

    #[test]
    fn test_exact_match_beats_partial_off_by_two() {
        let candidates = vec![
            candidate("Dune Part Two", "2022-03-01", Some("/partial.jpg")),
            candidate("Dune", "2024-03-01", Some("/exact.jpg")),
        ];

        let best = select_best(&candidates, "Dune", Some(2024)).unwrap();
        assert_eq!(best.candidate.image_path.as_deref(), Some("/exact.jpg"));
        assert!(best.score > score(&candidates[0], "Dune", Some(2024)));
    }

    #[test]
    fn test_candidate_without_image_is_never_selected() {
        let candidates = vec![
            candidate("Dune", "2024-03-01", None),
            candidate("Dune", "2024-03-01", Some("")),
            candidate("Something Else", "1999-01-01", Some("/other.jpg")),
        ];

        let best = select_best(&candidates, "Dune", Some(2024)).unwrap();
        assert_eq!(best.candidate.title, "Something Else");
    }

    #[test]
    fn test_empty_or_all_excluded_yields_none() {
        assert_eq!(select_best(&[], "Dune", Some(2024)), None);
        assert_eq!(
            select_best(&[candidate("Dune", "2024-01-01", None)], "Dune", Some(2024)),
            None
        );
    }

    #[test]
    fn test_zero_score_is_not_a_match() {
        let nothing = Candidate {
            title: "Unrelated".to_string(),
            image_path: Some("/x.jpg".to_string()),
            ..Candidate::default()
        };
        assert_eq!(select_best(&[nothing], "Dune", None), None);
    }

    #[test]
    fn test_ties_keep_first_candidate() {
        let first = candidate("Dune", "2024-01-01", Some("/first.jpg"));
        let second = candidate("Dune", "2024-01-01", Some("/second.jpg"));

        let best = select_best(&[first, second], "dune", Some(2024)).unwrap();
        assert_eq!(best.candidate.image_path.as_deref(), Some("/first.jpg"));
    }

    #[test]
    fn test_year_terms() {
        assert_eq!(year_term(Some(2020), Some(2020)), 100.0);
        assert_eq!(year_term(Some(2019), Some(2020)), 50.0);
        assert_eq!(year_term(Some(2018), Some(2020)), 0.0);
        assert_eq!(year_term(None, Some(2020)), 0.0);
        assert_eq!(year_term(Some(2020), None), 0.0);
    }

    #[test]
    fn test_original_title_takes_precedence() {
        let c = Candidate {
            title: "沙丘".to_string(),
            original_title: Some("Dune".to_string()),
            ..Candidate::default()
        };
        assert_eq!(title_term(c.comparison_title(), "DUNE"), 50.0);
        assert_eq!(title_term("Dune: Part Two", "dune"), 25.0);
        assert_eq!(title_term("dune", "Dune: Part Two"), 25.0);
        assert_eq!(title_term("Arrival", "Dune"), 0.0);
    }

    #[test]
    fn test_quality_term() {
        assert_eq!(quality_term(0.0, 0.0), 0.0);
        assert!((quality_term(8.0, 99.0) - 26.0).abs() < 1e-9);
    }

    #[test]
    fn test_year_parsing() {
        let mut c = Candidate::default();
        assert_eq!(c.year(), None);
        c.release_date = Some("2021-10-22".to_string());
        assert_eq!(c.year(), Some(2021));
        c.release_date = Some("n/a".to_string());
        assert_eq!(c.year(), None);
    }

    #[test]
    fn test_deserializes_enrichment_payload() {
        let json = r#"{
            "id": 438631,
            "title": "沙丘",
            "original_title": "Dune",
            "backdrop_path": "/jYEW5xZkZk2WTrdbMGAPFuBqbDc.jpg",
            "release_date": "2021-09-15",
            "vote_average": 7.8,
            "popularity": 120.5,
            "adult": false
        }"#;

        let c: Candidate = serde_json::from_str(json).unwrap();
        assert_eq!(c.id, 438631);
        assert_eq!(c.year(), Some(2021));
        assert!(c.has_image());

        let null_image: Candidate =
            serde_json::from_str(r#"{"title": "x", "backdrop_path": null}"#).unwrap();
        assert!(!null_image.has_image());
    }
}
