//! Catalog data sets against stubbed upstream and enrichment APIs

use catalog_gateway_aggregator::catalog::{ListingFilters, SearchQuery};
use catalog_gateway_aggregator::{
    CatalogError, CatalogService, Dataset, KeyValueStore, LaneSet, MemoryStore,
};
use catalog_gateway_core::config::{
    AggregationConfig, EnrichmentConfig, GatewayConfig, UpstreamConfig,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(upstream: &MockServer) -> GatewayConfig {
    GatewayConfig {
        upstream: UpstreamConfig {
            base_url: upstream.uri(),
            max_attempts: 1,
            base_backoff: Duration::from_millis(1),
            ..UpstreamConfig::default()
        },
        aggregation: AggregationConfig {
            request_timeout: Duration::from_secs(3),
            item_timeout: Duration::from_millis(300),
        },
        ..GatewayConfig::default()
    }
}

fn service(config: &GatewayConfig) -> (CatalogService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let catalog = CatalogService::from_config(config, store.clone()).unwrap();
    (catalog, store)
}

fn subject(id: &str, title: &str, rate: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "rate": rate,
        "cover": format!("https://img.example/view/photo/s_ratio_poster/public/{}.jpg", id),
        "url": format!("https://movie.douban.com/subject/{}/", id),
        "is_new": false
    })
}

fn subjects(items: Vec<Value>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "subjects": items }))
}

async fn requests_to(server: &MockServer, endpoint: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == endpoint)
        .count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lanes_degrade_timed_out_queries_to_empty_slots() {
    let upstream = MockServer::start().await;

    for slow_tag in ["科幻", "惊悚"] {
        Mock::given(method("GET"))
            .and(path("/j/search_subjects"))
            .and(query_param("tag", slow_tag))
            .respond_with(subjects(vec![subject("x", "late", "9.0")]).set_delay(Duration::from_secs(5)))
            .with_priority(1)
            .mount(&upstream)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/j/search_subjects"))
        .and(query_param("type", "movie"))
        .respond_with(subjects(vec![subject("1", "A", "8.0")]))
        .mount(&upstream)
        .await;

    let (catalog, _) = service(&config(&upstream));

    let started = Instant::now();
    let served = catalog.lanes(LaneSet::Movies).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(!served.cache_hit);

    let names: Vec<&str> = served.data.iter().map(|l| l.name.as_str()).collect();
    let expected: Vec<&str> = LaneSet::Movies.lanes().iter().map(|l| l.name).collect();
    assert_eq!(names, expected);

    let sizes: Vec<usize> = served.data.iter().map(|l| l.data.len()).collect();
    assert_eq!(sizes, vec![1, 1, 1, 1, 0, 0, 1, 1]);

    let again = catalog.lanes(LaneSet::Movies).await.unwrap();
    assert!(again.cache_hit);
    assert_eq!(again.data, served.data);
}

#[tokio::test]
async fn test_lanes_without_any_data_are_an_error_and_not_cached() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&upstream)
        .await;

    let (catalog, store) = service(&config(&upstream));

    let err = catalog.lanes(LaneSet::Tv).await.unwrap_err();
    assert!(matches!(
        err,
        CatalogError::NoPrimaryData {
            dataset: Dataset::Lanes(LaneSet::Tv)
        }
    ));
    assert!(!store.exists("douban:tv:all").await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_hero_ranks_by_rating_and_enriches() {
    let upstream = MockServer::start().await;
    let enrichment = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/j/search_subjects"))
        .and(query_param("tag", "热门"))
        .respond_with(subjects(vec![
            subject("s1", "Movie 1", "7.0"),
            subject("s2", "Movie 2", "9.1"),
            subject("s3", "Movie 3", "8.5"),
            subject("s4", "Movie 4", ""),
            subject("s5", "Movie 5", "6.0"),
            subject("s6", "Movie 6", "8.8"),
            subject("s7", "Movie 7", "9.5"),
        ]))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/j/subject_abstract"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "subject": {
                "types": ["剧情", "科幻"],
                "release_year": "2021",
                "short_comment": { "content": "值得一看", "author": "someone" }
            }
        })))
        .mount(&upstream)
        .await;

    Mock::given(method("GET"))
        .and(path("/search/movie"))
        .and(query_param("query", "Movie 7"))
        .and(query_param("year", "2021"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                { "title": "Movie 7", "backdrop_path": null, "release_date": "2021-01-01",
                  "vote_average": 9.0, "popularity": 500.0 },
                { "title": "Movie 7", "backdrop_path": "/b7.jpg", "release_date": "2021-05-01",
                  "vote_average": 7.0, "popularity": 10.0 }
            ]
        })))
        .with_priority(1)
        .mount(&enrichment)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/movie"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .mount(&enrichment)
        .await;

    let mut config = config(&upstream);
    config.enrichment = EnrichmentConfig {
        api_keys: vec!["key-a".to_string(), "key-b".to_string()],
        base_url: enrichment.uri(),
        image_base: "https://image.example/t/p/original".to_string(),
        ..EnrichmentConfig::default()
    };
    let (catalog, _) = service(&config);

    let served = catalog.hero().await.unwrap();
    let heroes = served.data;

    let ids: Vec<&str> = heroes.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["s7", "s2", "s6", "s3", "s1"]);

    assert_eq!(
        heroes[0].poster_horizontal,
        "https://image.example/t/p/original/b7.jpg"
    );
    assert_eq!(heroes[0].genres, vec!["剧情", "科幻"]);
    assert_eq!(heroes[0].description, "值得一看");

    assert_eq!(
        heroes[1].poster_horizontal,
        "https://img.example/view/photo/l/public/s2.jpg"
    );
    assert_eq!(heroes[1].poster_vertical, heroes[1].cover);

    assert!(catalog.hero().await.unwrap().cache_hit);
}

#[tokio::test]
async fn test_hero_without_primary_data() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/j/search_subjects"))
        .respond_with(subjects(Vec::new()))
        .mount(&upstream)
        .await;

    let (catalog, store) = service(&config(&upstream));

    assert!(matches!(
        catalog.hero().await,
        Err(CatalogError::NoPrimaryData {
            dataset: Dataset::Hero
        })
    ));
    assert!(!store.exists("douban:hero:movies").await.unwrap());
}

#[tokio::test]
async fn test_category_page_pagination() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/j/search_subjects"))
        .and(query_param("type", "movie"))
        .and(query_param("page_limit", "2"))
        .and(query_param("page_start", "2"))
        .respond_with(subjects(vec![subject("3", "C", "7"), subject("4", "D", "7")]))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/j/search_subjects"))
        .and(query_param("type", "tv"))
        .and(query_param("page_limit", "5"))
        .respond_with(subjects(vec![subject("1", "A", "7"), subject("2", "B", "7")]))
        .mount(&upstream)
        .await;

    let (catalog, _) = service(&config(&upstream));

    let full = catalog.category_page("hot_movies", 2, 2).await.unwrap().data;
    assert_eq!(full.subjects.len(), 2);
    assert_eq!(full.pagination.total, 100);
    assert!(full.pagination.has_more);

    let partial = catalog.category_page("us_tv", 3, 5).await.unwrap().data;
    assert_eq!(partial.pagination.total, 12);
    assert!(!partial.pagination.has_more);

    assert!(catalog.category_page("hot_movies", 2, 2).await.unwrap().cache_hit);
}

#[tokio::test]
async fn test_category_page_rejects_bad_parameters() {
    let upstream = MockServer::start().await;
    let (catalog, _) = service(&config(&upstream));

    for (category, page, limit, param) in [
        ("hot_movies", 0, 20, "page"),
        ("hot_movies", 1, 0, "limit"),
        ("hot_movies", 1, 51, "limit"),
        ("unknown", 1, 20, "category"),
    ] {
        match catalog.category_page(category, page, limit).await {
            Err(CatalogError::InvalidParameter { param: got, .. }) => assert_eq!(got, param),
            other => panic!("expected invalid {}, got {:?}", param, other.map(|s| s.data)),
        }
    }

    assert_eq!(requests_to(&upstream, "/j/search_subjects").await, 0);
}

#[tokio::test]
async fn test_paging_rejects_pages_beyond_offset_range() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/j/search_subjects"))
        .respond_with(subjects(vec![]))
        .mount(&upstream)
        .await;
    let (catalog, store) = service(&config(&upstream));

    assert!(matches!(
        catalog.category_page("hot_movies", 100_000_000, 50).await,
        Err(CatalogError::InvalidParameter { param: "page", .. })
    ));

    let filters = ListingFilters {
        genre: Some("动作".to_string()),
        page: 100_000_000,
        page_size: 50,
        ..ListingFilters::default()
    };
    assert!(matches!(
        catalog.filtered(&filters).await,
        Err(CatalogError::InvalidParameter { param: "page", .. })
    ));
    assert_eq!(requests_to(&upstream, "/j/search_subjects").await, 0);
    assert!(store.is_empty());

    // Last page whose estimated total still fits
    let last = catalog.category_page("hot_movies", 85_899_344, 50).await.unwrap().data;
    assert_eq!(last.pagination.total, 85_899_343 * 50);
    assert!(!last.pagination.has_more);
}

#[tokio::test]
async fn test_filtered_listing_uses_region_alias_and_estimates_total() {
    let upstream = MockServer::start().await;
    let page: Vec<Value> = (0..10)
        .map(|i| subject(&i.to_string(), "T", "7"))
        .collect();

    Mock::given(method("GET"))
        .and(path("/j/search_subjects"))
        .and(query_param("type", "tv"))
        .and(query_param("tag", "美剧"))
        .and(query_param("page_start", "10"))
        .respond_with(subjects(page))
        .expect(1)
        .mount(&upstream)
        .await;

    let (catalog, _) = service(&config(&upstream));

    let filters = ListingFilters {
        kind: Some("tv".to_string()),
        region: Some("美国".to_string()),
        page: 2,
        page_size: 10,
        ..ListingFilters::default()
    };

    let listing = catalog.filtered(&filters).await.unwrap().data;
    assert_eq!(listing.lanes.len(), 1);
    assert_eq!(listing.lanes[0].name, "美国 · 电视剧");

    let pagination = listing.pagination.unwrap();
    assert_eq!(pagination.total, 30);
    assert!(pagination.has_more);

    assert!(catalog.filtered(&filters).await.unwrap().cache_hit);
}

#[tokio::test]
async fn test_unfiltered_listing_is_featured_lanes() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/j/search_subjects"))
        .respond_with(subjects(vec![subject("1", "A", "8")]))
        .mount(&upstream)
        .await;

    let (catalog, _) = service(&config(&upstream));

    let listing = catalog
        .filtered(&ListingFilters::default())
        .await
        .unwrap()
        .data;

    assert_eq!(listing.lanes.len(), LaneSet::Featured.lanes().len());
    assert!(listing.pagination.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_detail_inner_fetches_degrade_independently() {
    let upstream = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/j/subject_abstract"))
        .and(query_param("subject_id", "1001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "subject": { "id": "1001", "title": "沙丘 (2021)", "rate": "8.0",
                         "short_comment": { "content": "壮观", "author": "someone" } }
        })))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/j/subject_suggest"))
        .and(query_param("q", "沙丘"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "9", "title": "沙丘2", "img": "other.jpg", "type": "movie" },
            { "id": "1001", "title": "沙丘", "img": "cover.jpg", "type": "movie" }
        ])))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/j/subject/1001/photos"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/j/subject/1001/comments"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "comments": [
                { "id": "c1", "content": "好", "author": { "name": "a" } },
                { "id": "c2", "content": "还行", "author": { "name": "b" } }
            ]
        })))
        .mount(&upstream)
        .await;
    let recommendations: Vec<Value> = (0..8)
        .map(|i| json!({ "id": i.to_string(), "title": "R", "cover": "r.jpg", "rate": "7" }))
        .collect();
    Mock::given(method("GET"))
        .and(path("/j/subject/1001/recommendations"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "recommendations": recommendations })),
        )
        .mount(&upstream)
        .await;

    let (catalog, _) = service(&config(&upstream));

    let detail = catalog.detail("1001").await.unwrap().data;
    assert_eq!(detail.title, "沙丘 (2021)");
    assert_eq!(detail.cover, "cover.jpg");
    assert!(detail.photos.is_empty());
    assert_eq!(detail.comments.len(), 2);
    assert_eq!(detail.recommendations.len(), 6);
    assert_eq!(detail.short_comment.unwrap().author.name, "someone");
}

#[tokio::test]
async fn test_detail_not_found() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/j/subject_abstract"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&upstream)
        .await;

    let (catalog, store) = service(&config(&upstream));

    assert!(matches!(
        catalog.detail("404").await,
        Err(CatalogError::NotFound { ref id }) if id == "404"
    ));
    assert!(store.keys("douban:detail:*").await.unwrap().is_empty());
    assert!(matches!(
        catalog.detail("  ").await,
        Err(CatalogError::InvalidParameter { param: "id", .. })
    ));
}

#[tokio::test]
async fn test_search_filters_suggestions_and_runs_advanced_search_by_type() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/j/subject_suggest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "1", "title": "Dune", "type": "movie" },
            { "id": "2", "title": "Dune: Prophecy", "type": "tv" }
        ])))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/j/new_search_subjects"))
        .and(query_param("tags", "电影"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [subject("1", "Dune", "8.0")]
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let (catalog, _) = service(&config(&upstream));

    let typed = catalog
        .search(&SearchQuery::new("dune").kind("movie"))
        .await
        .unwrap()
        .data;
    assert_eq!(typed.suggest.len(), 1);
    assert_eq!(typed.suggest[0].id, "1");
    assert_eq!(typed.advanced.len(), 1);

    let untyped = catalog.search(&SearchQuery::new("dune")).await.unwrap().data;
    assert_eq!(untyped.suggest.len(), 2);
    assert!(untyped.advanced.is_empty());

    assert!(matches!(
        catalog.search(&SearchQuery::new(" ")).await,
        Err(CatalogError::InvalidParameter { param: "q", .. })
    ));
}

#[tokio::test]
async fn test_search_tags() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/j/search_tags"))
        .and(query_param("type", "tv"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tags": ["美剧", "英剧"] })))
        .expect(1)
        .mount(&upstream)
        .await;

    let (catalog, _) = service(&config(&upstream));

    assert_eq!(catalog.search_tags("tv").await.unwrap().data, vec!["美剧", "英剧"]);
    assert!(catalog.search_tags("tv").await.unwrap().cache_hit);
    assert!(matches!(
        catalog.search_tags("music").await,
        Err(CatalogError::InvalidParameter { param: "type", .. })
    ));
}

#[tokio::test]
async fn test_invalidation_by_data_set() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/j/search_subjects"))
        .respond_with(subjects(vec![subject("1", "A", "8")]))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/j/subject_abstract"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "subject": { "id": "1", "title": "A" }
        })))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&upstream)
        .await;

    let (catalog, store) = service(&config(&upstream));
    store
        .set("metrics:global:total", "5".to_string(), None)
        .await
        .unwrap();

    catalog.lanes(LaneSet::Movies).await.unwrap();
    catalog.detail("1").await.unwrap();
    catalog.detail("2").await.unwrap();
    catalog.category_page("hot_tv", 1, 20).await.unwrap();

    assert_eq!(catalog.invalidate(Dataset::Lanes(LaneSet::Movies)).await.unwrap(), 1);
    assert!(!catalog.lanes(LaneSet::Movies).await.unwrap().cache_hit);

    assert!(catalog.invalidate_detail("1").await.unwrap());
    assert_eq!(catalog.invalidate(Dataset::Detail).await.unwrap(), 1);

    // Movies lanes (rebuilt above) and the category page remain
    assert_eq!(catalog.invalidate_all().await.unwrap(), 2);
    assert!(store.exists("metrics:global:total").await.unwrap());
}
