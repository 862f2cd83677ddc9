//! End-to-end orchestrator tests over an in-memory catalog.

use catalog::{CatalogIndex, EventKind, Genre, InteractionEvent, Movie, MovieId, Rating, UserId};
use server::{RecRequest, RecStatus, RecType, Recommender, RecommenderConfig};
use std::sync::Arc;

const NOW: i64 = 1_700_000_000;

fn movie(id: MovieId, genres: Vec<Genre>, overview: &str) -> Movie {
    Movie {
        id,
        title: format!("Movie {}", id),
        genres,
        overview: overview.to_string(),
        keywords: String::new(),
        year: Some(1990 + (id % 30) as u16),
        vote_average: 5.0 + (id % 5) as f32,
        vote_count: 100,
        popularity: 5.0,
    }
}

fn rating(user_id: UserId, movie_id: MovieId, value: f32) -> Rating {
    Rating {
        user_id,
        movie_id,
        value,
        timestamp: NOW - 1000,
    }
}

fn watch(user_id: UserId, movie_id: MovieId) -> InteractionEvent {
    InteractionEvent {
        user_id,
        movie_id,
        kind: EventKind::Watch,
        timestamp: NOW - 3600,
        value: None,
    }
}

/// Ten movies, three opinionated users, some recent traffic.
fn create_test_catalog() -> Arc<CatalogIndex> {
    let mut index = CatalogIndex::new();
    for id in 1..=5 {
        index.insert_movie(movie(id, vec![Genre::Action], "explosions and chases"));
    }
    for id in 6..=10 {
        index.insert_movie(movie(id, vec![Genre::Romance], "love in hard times"));
    }
    index.upsert_rating(rating(1, 1, 5.0));
    index.upsert_rating(rating(1, 2, 4.5));
    index.upsert_rating(rating(1, 6, 1.0));
    index.upsert_rating(rating(2, 1, 5.0));
    index.upsert_rating(rating(2, 3, 4.0));
    index.upsert_rating(rating(2, 6, 1.5));
    index.upsert_rating(rating(3, 6, 5.0));
    index.upsert_rating(rating(3, 7, 4.5));
    for movie_id in [1, 1, 3, 6] {
        index.insert_event(watch(4, movie_id));
    }
    index.finalize();
    Arc::new(index)
}

fn recommender() -> Recommender {
    Recommender::new(create_test_catalog(), RecommenderConfig::default())
}

#[test]
fn test_repeated_request_is_served_from_cache() {
    let recommender = recommender();
    let request = RecRequest::hybrid(1, 5);
    let first = recommender.recommend_at(&request, NOW).unwrap();
    let second = recommender.recommend_at(&request, NOW).unwrap();
    // Same Arc, so the second response did not recompute anything.
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_refresh_drops_cached_responses() {
    let recommender = recommender();
    let request = RecRequest::hybrid(1, 5);
    let first = recommender.recommend_at(&request, NOW).unwrap();
    recommender.refresh_models();
    let second = recommender.recommend_at(&request, NOW).unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    // The recomputed list is identical: same history, same seeds.
    let ids = |r: &server::Recommendations| {
        r.items.iter().map(|i| i.movie_id).collect::<Vec<_>>()
    };
    assert_eq!(ids(&first), ids(&second));
}

#[test]
fn test_content_similarity_for_known_movie() {
    let recommender = recommender();
    let response = recommender
        .recommend_at(&RecRequest::similar_to(1, 4), NOW)
        .unwrap();
    assert_eq!(response.status, RecStatus::Ok);
    assert!(!response.items.is_empty());
    assert!(response.items.len() <= 4);
    assert!(response.items.iter().all(|i| i.movie_id != 1));
    // Action movies share genre and overview vocabulary with the anchor.
    assert!(response.items[0].movie_id <= 5);
}

#[test]
fn test_content_unknown_movie_is_not_found() {
    let recommender = recommender();
    let response = recommender
        .recommend_at(&RecRequest::similar_to(999, 4), NOW)
        .unwrap();
    assert_eq!(response.status, RecStatus::NotFound);
    assert!(response.items.is_empty());
}

#[test]
fn test_new_user_falls_back_to_popular() {
    let recommender = recommender();
    let request = RecRequest {
        rec_type: RecType::Collaborative,
        user_id: Some(999),
        movie_id: None,
        count: 3,
    };
    let response = recommender.recommend_at(&request, NOW).unwrap();
    assert_eq!(response.status, RecStatus::Fallback);
    assert_eq!(response.items.len(), 3);
    assert!(response.items[0]
        .reasons
        .iter()
        .any(|r| r.contains("popular")));
}

#[test]
fn test_zero_history_personalized_falls_back_to_popular() {
    let recommender = recommender();
    let request = RecRequest {
        rec_type: RecType::Personalized,
        user_id: Some(999),
        movie_id: None,
        count: 3,
    };
    let response = recommender.recommend_at(&request, NOW).unwrap();
    assert_eq!(response.status, RecStatus::Fallback);
    assert_eq!(response.items.len(), 3);
    assert!(response.items[0]
        .reasons
        .iter()
        .any(|r| r.contains("popular")));
}

#[test]
fn test_anonymous_hybrid_falls_back() {
    let recommender = recommender();
    let request = RecRequest {
        rec_type: RecType::Hybrid,
        user_id: None,
        movie_id: None,
        count: 4,
    };
    let response = recommender.recommend_at(&request, NOW).unwrap();
    assert_eq!(response.status, RecStatus::Fallback);
    assert!(!response.items.is_empty());
}

#[test]
fn test_hybrid_response_is_deduplicated_and_bounded() {
    let recommender = recommender();
    let response = recommender
        .recommend_at(&RecRequest::hybrid(1, 5), NOW)
        .unwrap();
    assert!(response.items.len() <= 5);
    let mut ids: Vec<MovieId> = response.items.iter().map(|i| i.movie_id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), response.items.len());
    for pair in response.items.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[test]
fn test_personalized_skips_seen_movies() {
    let recommender = recommender();
    let request = RecRequest {
        rec_type: RecType::Personalized,
        user_id: Some(1),
        movie_id: None,
        count: 10,
    };
    let response = recommender.recommend_at(&request, NOW).unwrap();
    // User 1 rated movies 1, 2 and 6.
    for seen in [1, 2, 6] {
        assert!(response.items.iter().all(|i| i.movie_id != seen));
    }
    assert!(!response.items.is_empty());
}

#[test]
fn test_comedy_lover_sees_comedy_up_top() {
    let mut index = CatalogIndex::new();
    for id in 1..=4 {
        index.insert_movie(movie(id, vec![Genre::Comedy], "jokes and mishaps"));
    }
    for id in 5..=8 {
        index.insert_movie(movie(id, vec![Genre::Action], "explosions and chases"));
    }
    // Heavy comedy history, one action watch.
    index.upsert_rating(rating(1, 1, 5.0));
    index.upsert_rating(rating(1, 2, 4.5));
    index.insert_event(watch(1, 1));
    index.insert_event(watch(1, 2));
    index.insert_event(watch(1, 5));
    index.finalize();

    let recommender = Recommender::new(Arc::new(index), RecommenderConfig::default());
    let request = RecRequest {
        rec_type: RecType::Personalized,
        user_id: Some(1),
        movie_id: None,
        count: 3,
    };
    let response = recommender.recommend_at(&request, NOW).unwrap();
    let catalog = recommender.catalog();
    let top_comedies = response
        .items
        .iter()
        .take(3)
        .filter(|i| {
            catalog
                .get_movie(i.movie_id)
                .map(|m| m.genres.contains(&Genre::Comedy))
                .unwrap_or(false)
        })
        .count();
    assert!(top_comedies >= 1);
}

#[test]
fn test_similar_helper_maps_items() {
    let recommender = recommender();
    let similar = recommender.similar(1, 3).unwrap();
    assert!(!similar.is_empty());
    assert!(similar.iter().all(|s| s.movie_id != 1));
    assert!(recommender.similar(999, 3).unwrap().is_empty());
}

#[test]
fn test_empty_catalog_is_terminal_not_an_error() {
    let recommender = Recommender::new(
        Arc::new(CatalogIndex::new()),
        RecommenderConfig::default(),
    );
    let response = recommender
        .recommend_at(&RecRequest::hybrid(1, 5), NOW)
        .unwrap();
    assert_eq!(response.status, RecStatus::NoRecommendations);
    assert!(response.items.is_empty());
}

#[tokio::test]
async fn test_async_wrapper_matches_sync_path() {
    let recommender = recommender();
    let response = recommender
        .recommend_async(RecRequest::hybrid(1, 5))
        .await
        .unwrap();
    assert!(response.items.len() <= 5);
}
