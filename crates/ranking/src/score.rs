//! Score blending.
//!
//! Engines hand over raw candidate pools on incompatible scales (cosine in
//! [0,1], predicted ratings in [0.5,5.0], volume in (0,1]). Each pool is
//! min-max normalized before weighting, so a configured weight means the
//! same thing regardless of which engine produced the score.

use crate::context::genres_for_bucket;
use catalog::{CatalogIndex, Genre, MovieId};
use engines::{ScoredMovie, UserProfile};
use std::collections::HashMap;
use tracing::debug;

/// Weights for the hybrid blend. They need not sum to 1; relative size is
/// what matters.
#[derive(Debug, Clone)]
pub struct BlendWeights {
    pub collaborative: f32,
    pub content: f32,
    pub personalization: f32,
    pub popularity: f32,
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self {
            collaborative: 0.40,
            content: 0.30,
            personalization: 0.20,
            popularity: 0.10,
        }
    }
}

/// Weights for the purely profile-driven scorer. Genre affinity dominates;
/// the rest are small correctives.
#[derive(Debug, Clone)]
pub struct PersonalWeights {
    pub genre_match: f32,
    pub recent_trend: f32,
    pub quality: f32,
    pub decade: f32,
    pub time_of_day: f32,
}

impl Default for PersonalWeights {
    fn default() -> Self {
        Self {
            genre_match: 0.50,
            recent_trend: 0.15,
            quality: 0.15,
            decade: 0.10,
            time_of_day: 0.10,
        }
    }
}

/// One candidate with its blended score, per-component breakdown, human
/// readable reasons and the genre set the diversity pass needs.
#[derive(Debug, Clone)]
pub struct ScoreEntry {
    pub movie_id: MovieId,
    pub score: f32,
    pub components: HashMap<&'static str, f32>,
    pub reasons: Vec<String>,
    pub genres: Vec<Genre>,
}

impl ScoreEntry {
    pub fn new(movie_id: MovieId, score: f32, genres: Vec<Genre>) -> Self {
        Self {
            movie_id,
            score,
            components: HashMap::new(),
            reasons: Vec::new(),
            genres,
        }
    }
}

/// Blend collaborative, content, personalization and popularity signals
/// into one entry per candidate movie.
///
/// The candidate set is the union of the collaborative and content pools;
/// personalization and popularity only re-weight movies some engine
/// already proposed.
pub fn blend_hybrid(
    catalog: &CatalogIndex,
    collab: &[ScoredMovie],
    content: &[ScoredMovie],
    profile: &UserProfile,
    popularity: &HashMap<MovieId, f32>,
    weights: &BlendWeights,
) -> Vec<ScoreEntry> {
    let collab_norm = normalize_pool(collab);
    let content_norm = normalize_pool(content);

    let mut candidates: Vec<MovieId> = Vec::with_capacity(collab.len() + content.len());
    candidates.extend(collab.iter().map(|s| s.movie_id));
    candidates.extend(
        content
            .iter()
            .map(|s| s.movie_id)
            .filter(|id| !collab_norm.contains_key(id)),
    );
    debug!("blending {} hybrid candidates", candidates.len());

    candidates
        .into_iter()
        .filter_map(|movie_id| {
            let movie = catalog.get_movie(movie_id)?;
            let c_collab = collab_norm.get(&movie_id).copied().unwrap_or(0.0);
            let c_content = content_norm.get(&movie_id).copied().unwrap_or(0.0);
            let c_personal = genre_affinity(profile, &movie.genres);
            let c_popular = popularity.get(&movie_id).copied().unwrap_or(0.0);

            let score = weights.collaborative * c_collab
                + weights.content * c_content
                + weights.personalization * c_personal
                + weights.popularity * c_popular;

            let mut entry = ScoreEntry::new(movie_id, score, movie.genres.clone());
            entry.components.insert("collaborative", c_collab);
            entry.components.insert("content", c_content);
            entry.components.insert("personalization", c_personal);
            entry.components.insert("popularity", c_popular);
            if c_collab > 0.0 {
                entry.reasons.push("liked by similar viewers".to_string());
            }
            if c_content > 0.0 {
                entry
                    .reasons
                    .push("similar to movies in your history".to_string());
            }
            if c_personal > 0.0 {
                entry.reasons.push("matches your taste profile".to_string());
            }
            Some(entry)
        })
        .collect()
}

/// Score every candidate movie purely from the user's profile.
pub fn score_personalized(
    catalog: &CatalogIndex,
    candidates: &[MovieId],
    profile: &UserProfile,
    weights: &PersonalWeights,
) -> Vec<ScoreEntry> {
    let bucket_genres = profile
        .preferred_watch_hour
        .map(genres_for_bucket)
        .unwrap_or(&[]);

    candidates
        .iter()
        .filter_map(|&movie_id| {
            let movie = catalog.get_movie(movie_id)?;

            let c_genre = genre_affinity(profile, &movie.genres);
            let c_recent = if movie
                .genres
                .iter()
                .any(|g| profile.recent_genres.contains(g))
            {
                1.0
            } else {
                0.0
            };
            let c_quality = (movie.vote_average / 10.0).clamp(0.0, 1.0);
            let c_decade = match (profile.preferred_decade, movie.year) {
                (Some(decade), Some(year)) if (year / 10) * 10 == decade => 1.0,
                _ => 0.0,
            };
            let c_time = if movie.genres.iter().any(|g| bucket_genres.contains(g)) {
                1.0
            } else {
                0.0
            };

            let score = weights.genre_match * c_genre
                + weights.recent_trend * c_recent
                + weights.quality * c_quality
                + weights.decade * c_decade
                + weights.time_of_day * c_time;

            let mut entry = ScoreEntry::new(movie_id, score, movie.genres.clone());
            entry.components.insert("genre_match", c_genre);
            entry.components.insert("recent_trend", c_recent);
            entry.components.insert("quality", c_quality);
            entry.components.insert("decade", c_decade);
            entry.components.insert("time_of_day", c_time);
            if c_genre > 0.0 {
                entry.reasons.push("matches your favorite genres".to_string());
            }
            if c_recent > 0.0 {
                entry
                    .reasons
                    .push("in line with what you watched lately".to_string());
            }
            if c_time > 0.0 {
                entry
                    .reasons
                    .push("fits your usual viewing time".to_string());
            }
            Some(entry)
        })
        .collect()
}

/// How strongly a movie's genres overlap the profile's normalized genre
/// weights, capped at 1.
fn genre_affinity(profile: &UserProfile, genres: &[Genre]) -> f32 {
    let sum: f32 = genres
        .iter()
        .filter_map(|g| profile.genre_weights.get(g))
        .sum();
    sum.min(1.0)
}

/// Min-max normalize a candidate pool into [0, 1] keyed by movie id. A
/// constant pool maps everything to 1.
fn normalize_pool(pool: &[ScoredMovie]) -> HashMap<MovieId, f32> {
    if pool.is_empty() {
        return HashMap::new();
    }
    let min = pool.iter().map(|s| s.score).fold(f32::INFINITY, f32::min);
    let max = pool
        .iter()
        .map(|s| s.score)
        .fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    pool.iter()
        .map(|s| {
            let value = if range > 0.0 {
                (s.score - min) / range
            } else {
                1.0
            };
            (s.movie_id, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::Movie;

    fn movie(id: MovieId, genres: Vec<Genre>, vote_average: f32, year: u16) -> Movie {
        Movie {
            id,
            title: format!("Movie {}", id),
            genres,
            overview: String::new(),
            keywords: String::new(),
            year: Some(year),
            vote_average,
            vote_count: 100,
            popularity: 5.0,
        }
    }

    fn create_test_catalog() -> CatalogIndex {
        let mut index = CatalogIndex::new();
        index.insert_movie(movie(1, vec![Genre::Action], 8.0, 1995));
        index.insert_movie(movie(2, vec![Genre::Comedy], 6.0, 2015));
        index.insert_movie(movie(3, vec![Genre::Action, Genre::Thriller], 7.5, 1992));
        index.finalize();
        index
    }

    fn action_profile() -> UserProfile {
        UserProfile {
            user_id: 1,
            favorite_genres: vec![Genre::Action],
            recent_genres: vec![Genre::Action],
            genre_weights: HashMap::from([(Genre::Action, 0.8), (Genre::Comedy, 0.2)]),
            avg_rating: Some(4.0),
            preferred_decade: Some(1990),
            preferred_watch_hour: None,
            total_events: 10,
        }
    }

    #[test]
    fn test_normalize_pool_spans_unit_interval() {
        let pool = vec![
            ScoredMovie { movie_id: 1, score: 2.0 },
            ScoredMovie { movie_id: 2, score: 4.0 },
            ScoredMovie { movie_id: 3, score: 3.0 },
        ];
        let norm = normalize_pool(&pool);
        assert_eq!(norm[&1], 0.0);
        assert_eq!(norm[&2], 1.0);
        assert!((norm[&3] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_constant_pool_normalizes_to_one() {
        let pool = vec![
            ScoredMovie { movie_id: 1, score: 3.0 },
            ScoredMovie { movie_id: 2, score: 3.0 },
        ];
        let norm = normalize_pool(&pool);
        assert_eq!(norm[&1], 1.0);
        assert_eq!(norm[&2], 1.0);
    }

    #[test]
    fn test_blend_unions_candidate_pools() {
        let catalog = create_test_catalog();
        let collab = vec![ScoredMovie { movie_id: 1, score: 4.5 }];
        let content = vec![ScoredMovie { movie_id: 2, score: 0.7 }];
        let entries = blend_hybrid(
            &catalog,
            &collab,
            &content,
            &action_profile(),
            &HashMap::new(),
            &BlendWeights::default(),
        );
        let ids: Vec<MovieId> = entries.iter().map(|e| e.movie_id).collect();
        assert!(ids.contains(&1));
        assert!(ids.contains(&2));
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_blend_weighs_components() {
        let catalog = create_test_catalog();
        let collab = vec![
            ScoredMovie { movie_id: 1, score: 5.0 },
            ScoredMovie { movie_id: 2, score: 1.0 },
        ];
        let entries = blend_hybrid(
            &catalog,
            &collab,
            &[],
            &action_profile(),
            &HashMap::new(),
            &BlendWeights::default(),
        );
        let top = entries.iter().find(|e| e.movie_id == 1).unwrap();
        let bottom = entries.iter().find(|e| e.movie_id == 2).unwrap();
        // Movie 1 wins on collaborative signal and genre affinity.
        assert!(top.score > bottom.score);
        assert_eq!(top.components["collaborative"], 1.0);
        assert!(!top.reasons.is_empty());
    }

    #[test]
    fn test_personalized_prefers_profile_match() {
        let catalog = create_test_catalog();
        let candidates = vec![1, 2, 3];
        let entries = score_personalized(
            &catalog,
            &candidates,
            &action_profile(),
            &PersonalWeights::default(),
        );
        let by_id: HashMap<MovieId, f32> =
            entries.iter().map(|e| (e.movie_id, e.score)).collect();
        // Action from the preferred decade beats off-profile comedy.
        assert!(by_id[&1] > by_id[&2]);
        assert!(by_id[&3] > by_id[&2]);
    }

    #[test]
    fn test_personalized_handles_empty_profile() {
        let catalog = create_test_catalog();
        let entries = score_personalized(
            &catalog,
            &[1, 2],
            &UserProfile::default(),
            &PersonalWeights::default(),
        );
        // Only the quality component fires; scores stay finite and ordered
        // by vote_average.
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.score.is_finite()));
    }
}
