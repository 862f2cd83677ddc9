//! Content-Based Engine: TF-IDF feature space + cosine similarity.
//!
//! ## Algorithm
//! 1. Build one sparse TF-IDF row per catalog movie from its genres
//!    (term-weighted x3), overview and keywords
//! 2. Lowercase, strip punctuation, drop English stop words
//! 3. L2-normalize rows so cosine similarity is a plain sparse dot product
//! 4. `similar(movie_id, n)` ranks all other movies by cosine, ties broken
//!    by stable catalog order
//!
//! The feature matrix is rebuilt lazily, and only when the catalog version
//! changes - never per request.

use crate::error::{EngineError, Result};
use crate::ScoredMovie;
use catalog::{CatalogIndex, Movie, MovieId};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, instrument};

/// Genre terms are repeated this many times in the document so genre
/// overlap dominates incidental overview word matches.
const GENRE_TERM_WEIGHT: usize = 3;

/// Minimal English stop-word list for overview/keyword text.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "had", "has", "have",
    "he", "her", "his", "in", "into", "is", "it", "its", "of", "on", "or", "she", "that", "the",
    "their", "them", "they", "this", "to", "was", "when", "where", "which", "while", "who",
    "whose", "will", "with",
];

/// Sparse TF-IDF row: `(term_id, weight)` pairs sorted by term id,
/// L2-normalized.
type SparseRow = Vec<(u32, f32)>;

/// Immutable feature space snapshot for one catalog version.
struct FeatureSpace {
    version: u64,
    rows: Vec<SparseRow>,
}

/// Computes movie-to-movie similarity over a lazily built TF-IDF space.
pub struct ContentEngine {
    catalog: Arc<CatalogIndex>,
    space: RwLock<Option<Arc<FeatureSpace>>>,
}

impl ContentEngine {
    pub fn new(catalog: Arc<CatalogIndex>) -> Self {
        Self {
            catalog,
            space: RwLock::new(None),
        }
    }

    /// Up to `n` movies most similar to `movie_id`, descending cosine,
    /// self excluded. Unknown movie -> [`EngineError::NotFound`].
    #[instrument(skip(self))]
    pub fn similar(&self, movie_id: MovieId, n: usize) -> Result<Vec<ScoredMovie>> {
        let row_idx = self
            .catalog
            .row_of(movie_id)
            .ok_or(EngineError::NotFound {
                entity: "movie",
                id: movie_id,
            })?;

        let space = self.current_space();
        let target = &space.rows[row_idx];

        let mut sims: Vec<(usize, f32)> = space
            .rows
            .par_iter()
            .enumerate()
            .filter(|(idx, _)| *idx != row_idx)
            .map(|(idx, row)| (idx, sparse_dot(target, row)))
            .filter(|(_, sim)| *sim > 0.0)
            .collect();

        // Descending similarity; catalog order breaks ties deterministically.
        sims.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        sims.truncate(n);

        let ids = self.catalog.movie_ids();
        let results = sims
            .into_iter()
            .map(|(idx, sim)| ScoredMovie {
                movie_id: ids[idx],
                score: sim,
            })
            .collect();
        Ok(results)
    }

    /// Return the feature space for the current catalog version, building
    /// it if the catalog changed since the last build.
    fn current_space(&self) -> Arc<FeatureSpace> {
        let version = self.catalog.version();
        {
            let guard = self.space.read().unwrap_or_else(|e| e.into_inner());
            if let Some(space) = guard.as_ref() {
                if space.version == version {
                    return Arc::clone(space);
                }
            }
        }

        let mut guard = self.space.write().unwrap_or_else(|e| e.into_inner());
        // Another writer may have built it while we waited.
        if let Some(space) = guard.as_ref() {
            if space.version == version {
                return Arc::clone(space);
            }
        }
        let built = Arc::new(build_feature_space(&self.catalog, version));
        *guard = Some(Arc::clone(&built));
        built
    }
}

/// Build the TF-IDF matrix over the whole catalog, in stable catalog order.
fn build_feature_space(catalog: &CatalogIndex, version: u64) -> FeatureSpace {
    let ids = catalog.movie_ids();
    info!("building content feature space for {} movies", ids.len());

    // Pass 1: raw term counts per document.
    let term_counts: Vec<HashMap<String, u32>> = ids
        .par_iter()
        .map(|&id| match catalog.get_movie(id) {
            Some(movie) => count_terms(movie),
            None => HashMap::new(),
        })
        .collect();

    // Pass 2: document frequencies and a deterministic vocabulary.
    let mut doc_freq: BTreeMap<&str, u32> = BTreeMap::new();
    for counts in &term_counts {
        for term in counts.keys() {
            *doc_freq.entry(term.as_str()).or_insert(0) += 1;
        }
    }
    let vocab: HashMap<&str, u32> = doc_freq
        .keys()
        .enumerate()
        .map(|(idx, &term)| (term, idx as u32))
        .collect();

    // Pass 3: weighted, normalized sparse rows.
    let doc_count = term_counts.len() as f32;
    let rows: Vec<SparseRow> = term_counts
        .iter()
        .map(|counts| {
            let mut row: SparseRow = counts
                .iter()
                .map(|(term, &tf)| {
                    let df = doc_freq[term.as_str()] as f32;
                    // Smoothed idf keeps singleton terms finite.
                    let idf = ((1.0 + doc_count) / (1.0 + df)).ln() + 1.0;
                    (vocab[term.as_str()], tf as f32 * idf)
                })
                .collect();
            row.sort_unstable_by_key(|&(term_id, _)| term_id);
            l2_normalize(&mut row);
            row
        })
        .collect();

    debug!("content feature space: {} terms", vocab.len());
    FeatureSpace { version, rows }
}

/// Term counts for one movie: genres (boosted), overview, keywords.
fn count_terms(movie: &Movie) -> HashMap<String, u32> {
    let mut counts: HashMap<String, u32> = HashMap::new();
    for genre in &movie.genres {
        for token in tokenize(genre.as_str()) {
            *counts.entry(token).or_insert(0) += GENRE_TERM_WEIGHT as u32;
        }
    }
    for token in tokenize(&movie.overview) {
        *counts.entry(token).or_insert(0) += 1;
    }
    for token in tokenize(&movie.keywords) {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}

/// Lowercase alphanumeric tokens, stop words removed.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(|t| t.to_ascii_lowercase())
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
}

fn l2_normalize(row: &mut SparseRow) {
    let norm: f32 = row.iter().map(|&(_, w)| w * w).sum::<f32>().sqrt();
    if norm > 0.0 {
        for (_, w) in row.iter_mut() {
            *w /= norm;
        }
    }
}

/// Dot product of two sorted sparse rows (merge walk).
fn sparse_dot(a: &SparseRow, b: &SparseRow) -> f32 {
    let (mut i, mut j, mut sum) = (0, 0, 0.0f32);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                sum += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    sum
}
