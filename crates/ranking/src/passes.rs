//! Composable selection passes.
//!
//! Scored entries flow through an ordered pipeline of passes, each of
//! which may drop or reorder entries but never invents new ones. The
//! pipeline sorts once up front (descending score, ascending movie id on
//! ties) so every pass can assume ranked input.

use crate::score::ScoreEntry;
use catalog::Genre;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// A single stage of the selection pipeline. `target` is the number of
/// entries the caller ultimately wants.
pub trait SelectionPass: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    fn apply(&self, entries: Vec<ScoreEntry>, target: usize) -> Vec<ScoreEntry>;
}

/// Ordered chain of [`SelectionPass`]es.
pub struct SelectionPipeline {
    passes: Vec<Box<dyn SelectionPass>>,
}

impl SelectionPipeline {
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// The standard chain: dedupe, quality floor, diversity cap.
    pub fn standard(floor: f32, genre_cap: usize) -> Self {
        Self::new()
            .with_pass(Box::new(Dedupe))
            .with_pass(Box::new(QualityFloor::new(floor)))
            .with_pass(Box::new(DiversityCap::new(genre_cap)))
    }

    pub fn with_pass(mut self, pass: Box<dyn SelectionPass>) -> Self {
        self.passes.push(pass);
        self
    }

    /// Run all passes and truncate to `target`.
    pub fn run(&self, mut entries: Vec<ScoreEntry>, target: usize) -> Vec<ScoreEntry> {
        sort_entries(&mut entries);
        for pass in &self.passes {
            let before = entries.len();
            entries = pass.apply(entries, target);
            debug!("pass {}: {} -> {} entries", pass.name(), before, entries.len());
        }
        entries.truncate(target);
        entries
    }
}

impl Default for SelectionPipeline {
    fn default() -> Self {
        Self::standard(0.2, 3)
    }
}

/// Descending score; ascending movie id breaks ties deterministically.
pub fn sort_entries(entries: &mut [ScoreEntry]) {
    entries.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.movie_id.cmp(&b.movie_id)));
}

/// Keeps the first (highest ranked) entry per movie id.
pub struct Dedupe;

impl SelectionPass for Dedupe {
    fn name(&self) -> &str {
        "dedupe"
    }

    fn apply(&self, entries: Vec<ScoreEntry>, _target: usize) -> Vec<ScoreEntry> {
        let mut seen = HashSet::new();
        entries
            .into_iter()
            .filter(|entry| seen.insert(entry.movie_id))
            .collect()
    }
}

/// Drops entries scoring below a floor. NaN and negative scores are always
/// dropped. If the floor leaves fewer than `target` survivors, the
/// highest-scoring rejects are backfilled so thin pools still produce a
/// full response.
pub struct QualityFloor {
    floor: f32,
}

impl QualityFloor {
    pub fn new(floor: f32) -> Self {
        Self { floor }
    }
}

impl SelectionPass for QualityFloor {
    fn name(&self) -> &str {
        "quality_floor"
    }

    fn apply(&self, entries: Vec<ScoreEntry>, target: usize) -> Vec<ScoreEntry> {
        let mut kept = Vec::with_capacity(entries.len());
        let mut rejects = Vec::new();
        for entry in entries {
            if entry.score.is_nan() || entry.score < 0.0 {
                continue;
            }
            if entry.score >= self.floor {
                kept.push(entry);
            } else {
                rejects.push(entry);
            }
        }
        // Input is ranked, so rejects are already in backfill order.
        if kept.len() < target {
            let missing = target - kept.len();
            kept.extend(rejects.into_iter().take(missing));
        }
        kept
    }
}

/// Greedy genre diversity: walking down the ranking, an entry is skipped
/// if keeping it would push any of its genres past the cap. Skipped
/// entries are not revisited.
pub struct DiversityCap {
    cap: usize,
}

impl DiversityCap {
    pub fn new(cap: usize) -> Self {
        Self { cap }
    }
}

impl SelectionPass for DiversityCap {
    fn name(&self) -> &str {
        "diversity_cap"
    }

    fn apply(&self, entries: Vec<ScoreEntry>, _target: usize) -> Vec<ScoreEntry> {
        let mut counts: HashMap<Genre, usize> = HashMap::new();
        let mut kept = Vec::with_capacity(entries.len());
        for entry in entries {
            let over_cap = entry
                .genres
                .iter()
                .any(|g| counts.get(g).copied().unwrap_or(0) >= self.cap);
            if over_cap {
                continue;
            }
            for &genre in &entry.genres {
                *counts.entry(genre).or_insert(0) += 1;
            }
            kept.push(entry);
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(movie_id: u32, score: f32, genres: Vec<Genre>) -> ScoreEntry {
        ScoreEntry::new(movie_id, score, genres)
    }

    #[test]
    fn test_sort_is_deterministic_on_ties() {
        let mut entries = vec![
            entry(5, 0.8, vec![]),
            entry(2, 0.8, vec![]),
            entry(9, 0.9, vec![]),
        ];
        sort_entries(&mut entries);
        let ids: Vec<u32> = entries.iter().map(|e| e.movie_id).collect();
        assert_eq!(ids, vec![9, 2, 5]);
    }

    #[test]
    fn test_dedupe_keeps_highest_ranked() {
        let entries = vec![
            entry(1, 0.9, vec![]),
            entry(1, 0.5, vec![]),
            entry(2, 0.7, vec![]),
        ];
        let kept = Dedupe.apply(entries, 10);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].score, 0.9);
    }

    #[test]
    fn test_quality_floor_drops_low_scores() {
        let entries = vec![
            entry(1, 0.9, vec![]),
            entry(2, 0.5, vec![]),
            entry(3, 0.1, vec![]),
        ];
        let kept = QualityFloor::new(0.2).apply(entries, 2);
        let ids: Vec<u32> = kept.iter().map(|e| e.movie_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_quality_floor_backfills_thin_pools() {
        let entries = vec![
            entry(1, 0.9, vec![]),
            entry(2, 0.15, vec![]),
            entry(3, 0.05, vec![]),
        ];
        // Only one survivor, so the best reject backfills.
        let kept = QualityFloor::new(0.2).apply(entries, 2);
        let ids: Vec<u32> = kept.iter().map(|e| e.movie_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_quality_floor_never_returns_nan_or_negative() {
        let entries = vec![
            entry(1, f32::NAN, vec![]),
            entry(2, -0.4, vec![]),
            entry(3, 0.01, vec![]),
        ];
        let kept = QualityFloor::new(0.2).apply(entries, 3);
        let ids: Vec<u32> = kept.iter().map(|e| e.movie_id).collect();
        assert_eq!(ids, vec![3]);
    }

    #[test]
    fn test_diversity_cap_limits_genre_runs() {
        let entries = vec![
            entry(1, 0.9, vec![Genre::Action]),
            entry(2, 0.8, vec![Genre::Action]),
            entry(3, 0.7, vec![Genre::Action]),
            entry(4, 0.6, vec![Genre::Action]),
            entry(5, 0.5, vec![Genre::Drama]),
        ];
        let kept = DiversityCap::new(3).apply(entries, 10);
        let ids: Vec<u32> = kept.iter().map(|e| e.movie_id).collect();
        // Fourth action movie is skipped; drama still gets through.
        assert_eq!(ids, vec![1, 2, 3, 5]);
    }

    #[test]
    fn test_diversity_cap_considers_all_genres_of_entry() {
        let entries = vec![
            entry(1, 0.9, vec![Genre::Action]),
            entry(2, 0.8, vec![Genre::Action, Genre::Drama]),
            entry(3, 0.7, vec![Genre::Drama]),
        ];
        let kept = DiversityCap::new(1).apply(entries, 10);
        let ids: Vec<u32> = kept.iter().map(|e| e.movie_id).collect();
        // Entry 2 would exceed the action cap; entry 3 still fits drama.
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_standard_pipeline_end_to_end() {
        let entries = vec![
            entry(3, 0.9, vec![Genre::Action]),
            entry(3, 0.4, vec![Genre::Action]),
            entry(1, 0.85, vec![Genre::Action]),
            entry(2, 0.8, vec![Genre::Action]),
            entry(4, 0.75, vec![Genre::Action]),
            entry(5, 0.1, vec![Genre::Drama]),
            entry(6, f32::NAN, vec![Genre::Comedy]),
        ];
        let pipeline = SelectionPipeline::standard(0.2, 3);
        let kept = pipeline.run(entries, 4);
        let ids: Vec<u32> = kept.iter().map(|e| e.movie_id).collect();
        // Dedupe removes the duplicate 3, the floor drops the NaN and the
        // 0.1 drama (enough survivors remain), and the cap skips the
        // fourth action movie.
        assert_eq!(ids, vec![3, 1, 2]);
    }
}
