//! Parser for the `::`-delimited catalog data files.
//!
//! - `movies.dat`:  id::title::year::genres::vote_average::vote_count::popularity::overview::keywords
//! - `ratings.dat`: userId::movieId::value::timestamp
//! - `events.dat`:  userId::movieId::kind::timestamp[::value]
//!
//! `year` may be empty for movies with an unknown release date; `genres` is
//! pipe-separated and validated against the [`Genre`] enum.

use crate::error::{CatalogError, Result};
use crate::types::*;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Read a file as Latin-1, tolerating legacy exports that aren't UTF-8.
fn read_lines_latin1(path: &Path) -> Result<Vec<String>> {
    let mut file = File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    // ISO-8859-1 bytes map 1:1 to Unicode code points.
    let content: String = bytes.iter().map(|&b| b as char).collect();
    Ok(content.lines().map(|s| s.to_string()).collect())
}

fn parse_err(file: &str, line: usize, reason: impl Into<String>) -> CatalogError {
    CatalogError::Parse {
        file: file.to_string(),
        line,
        reason: reason.into(),
    }
}

fn next_field<'a>(
    parts: &mut std::str::Split<'a, &str>,
    file: &str,
    line: usize,
    field: &str,
) -> Result<&'a str> {
    parts
        .next()
        .ok_or_else(|| parse_err(file, line, format!("missing {}", field)))
}

/// Parse `movies.dat`.
pub fn parse_movies(path: &Path) -> Result<Vec<Movie>> {
    const FILE: &str = "movies.dat";
    let lines = read_lines_latin1(path)?;
    let mut movies = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut parts = trimmed.split("::");

        let id = next_field(&mut parts, FILE, line_no, "id")?;
        let title = next_field(&mut parts, FILE, line_no, "title")?;
        let year = next_field(&mut parts, FILE, line_no, "year")?;
        let genres = next_field(&mut parts, FILE, line_no, "genres")?;
        let vote_average = next_field(&mut parts, FILE, line_no, "vote_average")?;
        let vote_count = next_field(&mut parts, FILE, line_no, "vote_count")?;
        let popularity = next_field(&mut parts, FILE, line_no, "popularity")?;
        let overview = parts.next().unwrap_or("");
        let keywords = parts.next().unwrap_or("");

        let movie = Movie {
            id: id
                .parse()
                .map_err(|e| parse_err(FILE, line_no, format!("invalid id: {}", e)))?,
            title: title.to_string(),
            year: parse_year(year)
                .map_err(|reason| parse_err(FILE, line_no, reason))?,
            genres: parse_genres(genres)?,
            vote_average: vote_average
                .parse()
                .map_err(|e| parse_err(FILE, line_no, format!("invalid vote_average: {}", e)))?,
            vote_count: vote_count
                .parse()
                .map_err(|e| parse_err(FILE, line_no, format!("invalid vote_count: {}", e)))?,
            popularity: popularity
                .parse()
                .map_err(|e| parse_err(FILE, line_no, format!("invalid popularity: {}", e)))?,
            overview: overview.to_string(),
            keywords: keywords.to_string(),
        };
        movies.push(movie);
    }
    Ok(movies)
}

/// Parse `ratings.dat`.
pub fn parse_ratings(path: &Path) -> Result<Vec<Rating>> {
    const FILE: &str = "ratings.dat";
    let lines = read_lines_latin1(path)?;
    let mut ratings = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut parts = trimmed.split("::");

        let user_id = next_field(&mut parts, FILE, line_no, "userId")?;
        let movie_id = next_field(&mut parts, FILE, line_no, "movieId")?;
        let value = next_field(&mut parts, FILE, line_no, "value")?;
        let timestamp = next_field(&mut parts, FILE, line_no, "timestamp")?;

        ratings.push(Rating {
            user_id: user_id
                .parse()
                .map_err(|e| parse_err(FILE, line_no, format!("invalid userId: {}", e)))?,
            movie_id: movie_id
                .parse()
                .map_err(|e| parse_err(FILE, line_no, format!("invalid movieId: {}", e)))?,
            value: value
                .parse()
                .map_err(|e| parse_err(FILE, line_no, format!("invalid value: {}", e)))?,
            timestamp: timestamp
                .parse()
                .map_err(|e| parse_err(FILE, line_no, format!("invalid timestamp: {}", e)))?,
        });
    }
    Ok(ratings)
}

/// Parse `events.dat`.
pub fn parse_events(path: &Path) -> Result<Vec<InteractionEvent>> {
    const FILE: &str = "events.dat";
    let lines = read_lines_latin1(path)?;
    let mut events = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut parts = trimmed.split("::");

        let user_id = next_field(&mut parts, FILE, line_no, "userId")?;
        let movie_id = next_field(&mut parts, FILE, line_no, "movieId")?;
        let kind = next_field(&mut parts, FILE, line_no, "kind")?;
        let timestamp = next_field(&mut parts, FILE, line_no, "timestamp")?;
        let value = parts.next();

        events.push(InteractionEvent {
            user_id: user_id
                .parse()
                .map_err(|e| parse_err(FILE, line_no, format!("invalid userId: {}", e)))?,
            movie_id: movie_id
                .parse()
                .map_err(|e| parse_err(FILE, line_no, format!("invalid movieId: {}", e)))?,
            kind: kind
                .parse()
                .map_err(|reason: String| parse_err(FILE, line_no, reason))?,
            timestamp: timestamp
                .parse()
                .map_err(|e| parse_err(FILE, line_no, format!("invalid timestamp: {}", e)))?,
            value: match value {
                Some(v) if !v.is_empty() => Some(
                    v.parse()
                        .map_err(|e| parse_err(FILE, line_no, format!("invalid value: {}", e)))?,
                ),
                _ => None,
            },
        });
    }
    Ok(events)
}

/// Parse an optional year field; empty string means unknown.
fn parse_year(s: &str) -> std::result::Result<Option<u16>, String> {
    if s.is_empty() {
        return Ok(None);
    }
    s.parse::<u16>()
        .map(Some)
        .map_err(|e| format!("invalid year: {}", e))
}

/// Parse pipe-separated genres, rejecting unknown names.
fn parse_genres(s: &str) -> Result<Vec<Genre>> {
    let mut genres = Vec::new();
    for genre_str in s.split('|') {
        if genre_str.is_empty() {
            continue;
        }
        let genre = genre_str
            .parse()
            .map_err(|_| CatalogError::InvalidValue {
                field: "genre".to_string(),
                value: genre_str.to_string(),
            })?;
        genres.push(genre);
    }
    Ok(genres)
}
