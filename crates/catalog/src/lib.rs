//! # Catalog Crate
//!
//! In-memory movie catalog: domain types, data-file parsing and the
//! [`CatalogIndex`] that every engine borrows.
//!
//! ## Main Components
//!
//! - **types**: Movie, Rating, InteractionEvent, Genre, CatalogIndex
//! - **parser**: `::`-delimited data files into Rust structs
//! - **index**: secondary indices, precomputed stats, validation
//! - **error**: error types for loading
//!
//! ## Example Usage
//!
//! ```ignore
//! use catalog::CatalogIndex;
//! use std::path::Path;
//!
//! let index = CatalogIndex::load_from_files(Path::new("data/catalog"))?;
//! let movie = index.get_movie(603).unwrap();
//! let ratings = index.ratings_for_user(1);
//! println!("{} has {} rating facts", movie.title, ratings.len());
//! ```

pub mod error;
pub mod index;
pub mod parser;
pub mod types;

pub use error::{CatalogError, Result};
pub use types::{
    // Type aliases
    UserId,
    MovieId,
    // Core types
    Movie,
    Rating,
    InteractionEvent,
    CatalogIndex,
    MovieStats,
    // Enums
    Genre,
    EventKind,
};
