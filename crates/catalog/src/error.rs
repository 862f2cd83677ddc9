//! Error types for catalog loading and validation.

use thiserror::Error;

/// Errors that can occur while loading or validating catalog data.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// I/O error occurred while reading a data file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A line in a data file couldn't be parsed.
    #[error("parse error at line {line} in {file}: {reason}")]
    Parse {
        file: String,
        line: usize,
        reason: String,
    },

    /// A field had an invalid value.
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    /// A rating or event references a movie that isn't in the catalog.
    #[error("missing reference: {entity} with id {id}")]
    MissingReference { entity: String, id: u32 },
}

/// Convenience alias for catalog results.
pub type Result<T> = std::result::Result<T, CatalogError>;
