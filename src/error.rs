use std::path::PathBuf;

use thiserror::Error;

use crate::cache::CacheError;
use crate::importer::ImportError;

/// Top-level error type for all client operations.
///
/// Database errors propagate unmodified from the driver. Cache errors never
/// surface through query execution (the executor downgrades them to misses);
/// the variant exists for callers poking at the cache directly.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("bulk import failed: {0}")]
    Import(#[from] ImportError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("column '{0}' not present in the input")]
    MissingColumn(String),

    #[error("query file not found: {}", .0.display())]
    QueryNotFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, Error>;
