use crate::models::Timeframe;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    /// No chunk files exist for the timeframe. Resolved by fetching and
    /// persisting, then reloading.
    #[error("no cached chunks for timeframe {0}")]
    Miss(Timeframe),

    /// A chunk file exists but cannot be parsed. Requires manual cache
    /// invalidation (delete and refetch).
    #[error("malformed chunk file {path}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to write chunk file {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// The source kept failing for one sub-window until the retry budget ran
    /// out.
    #[error("fetch source exhausted {attempts} attempts for window {start}..{end}")]
    Exhausted {
        attempts: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),
}
