use crate::cache::CandleCache;
use crate::errors::{CacheError, FetchError};
use crate::models::{RawCandle, Timeframe};
use crate::retry::{retry_with_backoff, DEFAULT_MAX_ATTEMPTS};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::thread;
use std::time::Duration;

/// Number of page-units covered by one request to the source.
const PAGE_UNITS: i32 = 100;

/// Accumulated rows beyond this count are flushed to a new cache chunk.
const FLUSH_THRESHOLD: usize = 65_000;

/// External candle source. Implementations may fail transiently; the fetcher
/// retries each page with backoff before giving up.
pub trait FetchSource {
    fn fetch_ohlcv(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<RawCandle>>;
}

/// Delays and retry bounds for the paginated fetch loop. Defaults respect the
/// source's rate limits; tests zero them out.
#[derive(Debug, Clone)]
pub struct FetchPacing {
    /// Pause after each successful page.
    pub page_delay: Duration,
    /// Cool-down before the first retry of a failed page; doubles per
    /// attempt.
    pub retry_base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for FetchPacing {
    fn default() -> Self {
        Self {
            page_delay: Duration::from_secs(2),
            retry_base_delay: Duration::from_secs(60),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Pulls a date range out of a `FetchSource` page by page and persists the
/// rows as cache chunks.
pub struct HistoryFetcher<'a> {
    source: &'a dyn FetchSource,
    cache: &'a CandleCache,
    pacing: FetchPacing,
    flush_threshold: usize,
}

impl<'a> HistoryFetcher<'a> {
    pub fn new(source: &'a dyn FetchSource, cache: &'a CandleCache) -> Self {
        Self {
            source,
            cache,
            pacing: FetchPacing::default(),
            flush_threshold: FLUSH_THRESHOLD,
        }
    }

    pub fn with_pacing(mut self, pacing: FetchPacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_flush_threshold(mut self, flush_threshold: usize) -> Self {
        self.flush_threshold = flush_threshold;
        self
    }

    /// Fetches `[start, end]` in sub-windows of 100 page-units and persists
    /// the accumulated rows as chunks with increasing sequence indices.
    /// Returns the number of chunks written.
    ///
    /// The advancing left edge decides termination: once it passes `end` the
    /// remaining buffer becomes the final chunk. A sub-window that straddles
    /// `end` is clamped to it first.
    pub fn fetch(
        &self,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u32, FetchError> {
        let unit = timeframe.page_unit();
        let mut left = start;
        let mut right = start + unit * (PAGE_UNITS - 1);
        let mut buffer: Vec<RawCandle> = Vec::new();
        let mut chunk_index = 0u32;

        let progress = page_progress_bar(start, end, unit);

        loop {
            let context = format!("ohlcv page {}..{}", left, right);
            let page_start = left;
            let page_end = right;
            let rows = retry_with_backoff(
                &context,
                self.pacing.max_attempts,
                self.pacing.retry_base_delay,
                || self.source.fetch_ohlcv(page_start, page_end),
            )
            .map_err(|source| FetchError::Exhausted {
                attempts: self.pacing.max_attempts,
                start: page_start,
                end: page_end,
                source,
            })?;
            buffer.extend(rows);
            progress.inc(1);

            left += unit * PAGE_UNITS;
            right += unit * PAGE_UNITS;
            if left < end && end < right {
                right = end;
            } else if left > end {
                self.cache.persist(timeframe, &buffer, chunk_index)?;
                chunk_index += 1;
                break;
            }

            thread::sleep(self.pacing.page_delay);

            if buffer.len() > self.flush_threshold {
                self.cache.persist(timeframe, &buffer, chunk_index)?;
                buffer.clear();
                chunk_index += 1;
            }
        }

        progress.finish_and_clear();
        info!(
            "Fetched {} history into {} chunk(s) covering {}..{}",
            timeframe, chunk_index, start, end
        );
        Ok(chunk_index)
    }
}

/// Two-phase cache fill: on a miss, phase 1 fetches and persists every chunk
/// over the timeframe's default lookback, phase 2 reloads from disk in one
/// pass. The returned rows are always the on-disk representation.
pub fn load_or_fetch(
    source: &dyn FetchSource,
    cache: &CandleCache,
    timeframe: Timeframe,
    now: DateTime<Utc>,
    pacing: FetchPacing,
) -> Result<Vec<RawCandle>, FetchError> {
    match cache.load(timeframe) {
        Ok(rows) => Ok(rows),
        Err(CacheError::Miss(_)) => {
            let start = timeframe.default_start(now);
            HistoryFetcher::new(source, cache)
                .with_pacing(pacing)
                .fetch(timeframe, start, now)?;
            Ok(cache.load(timeframe)?)
        }
        Err(other) => Err(other.into()),
    }
}

fn page_progress_bar(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    unit: chrono::Duration,
) -> ProgressBar {
    let span_units = (end - start).num_seconds().max(0) / unit.num_seconds().max(1);
    let total_pages = span_units / i64::from(PAGE_UNITS) + 1;
    let progress = ProgressBar::new(total_pages as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap()
            .progress_chars("#>-"),
    );
    progress
}
