use crate::bitmex::BitMexSource;
use crate::cache::CandleCache;
use crate::config::RuntimeSettings;
use crate::fetcher::HistoryFetcher;
use crate::models::Timeframe;
use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{info, warn};

/// Warms the chunk cache for `timeframe` over `[start, end]`, defaulting to
/// the timeframe's lookback window ending now.
pub fn run(
    settings: &RuntimeSettings,
    timeframe: Timeframe,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<()> {
    let cache = CandleCache::new(&settings.cache_dir);
    if cache.has_chunks(timeframe) {
        warn!(
            "Cache for {} already has chunks under {}; delete the directory to refetch.",
            timeframe,
            cache.timeframe_dir(timeframe).display()
        );
        return Ok(());
    }

    let now = Utc::now();
    let start = start.unwrap_or_else(|| timeframe.default_start(now));
    let end = end.unwrap_or(now);
    info!("Fetching {} history for {}..{}", timeframe, start, end);

    let source = BitMexSource::new(settings, timeframe)?;
    let chunks = HistoryFetcher::new(&source, &cache)
        .with_pacing(settings.fetch_pacing())
        .fetch(timeframe, start, end)?;
    info!("Wrote {} chunk(s) for {}", chunks, timeframe);
    Ok(())
}
