use crate::config::RuntimeSettings;
use crate::fetcher::FetchSource;
use crate::models::{RawCandle, Timeframe};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use serde::Deserialize;

/// Format of the raw timestamps persisted to cache chunks; keeps the offset
/// artifact the cleaner later strips.
const RAW_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";

/// The bucketed-trade endpoint caps one response at this many rows; a
/// 100-unit page always fits.
const MAX_ROWS_PER_REQUEST: u32 = 500;

/// Blocking `FetchSource` over the BitMEX `/trade/bucketed` REST endpoint.
/// The endpoint has no 2h bin, so a 2h source fetches hourly bins and
/// resamples consecutive pairs.
pub struct BitMexSource {
    http: Client,
    base_url: String,
    symbol: String,
    bin_size: &'static str,
    resample_pairs: bool,
}

impl BitMexSource {
    pub fn new(settings: &RuntimeSettings, timeframe: Timeframe) -> Result<Self> {
        let http = Client::builder()
            .timeout(settings.http_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            symbol: settings.symbol.clone(),
            bin_size: timeframe.source_bin(),
            resample_pairs: timeframe == Timeframe::H2,
        })
    }
}

#[derive(Debug, Deserialize)]
struct BucketedTrade {
    timestamp: DateTime<Utc>,
    #[serde(default)]
    open: Option<f64>,
    #[serde(default)]
    close: Option<f64>,
    #[serde(default)]
    high: Option<f64>,
    #[serde(default)]
    low: Option<f64>,
}

impl FetchSource for BitMexSource {
    fn fetch_ohlcv(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<RawCandle>> {
        let url = format!("{}/trade/bucketed", self.base_url);
        let query = [
            ("binSize", self.bin_size.to_string()),
            ("partial", "false".to_string()),
            ("symbol", self.symbol.clone()),
            ("count", MAX_ROWS_PER_REQUEST.to_string()),
            ("startTime", start.to_rfc3339()),
            ("endTime", end.to_rfc3339()),
        ];

        let response = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .with_context(|| format!("GET {} failed", url))?
            .error_for_status()
            .with_context(|| format!("GET {} returned error", url))?;
        let buckets: Vec<BucketedTrade> = response
            .json()
            .context("failed to parse bucketed trade response")?;

        let rows: Vec<RawCandle> = buckets.into_iter().filter_map(to_raw).collect();
        if self.resample_pairs {
            Ok(resample_hourly_pairs(rows))
        } else {
            Ok(rows)
        }
    }
}

fn to_raw(bucket: BucketedTrade) -> Option<RawCandle> {
    let (Some(open), Some(close), Some(high), Some(low)) =
        (bucket.open, bucket.close, bucket.high, bucket.low)
    else {
        // Empty buckets on illiquid intervals carry null prices.
        return None;
    };
    Some(RawCandle {
        timestamp: bucket.timestamp.format(RAW_TIMESTAMP_FORMAT).to_string(),
        open,
        close,
        high,
        low,
    })
}

/// Collapses consecutive hourly rows into 2-hour rows keyed by the first
/// hour's timestamp. A trailing unpaired row passes through as-is.
fn resample_hourly_pairs(rows: Vec<RawCandle>) -> Vec<RawCandle> {
    rows.chunks(2)
        .map(|pair| {
            let first = &pair[0];
            let last = &pair[pair.len() - 1];
            RawCandle {
                timestamp: first.timestamp.clone(),
                open: first.open,
                close: last.close,
                high: pair.iter().map(|row| row.high).fold(f64::MIN, f64::max),
                low: pair.iter().map(|row| row.low).fold(f64::MAX, f64::min),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(hour: usize, open: f64, close: f64, high: f64, low: f64) -> RawCandle {
        RawCandle {
            timestamp: format!("2021-01-01 {:02}:00:00+00:00", hour),
            open,
            close,
            high,
            low,
        }
    }

    #[test]
    fn pairs_collapse_into_two_hour_rows() {
        let rows = vec![
            row(0, 10.0, 11.0, 12.0, 9.0),
            row(1, 11.0, 13.0, 15.0, 8.0),
            row(2, 13.0, 12.0, 14.0, 11.0),
            row(3, 12.0, 12.5, 13.0, 12.0),
        ];
        let resampled = resample_hourly_pairs(rows);
        assert_eq!(resampled.len(), 2);
        assert_eq!(resampled[0].timestamp, "2021-01-01 00:00:00+00:00");
        assert_eq!(resampled[0].open, 10.0);
        assert_eq!(resampled[0].close, 13.0);
        assert_eq!(resampled[0].high, 15.0);
        assert_eq!(resampled[0].low, 8.0);
        assert_eq!(resampled[1].timestamp, "2021-01-01 02:00:00+00:00");
    }

    #[test]
    fn trailing_unpaired_row_passes_through() {
        let rows = vec![
            row(0, 10.0, 11.0, 12.0, 9.0),
            row(1, 11.0, 13.0, 15.0, 8.0),
            row(2, 13.0, 12.0, 14.0, 11.0),
        ];
        let resampled = resample_hourly_pairs(rows);
        assert_eq!(resampled.len(), 2);
        assert_eq!(resampled[1].open, 13.0);
        assert_eq!(resampled[1].close, 12.0);
        assert_eq!(resampled[1].high, 14.0);
        assert_eq!(resampled[1].low, 11.0);
    }

    #[test]
    fn null_price_buckets_are_dropped() {
        let bucket = BucketedTrade {
            timestamp: Utc::now(),
            open: Some(10.0),
            close: None,
            high: Some(11.0),
            low: Some(9.0),
        };
        assert!(to_raw(bucket).is_none());
    }
}
