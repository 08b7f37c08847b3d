use crate::models::{Candle, RawCandle};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};

/// Length of the trailing timezone-offset artifact on raw timestamps,
/// e.g. "+00:00".
const TIMESTAMP_SUFFIX_LEN: usize = 6;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Relative change beyond which a field value is treated as a data glitch.
const SPIKE_THRESHOLD: f64 = 1.5;

/// Relative magnitude of the move from `prev` to `current`.
pub fn change_rate(prev: f64, current: f64) -> f64 {
    (current / prev - 1.0).abs()
}

/// Normalizes raw rows into candles: strips the offset artifact from every
/// timestamp, and for open/close/high independently substitutes the previous
/// cleaned row's value whenever the relative change exceeds 150%. `low` is
/// never smoothed. Output is ordered by parsed timestamp, ascending, and has
/// the same length as the input.
///
/// Smoothing is sequential against the previous *cleaned* row, so a
/// substituted value becomes the baseline for the next comparison. Two large
/// consecutive moves in the same direction therefore keep the stale value;
/// that is the intended glitch suppression, not a bug to fix with a global
/// filter.
pub fn clean(raw: &[RawCandle]) -> Result<Vec<Candle>> {
    let mut cleaned: Vec<Candle> = Vec::with_capacity(raw.len());

    for row in raw {
        let timestamp = parse_timestamp(&row.timestamp)?;
        let candle = match cleaned.last() {
            None => Candle {
                timestamp,
                open: row.open,
                close: row.close,
                high: row.high,
                low: row.low,
            },
            Some(prev) => Candle {
                timestamp,
                open: smooth(prev.open, row.open),
                close: smooth(prev.close, row.close),
                high: smooth(prev.high, row.high),
                low: row.low,
            },
        };
        cleaned.push(candle);
    }

    cleaned.sort_by_key(|candle| candle.timestamp);
    Ok(cleaned)
}

fn smooth(prev: f64, current: f64) -> f64 {
    if change_rate(prev, current) > SPIKE_THRESHOLD {
        prev
    } else {
        current
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let truncated = raw
        .get(..raw.len().saturating_sub(TIMESTAMP_SUFFIX_LEN))
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("Timestamp too short to carry an offset suffix: {:?}", raw))?;
    let naive = NaiveDateTime::parse_from_str(truncated, TIMESTAMP_FORMAT)
        .with_context(|| format!("Unparseable candle timestamp {:?}", raw))?;
    Ok(naive.and_utc())
}
