use anyhow::{anyhow, Result as AnyResult};
use chrono::{DateTime, Duration, TimeZone, Utc};
use log::warn;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// One candle row as fetched from the source and persisted to cache chunks.
/// The timestamp is kept verbatim, trailing offset artifact included; the
/// cleaner strips and parses it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCandle {
    pub timestamp: String,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
}

/// A cleaned candle. Within a cleaned series timestamps are strictly
/// increasing and unique.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
}

/// Aggregated summary of a full window, in the order strategies consume it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowOhlc {
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }
}

/// A recorded order-entry event, keyed by the position of the candle being
/// replayed when the strategy placed the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal {
    pub index: usize,
    pub side: Side,
}

/// One point of the equity curve: balance delta versus the balance recorded
/// at engine construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquityPoint {
    pub index: usize,
    pub balance_delta: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    M5,
    H1,
    H2,
    D1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M5 => "5m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::D1 => "1d",
        }
    }

    /// Duration of one candle at this timeframe.
    pub fn delta(&self) -> Duration {
        match self {
            Timeframe::M5 => Duration::minutes(5),
            Timeframe::H1 => Duration::hours(1),
            Timeframe::H2 => Duration::hours(2),
            Timeframe::D1 => Duration::days(1),
        }
    }

    /// Unit used to advance the paginated fetch window. The source only
    /// serves hourly granularity below 2h, so 2h history pages in 1-hour
    /// units.
    pub fn page_unit(&self) -> Duration {
        match self {
            Timeframe::H2 => Duration::hours(1),
            other => other.delta(),
        }
    }

    /// Bin size the fetch source understands natively.
    pub fn source_bin(&self) -> &'static str {
        match self {
            Timeframe::H2 => "1h",
            other => other.as_str(),
        }
    }

    /// Start of the default lookback window when no cache exists.
    pub fn default_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Timeframe::D1 | Timeframe::H1 | Timeframe::H2 => {
                Utc.with_ymd_and_hms(2017, 1, 1, 0, 0, 0).unwrap()
            }
            Timeframe::M5 => now - Duration::days(31),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "5m" => Ok(Timeframe::M5),
            "1h" => Ok(Timeframe::H1),
            "2h" => Ok(Timeframe::H2),
            "1d" => Ok(Timeframe::D1),
            other => Err(anyhow!("Unknown timeframe '{}'", other)),
        }
    }
}

fn normalize_parameter_map(raw: HashMap<String, Value>) -> HashMap<String, f64> {
    let mut cleaned = HashMap::with_capacity(raw.len());

    for (key, value) in raw.into_iter() {
        if let Some(num) = value.as_f64() {
            if num.is_finite() {
                cleaned.insert(key, num);
            } else {
                warn!(
                    "Skipping parameter `{}` due to non-finite numeric value {}",
                    key, value
                );
            }
            continue;
        }

        if let Some(text) = value.as_str() {
            match text.trim().parse::<f64>() {
                Ok(parsed) if parsed.is_finite() => {
                    cleaned.insert(key, parsed);
                }
                _ => {
                    warn!(
                        "Skipping parameter `{}` due to non-numeric string value {}",
                        key, value
                    );
                }
            }
            continue;
        }

        if let Some(boolean) = value.as_bool() {
            cleaned.insert(key, if boolean { 1.0 } else { 0.0 });
            continue;
        }

        warn!(
            "Skipping parameter `{}` due to unsupported JSON value {}",
            key, value
        );
    }

    cleaned
}

pub fn parse_parameter_map_from_json(json: &str) -> AnyResult<HashMap<String, f64>> {
    let raw: HashMap<String, Value> =
        serde_json::from_str(json).map_err(|error| anyhow!("Invalid parameter JSON: {}", error))?;
    Ok(normalize_parameter_map(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_round_trips_codes() {
        for code in ["5m", "1h", "2h", "1d"] {
            let timeframe: Timeframe = code.parse().expect("known code");
            assert_eq!(timeframe.as_str(), code);
        }
        assert!("3h".parse::<Timeframe>().is_err());
    }

    #[test]
    fn two_hour_timeframe_pages_in_hourly_units() {
        assert_eq!(Timeframe::H2.page_unit(), Duration::hours(1));
        assert_eq!(Timeframe::H2.source_bin(), "1h");
        assert_eq!(Timeframe::H1.page_unit(), Duration::hours(1));
        assert_eq!(Timeframe::D1.page_unit(), Duration::days(1));
    }

    #[test]
    fn default_start_is_fixed_for_hourly_and_rolling_for_minutes() {
        let now = Utc.with_ymd_and_hms(2020, 6, 1, 12, 0, 0).unwrap();
        let fixed = Utc.with_ymd_and_hms(2017, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(Timeframe::D1.default_start(now), fixed);
        assert_eq!(Timeframe::H1.default_start(now), fixed);
        assert_eq!(Timeframe::H2.default_start(now), fixed);
        assert_eq!(Timeframe::M5.default_start(now), now - Duration::days(31));
    }

    #[test]
    fn parameter_map_keeps_numbers_and_coerces_strings_and_bools() {
        let parsed = parse_parameter_map_from_json(
            r#"{"periods": 10, "qty": "2.5", "enabled": true, "label": "fast"}"#,
        )
        .expect("valid JSON");
        assert_eq!(parsed.get("periods"), Some(&10.0));
        assert_eq!(parsed.get("qty"), Some(&2.5));
        assert_eq!(parsed.get("enabled"), Some(&1.0));
        assert!(parsed.get("label").is_none());
    }
}
