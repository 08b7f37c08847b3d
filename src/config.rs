use crate::fetcher::FetchPacing;
use anyhow::{anyhow, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CACHE_DIR: &str = "ohlc";
const DEFAULT_API_BASE_URL: &str = "https://www.bitmex.com/api/v1";
const DEFAULT_SYMBOL: &str = "XBTUSD";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Runtime configuration resolved from the environment (and `.env` when the
/// binary loads one).
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub cache_dir: PathBuf,
    pub api_base_url: String,
    pub symbol: String,
    pub http_timeout: Duration,
    pub max_fetch_attempts: Option<u32>,
}

impl RuntimeSettings {
    pub fn from_env() -> Result<Self> {
        let cache_dir = optional_setting("OHLC_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));
        let api_base_url = optional_setting("BITMEX_BASE_URL")
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let symbol =
            optional_setting("BITMEX_SYMBOL").unwrap_or_else(|| DEFAULT_SYMBOL.to_string());
        let http_timeout =
            Duration::from_secs(setting_u64("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?);
        let max_fetch_attempts = setting_u32_opt("MAX_FETCH_ATTEMPTS")?;

        Ok(Self {
            cache_dir,
            api_base_url,
            symbol,
            http_timeout,
            max_fetch_attempts,
        })
    }

    /// Pacing for the paginated fetch loop; the retry bound may be
    /// overridden via MAX_FETCH_ATTEMPTS.
    pub fn fetch_pacing(&self) -> FetchPacing {
        let mut pacing = FetchPacing::default();
        if let Some(attempts) = self.max_fetch_attempts {
            pacing.max_attempts = attempts;
        }
        pacing
    }
}

fn optional_setting(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn setting_u64(key: &str, default: u64) -> Result<u64> {
    match optional_setting(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| anyhow!("Setting {} must be an integer (value: {})", key, raw)),
    }
}

fn setting_u32_opt(key: &str) -> Result<Option<u32>> {
    match optional_setting(key) {
        None => Ok(None),
        Some(raw) => {
            let value = raw
                .parse::<u32>()
                .map_err(|_| anyhow!("Setting {} must be an integer (value: {})", key, raw))?;
            if value == 0 {
                return Err(anyhow!("Setting {} must be >= 1 (value: {})", key, raw));
            }
            Ok(Some(value))
        }
    }
}
