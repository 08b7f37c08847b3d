use crate::models::{Candle, WindowOhlc};
use std::collections::VecDeque;

/// Sliding buffer of the most recent raw candles fed to the replay engine.
/// Holds at most `periods + 1` rows; the engine evicts the oldest after each
/// aggregation, so the steady-state length is `periods`.
#[derive(Debug)]
pub struct Window {
    periods: usize,
    rows: VecDeque<Candle>,
}

impl Window {
    pub fn new(periods: usize) -> Self {
        Self {
            periods,
            rows: VecDeque::with_capacity(periods + 1),
        }
    }

    pub fn push(&mut self, candle: Candle) {
        self.rows.push_back(candle);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// True once the window has filled past `periods` and is due for one
    /// aggregation step.
    pub fn is_ready(&self) -> bool {
        self.rows.len() > self.periods
    }

    pub fn evict_oldest(&mut self) {
        self.rows.pop_front();
    }
}

/// Collapses the full window contents into one OHLC summary: open of the
/// oldest row, close of the newest, maximum high and minimum low across the
/// window. Returns `None` for an empty window.
pub fn summarize(window: &Window) -> Option<WindowOhlc> {
    let oldest = window.rows.front()?;
    let newest = window.rows.back()?;
    let mut high = f64::MIN;
    let mut low = f64::MAX;
    for row in &window.rows {
        high = high.max(row.high);
        low = low.min(row.low);
    }
    Some(WindowOhlc {
        open: oldest.open,
        close: newest.close,
        high,
        low,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candle(hour: i64, open: f64, close: f64, high: f64, low: f64) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour),
            open,
            close,
            high,
            low,
        }
    }

    #[test]
    fn summarize_uses_oldest_open_newest_close_and_extremes() {
        let mut window = Window::new(2);
        window.push(candle(0, 10.0, 11.0, 12.0, 9.0));
        window.push(candle(1, 11.0, 13.0, 20.0, 5.0));
        window.push(candle(2, 13.0, 14.0, 15.0, 12.0));
        assert!(window.is_ready());

        let ohlc = summarize(&window).expect("non-empty window");
        assert_eq!(ohlc.open, 10.0);
        assert_eq!(ohlc.close, 14.0);
        assert_eq!(ohlc.high, 20.0);
        assert_eq!(ohlc.low, 5.0);
    }

    #[test]
    fn empty_window_has_no_summary() {
        let window = Window::new(3);
        assert!(summarize(&window).is_none());
        assert!(window.is_empty());
    }

    #[test]
    fn eviction_restores_the_steady_state_length() {
        let mut window = Window::new(2);
        for hour in 0..3 {
            window.push(candle(hour, 1.0, 1.0, 1.0, 1.0));
        }
        assert_eq!(window.len(), 3);
        assert!(window.is_ready());

        window.evict_oldest();
        assert_eq!(window.len(), 2);
        assert!(!window.is_ready());
    }
}
