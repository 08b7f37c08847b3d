use crate::aggregator::{summarize, Window};
use crate::models::{Candle, EquityPoint, Side, Signal};
use crate::strategy::Strategy;
use chrono::{DateTime, Utc};
use log::info;

/// Order-matching collaborator the engine drives. Implementations own
/// position sizing, fills and balance bookkeeping.
pub trait Exchange {
    fn entry(&mut self, id: &str, long: bool, qty: f64, limit: f64, stop: f64, when: bool);
    fn get_balance(&self) -> f64;
    fn close_all(&mut self);
}

/// Surface exposed to strategies during a replay step.
pub trait Broker {
    /// Places an order through the exchange collaborator, recording a signal
    /// at the current candle index before control returns.
    fn entry(&mut self, id: &str, long: bool, qty: f64, limit: f64, stop: f64, when: bool);
    fn get_balance(&self) -> f64;
    /// Open price of the candle currently being replayed.
    fn market_price(&self) -> f64;
    /// Timestamp of the candle currently being replayed; `None` before the
    /// first step.
    fn now_time(&self) -> Option<DateTime<Utc>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    Idle,
    Running,
    Closed,
}

/// Deterministic single-pass replay over a cleaned candle series.
///
/// Registering a strategy via `run` moves the engine from `Idle` to
/// `Running`; after the last candle the exchange is told to close all open
/// positions and the engine is `Closed`. Running again starts an entirely
/// new pass over the same series from the beginning.
pub struct ReplayEngine<E: Exchange> {
    exchange: E,
    candles: Vec<Candle>,
    periods: usize,
    state: ReplayState,
    market_price: f64,
    current_time: Option<DateTime<Utc>>,
    index: usize,
    window: Window,
    buy_signals: Vec<Signal>,
    sell_signals: Vec<Signal>,
    equity: Vec<EquityPoint>,
    start_balance: f64,
}

impl<E: Exchange> ReplayEngine<E> {
    /// Signal and equity collections are owned per instance and start empty;
    /// the starting balance is sampled here and anchors every equity point.
    pub fn new(exchange: E, candles: Vec<Candle>, periods: usize) -> Self {
        let start_balance = exchange.get_balance();
        Self {
            exchange,
            candles,
            periods,
            state: ReplayState::Idle,
            market_price: 0.0,
            current_time: None,
            index: 0,
            window: Window::new(periods),
            buy_signals: Vec::new(),
            sell_signals: Vec::new(),
            equity: Vec::new(),
            start_balance,
        }
    }

    /// Runs one full replay pass with `strategy` registered as the window
    /// callback.
    pub fn run(&mut self, strategy: &mut dyn Strategy) {
        if self.state == ReplayState::Closed {
            self.reset();
        }
        self.state = ReplayState::Running;

        for i in 0..self.candles.len() {
            let candle = self.candles[i];
            self.market_price = candle.open;
            self.current_time = Some(candle.timestamp);
            self.index = i;

            self.window.push(candle);
            if self.window.is_ready() {
                if let Some(ohlc) = summarize(&self.window) {
                    strategy.on_window(self, ohlc);
                }
                self.window.evict_oldest();
            }

            let balance_delta = self.exchange.get_balance() - self.start_balance;
            self.equity.push(EquityPoint {
                index: i,
                balance_delta,
            });
        }

        self.exchange.close_all();
        self.state = ReplayState::Closed;
        info!(
            "Replay closed: {} candles, {} long / {} short signals",
            self.candles.len(),
            self.buy_signals.len(),
            self.sell_signals.len()
        );
    }

    fn reset(&mut self) {
        self.window = Window::new(self.periods);
        self.buy_signals.clear();
        self.sell_signals.clear();
        self.equity.clear();
        self.market_price = 0.0;
        self.current_time = None;
        self.index = 0;
        self.state = ReplayState::Idle;
    }

    pub fn state(&self) -> ReplayState {
        self.state
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn buy_signals(&self) -> &[Signal] {
        &self.buy_signals
    }

    pub fn sell_signals(&self) -> &[Signal] {
        &self.sell_signals
    }

    pub fn equity(&self) -> &[EquityPoint] {
        &self.equity
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }
}

impl<E: Exchange> Broker for ReplayEngine<E> {
    fn entry(&mut self, id: &str, long: bool, qty: f64, limit: f64, stop: f64, when: bool) {
        self.exchange.entry(id, long, qty, limit, stop, when);
        let side = if long { Side::Long } else { Side::Short };
        let signal = Signal {
            index: self.index,
            side,
        };
        match side {
            Side::Long => self.buy_signals.push(signal),
            Side::Short => self.sell_signals.push(signal),
        }
    }

    fn get_balance(&self) -> f64 {
        self.exchange.get_balance()
    }

    fn market_price(&self) -> f64 {
        self.market_price
    }

    fn now_time(&self) -> Option<DateTime<Utc>> {
        self.current_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WindowOhlc;
    use chrono::{Duration, TimeZone, Utc};

    #[derive(Default)]
    struct RecordingExchange {
        entries: Vec<(String, bool, f64)>,
        close_all_calls: usize,
    }

    impl Exchange for RecordingExchange {
        fn entry(&mut self, id: &str, long: bool, qty: f64, _limit: f64, _stop: f64, _when: bool) {
            self.entries.push((id.to_string(), long, qty));
        }

        fn get_balance(&self) -> f64 {
            10_000.0
        }

        fn close_all(&mut self) {
            self.close_all_calls += 1;
        }
    }

    /// Enters on every window, alternating sides.
    struct AlternatingStrategy {
        calls: usize,
    }

    impl Strategy for AlternatingStrategy {
        fn get_template_id(&self) -> &str {
            "alternating"
        }

        fn on_window(&mut self, broker: &mut dyn Broker, _ohlc: WindowOhlc) {
            let long = self.calls % 2 == 0;
            broker.entry("alt", long, 1.0, 0.0, 0.0, true);
            self.calls += 1;
        }
    }

    fn series(len: i64) -> Vec<Candle> {
        let base = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        (0..len)
            .map(|i| Candle {
                timestamp: base + Duration::hours(i),
                open: 100.0,
                close: 100.0,
                high: 100.0,
                low: 100.0,
            })
            .collect()
    }

    #[test]
    fn engine_walks_idle_running_closed() {
        let mut engine = ReplayEngine::new(RecordingExchange::default(), series(8), 3);
        assert_eq!(engine.state(), ReplayState::Idle);

        let mut strategy = AlternatingStrategy { calls: 0 };
        engine.run(&mut strategy);
        assert_eq!(engine.state(), ReplayState::Closed);
        assert_eq!(engine.exchange().close_all_calls, 1);
    }

    #[test]
    fn each_entry_records_exactly_one_signal_on_its_own_side() {
        let mut engine = ReplayEngine::new(RecordingExchange::default(), series(8), 3);
        let mut strategy = AlternatingStrategy { calls: 0 };
        engine.run(&mut strategy);

        // 8 candles, periods 3: windows fill at indices 3..=7, five calls.
        assert_eq!(strategy.calls, 5);
        assert_eq!(engine.buy_signals().len(), 3);
        assert_eq!(engine.sell_signals().len(), 2);
        assert_eq!(engine.buy_signals()[0].index, 3);
        assert_eq!(engine.buy_signals()[0].side, Side::Long);
        assert_eq!(engine.sell_signals()[0].index, 4);
        assert_eq!(engine.sell_signals()[0].side, Side::Short);
        assert_eq!(engine.exchange().entries.len(), 5);
    }

    #[test]
    fn equity_curve_has_one_point_per_candle() {
        let mut engine = ReplayEngine::new(RecordingExchange::default(), series(8), 3);
        let mut strategy = AlternatingStrategy { calls: 0 };
        engine.run(&mut strategy);

        assert_eq!(engine.equity().len(), 8);
        assert!(engine
            .equity()
            .iter()
            .enumerate()
            .all(|(i, point)| point.index == i && point.balance_delta == 0.0));
    }

    #[test]
    fn rerunning_a_closed_engine_starts_a_fresh_pass() {
        let mut engine = ReplayEngine::new(RecordingExchange::default(), series(8), 3);
        let mut strategy = AlternatingStrategy { calls: 0 };
        engine.run(&mut strategy);
        let first_longs = engine.buy_signals().len();

        let mut strategy = AlternatingStrategy { calls: 0 };
        engine.run(&mut strategy);
        assert_eq!(engine.state(), ReplayState::Closed);
        assert_eq!(engine.buy_signals().len(), first_longs);
        assert_eq!(engine.equity().len(), 8);
        assert_eq!(engine.exchange().close_all_calls, 2);
    }
}
