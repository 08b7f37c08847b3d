use crate::bitmex::BitMexSource;
use crate::cache::CandleCache;
use crate::cleaner;
use crate::config::RuntimeSettings;
use crate::fetcher;
use crate::models::{parse_parameter_map_from_json, EquityPoint, Signal, Timeframe};
use crate::replay::{Exchange, ReplayEngine};
use crate::strategy::create_strategy;
use anyhow::{Context, Result};
use chrono::Utc;
use log::info;
use std::collections::HashMap;
use std::path::Path;

/// Stand-in for the external order-matching simulator: accepts every order
/// and keeps the balance flat. Wire a real `Exchange` implementation here to
/// get a meaningful equity curve.
struct FlatExchange {
    orders: usize,
}

impl Exchange for FlatExchange {
    fn entry(&mut self, _id: &str, _long: bool, _qty: f64, _limit: f64, _stop: f64, _when: bool) {
        self.orders += 1;
    }

    fn get_balance(&self) -> f64 {
        0.0
    }

    fn close_all(&mut self) {}
}

pub struct BacktestArgs<'a> {
    pub timeframe: Timeframe,
    pub periods: usize,
    pub template_id: &'a str,
    pub params_json: Option<&'a str>,
    pub equity_out: Option<&'a Path>,
}

/// Full pipeline: load-or-fetch the raw history, clean it, replay it through
/// the requested strategy, and report the recorded signals and equity.
pub fn run(settings: &RuntimeSettings, args: BacktestArgs) -> Result<()> {
    let cache = CandleCache::new(&settings.cache_dir);
    let source = BitMexSource::new(settings, args.timeframe)?;
    let raw = fetcher::load_or_fetch(
        &source,
        &cache,
        args.timeframe,
        Utc::now(),
        settings.fetch_pacing(),
    )?;
    info!("Loaded {} raw rows for {}", raw.len(), args.timeframe);

    let candles = cleaner::clean(&raw)?;
    let parameters = match args.params_json {
        Some(json) => parse_parameter_map_from_json(json)?,
        None => HashMap::new(),
    };
    let mut strategy = create_strategy(args.template_id, parameters)?;

    let mut engine = ReplayEngine::new(FlatExchange { orders: 0 }, candles, args.periods);
    engine.run(strategy.as_mut());

    info!(
        "Backtest finished: {} orders, {} long / {} short signals over {} candles",
        engine.exchange().orders,
        engine.buy_signals().len(),
        engine.sell_signals().len(),
        engine.equity().len()
    );
    if let Some(point) = engine.equity().last() {
        info!("Final balance delta: {}", point.balance_delta);
    }

    if let Some(path) = args.equity_out {
        write_replay_csv(path, engine.equity(), engine.buy_signals(), engine.sell_signals())?;
        info!("Wrote equity curve to {}", path.display());
    }

    Ok(())
}

fn write_replay_csv(
    path: &Path,
    equity: &[EquityPoint],
    buy_signals: &[Signal],
    sell_signals: &[Signal],
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to open {} for writing", path.display()))?;
    writer.write_record(["index", "balance_delta", "signal"])?;

    let mut sides: HashMap<usize, &str> = HashMap::new();
    for signal in buy_signals.iter().chain(sell_signals) {
        sides.insert(signal.index, signal.side.as_str());
    }

    for point in equity {
        writer.write_record([
            point.index.to_string(),
            point.balance_delta.to_string(),
            sides.get(&point.index).unwrap_or(&"").to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
