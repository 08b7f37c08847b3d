use anyhow::{anyhow, Result};
use backcast::commands::{backtest, fetch};
use backcast::config::RuntimeSettings;
use backcast::models::Timeframe;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "backcast")]
#[command(about = "Candle-replay backtesting over cached exchange history")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download candle history into the chunked on-disk cache
    Fetch {
        /// Timeframe code (1d, 1h, 2h, 5m)
        timeframe: String,
        /// Override the window start (RFC 3339)
        #[arg(long)]
        start: Option<String>,
        /// Override the window end (RFC 3339)
        #[arg(long)]
        end: Option<String>,
    },
    /// Run the full pipeline: load-or-fetch, clean, replay a strategy
    Backtest {
        /// Timeframe code (1d, 1h, 2h, 5m)
        timeframe: String,
        /// Sliding-window size aggregated into one strategy call
        #[arg(long, default_value_t = 20)]
        periods: usize,
        /// Strategy template id (channel_breakout, sma_cross)
        #[arg(long, default_value = "channel_breakout")]
        strategy: String,
        /// Strategy parameters as a JSON object of numbers
        #[arg(long)]
        params: Option<String>,
        /// Write the equity curve and signals as CSV
        #[arg(long, value_name = "PATH")]
        equity_out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = RuntimeSettings::from_env()?;

    match cli.command {
        Commands::Fetch {
            timeframe,
            start,
            end,
        } => {
            let timeframe: Timeframe = timeframe.parse()?;
            let start = start.as_deref().map(parse_utc).transpose()?;
            let end = end.as_deref().map(parse_utc).transpose()?;
            fetch::run(&settings, timeframe, start, end)
        }
        Commands::Backtest {
            timeframe,
            periods,
            strategy,
            params,
            equity_out,
        } => {
            let timeframe: Timeframe = timeframe.parse()?;
            backtest::run(
                &settings,
                backtest::BacktestArgs {
                    timeframe,
                    periods,
                    template_id: &strategy,
                    params_json: params.as_deref(),
                    equity_out: equity_out.as_deref(),
                },
            )
        }
    }
}

fn parse_utc(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|_| anyhow!("Expected an RFC 3339 timestamp (value: {})", raw))
}
