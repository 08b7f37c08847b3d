#[path = "commands/fetch.rs"]
pub mod fetch;

#[path = "commands/backtest.rs"]
pub mod backtest;
