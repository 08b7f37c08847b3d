use crate::models::WindowOhlc;
use crate::replay::Broker;
use anyhow::Result;
use std::collections::HashMap;

/// Strategy callback invoked once per filled window with the aggregated OHLC
/// summary. Implementations may synchronously place orders through the
/// broker.
pub trait Strategy {
    fn get_template_id(&self) -> &str;
    fn on_window(&mut self, broker: &mut dyn Broker, ohlc: WindowOhlc);
}

#[path = "strategies/channel_breakout.rs"]
pub mod channel_breakout;

pub use channel_breakout::ChannelBreakoutStrategy;

#[path = "strategies/sma_cross.rs"]
pub mod sma_cross;

pub use sma_cross::SmaCrossStrategy;

pub fn create_strategy(
    template_id: &str,
    parameters: HashMap<String, f64>,
) -> Result<Box<dyn Strategy>> {
    match template_id {
        "channel_breakout" => Ok(Box::new(ChannelBreakoutStrategy::new(parameters))),
        "sma_cross" => Ok(Box::new(SmaCrossStrategy::new(parameters))),
        _ => Err(anyhow::anyhow!(
            "Unknown strategy template: {}",
            template_id
        )),
    }
}
