use crate::models::WindowOhlc;
use crate::param_utils::{get_param_f64, get_param_usize_min};
use crate::replay::Broker;
use std::collections::{HashMap, VecDeque};

/// Donchian-style breakout over aggregated window summaries: enter long when
/// the close clears the prior channel high, short when it breaks the prior
/// channel low.
pub struct ChannelBreakoutStrategy {
    pub template_id: String,
    channel_length: usize,
    qty: f64,
    highs: VecDeque<f64>,
    lows: VecDeque<f64>,
    position: i8,
}

impl ChannelBreakoutStrategy {
    pub fn new(parameters: HashMap<String, f64>) -> Self {
        let channel_length = get_param_usize_min(&parameters, "channelLength", 18, 1);
        let qty = get_param_f64(&parameters, "qty", 1.0);
        Self {
            template_id: "channel_breakout".to_string(),
            channel_length,
            qty,
            highs: VecDeque::with_capacity(channel_length + 1),
            lows: VecDeque::with_capacity(channel_length + 1),
            position: 0,
        }
    }
}

impl super::Strategy for ChannelBreakoutStrategy {
    fn get_template_id(&self) -> &str {
        &self.template_id
    }

    fn on_window(&mut self, broker: &mut dyn Broker, ohlc: WindowOhlc) {
        if self.highs.len() >= self.channel_length {
            let upper = self.highs.iter().copied().fold(f64::MIN, f64::max);
            let lower = self.lows.iter().copied().fold(f64::MAX, f64::min);

            if ohlc.close > upper && self.position <= 0 {
                broker.entry("breakout-long", true, self.qty, 0.0, 0.0, true);
                self.position = 1;
            } else if ohlc.close < lower && self.position >= 0 {
                broker.entry("breakout-short", false, self.qty, 0.0, 0.0, true);
                self.position = -1;
            }
        }

        self.highs.push_back(ohlc.high);
        self.lows.push_back(ohlc.low);
        if self.highs.len() > self.channel_length {
            self.highs.pop_front();
            self.lows.pop_front();
        }
    }
}
