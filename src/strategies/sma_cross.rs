use crate::models::WindowOhlc;
use crate::param_utils::{get_param_f64, get_param_usize_min};
use crate::replay::Broker;
use std::collections::{HashMap, VecDeque};

/// Fast/slow moving-average crossover on aggregated closes.
pub struct SmaCrossStrategy {
    pub template_id: String,
    fast_length: usize,
    slow_length: usize,
    qty: f64,
    closes: VecDeque<f64>,
    prev_diff: Option<f64>,
}

impl SmaCrossStrategy {
    pub fn new(parameters: HashMap<String, f64>) -> Self {
        let fast_length = get_param_usize_min(&parameters, "fastLength", 9, 1);
        let slow_length = get_param_usize_min(&parameters, "slowLength", 26, 2).max(fast_length + 1);
        let qty = get_param_f64(&parameters, "qty", 1.0);
        Self {
            template_id: "sma_cross".to_string(),
            fast_length,
            slow_length,
            qty,
            closes: VecDeque::with_capacity(slow_length + 1),
            prev_diff: None,
        }
    }

    fn mean_of_last(&self, length: usize) -> f64 {
        let sum: f64 = self.closes.iter().rev().take(length).sum();
        sum / length as f64
    }
}

impl super::Strategy for SmaCrossStrategy {
    fn get_template_id(&self) -> &str {
        &self.template_id
    }

    fn on_window(&mut self, broker: &mut dyn Broker, ohlc: WindowOhlc) {
        self.closes.push_back(ohlc.close);
        if self.closes.len() > self.slow_length {
            self.closes.pop_front();
        }
        if self.closes.len() < self.slow_length {
            return;
        }

        let diff = self.mean_of_last(self.fast_length) - self.mean_of_last(self.slow_length);
        if let Some(prev_diff) = self.prev_diff {
            if prev_diff <= 0.0 && diff > 0.0 {
                broker.entry("sma-long", true, self.qty, 0.0, 0.0, true);
            } else if prev_diff >= 0.0 && diff < 0.0 {
                broker.entry("sma-short", false, self.qty, 0.0, 0.0, true);
            }
        }
        self.prev_diff = Some(diff);
    }
}
