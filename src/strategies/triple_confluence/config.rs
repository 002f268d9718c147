//! Triple Confluence Configuration

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TripleConfluenceConfig {
    /// Bars searched for a band touch, reference candle included (default: 5)
    pub touch_lookback: usize,

    /// BUY needs RSI above this (default: 40)
    pub rsi_buy_min: f64,

    /// SELL needs RSI below this (default: 60)
    pub rsi_sell_max: f64,

    /// Let entries through while higher-timeframe history is short (default: true)
    pub accept_unknown_htf: bool,
}

impl Default for TripleConfluenceConfig {
    fn default() -> Self {
        Self {
            touch_lookback: 5,
            rsi_buy_min: 40.0,
            rsi_sell_max: 60.0,
            accept_unknown_htf: true,
        }
    }
}

impl TripleConfluenceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.touch_lookback == 0 {
            return Err(ConfigError::invalid("strategy.touch_lookback", "must be >= 1"));
        }
        if !(0.0..=100.0).contains(&self.rsi_buy_min) || !(0.0..=100.0).contains(&self.rsi_sell_max)
        {
            return Err(ConfigError::invalid(
                "strategy.rsi_buy_min/rsi_sell_max",
                "must be within 0..=100",
            ));
        }
        Ok(())
    }
}
