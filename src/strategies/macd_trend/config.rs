//! MACD Trend Configuration

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MacdTrendConfig {
    /// BUY needs RSI strictly inside (rsi_buy_min, rsi_buy_max) (default: 50-65)
    pub rsi_buy_min: f64,
    pub rsi_buy_max: f64,

    /// SELL needs RSI strictly inside (rsi_sell_min, rsi_sell_max) (default: 35-50)
    pub rsi_sell_min: f64,
    pub rsi_sell_max: f64,

    /// Minimum ADX (default: 25, 0 = disabled)
    pub adx_threshold: f64,

    /// Bars searched for the MACD crossover, reference candle included (default: 3)
    pub cross_lookback: usize,
}

impl Default for MacdTrendConfig {
    fn default() -> Self {
        Self {
            rsi_buy_min: 50.0,
            rsi_buy_max: 65.0,
            rsi_sell_min: 35.0,
            rsi_sell_max: 50.0,
            adx_threshold: 25.0,
            cross_lookback: 3,
        }
    }
}

impl MacdTrendConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rsi_buy_min >= self.rsi_buy_max {
            return Err(ConfigError::invalid(
                "strategy.rsi_buy_min",
                "must be below rsi_buy_max",
            ));
        }
        if self.rsi_sell_min >= self.rsi_sell_max {
            return Err(ConfigError::invalid(
                "strategy.rsi_sell_min",
                "must be below rsi_sell_max",
            ));
        }
        if self.adx_threshold < 0.0 {
            return Err(ConfigError::invalid("strategy.adx_threshold", "must be >= 0"));
        }
        if self.cross_lookback == 0 {
            return Err(ConfigError::invalid("strategy.cross_lookback", "must be >= 1"));
        }
        Ok(())
    }
}
