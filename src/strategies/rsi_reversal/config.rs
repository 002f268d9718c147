//! RSI Reversal Configuration

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RsiReversalConfig {
    /// RSI level a BUY must recover from (default: 30)
    pub oversold: f64,

    /// RSI level a SELL must fall back from (default: 70)
    pub overbought: f64,

    /// Bars before the reference candle searched for the extreme (default: 3)
    pub cross_lookback: usize,
}

impl Default for RsiReversalConfig {
    fn default() -> Self {
        Self {
            oversold: 30.0,
            overbought: 70.0,
            cross_lookback: 3,
        }
    }
}

impl RsiReversalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0 < self.oversold && self.oversold < self.overbought && self.overbought < 100.0) {
            return Err(ConfigError::invalid(
                "strategy.oversold/overbought",
                "expected 0 < oversold < overbought < 100",
            ));
        }
        if self.cross_lookback == 0 {
            return Err(ConfigError::invalid("strategy.cross_lookback", "must be >= 1"));
        }
        Ok(())
    }
}
