//! MACD Trend Strategy
//!
//! Trend-following entries on a fresh MACD crossover, filtered by the long
//! EMA, an RSI band, ADX strength and the higher-timeframe trend.

mod config;
mod strategy;

pub use config::MacdTrendConfig;
pub use strategy::MacdTrendStrategy;

use crate::config::EffectiveConfig;
use crate::error::ConfigError;
use crate::strategies::Strategy;

/// Create strategy from config (called by registry)
pub fn create(config: &EffectiveConfig) -> Result<Box<dyn Strategy>, ConfigError> {
    let strategy_config: MacdTrendConfig = serde_json::from_value(config.strategy.clone())?;
    strategy_config.validate()?;
    Ok(Box::new(MacdTrendStrategy::new(
        strategy_config,
        &config.indicators,
    )))
}
