//! Triple Confluence Strategy
//!
//! Trend (long EMA), value (Bollinger Band touch) and momentum (RSI) must
//! agree, confirmed by a reversal candle and the higher-timeframe trend.

mod config;
mod strategy;

pub use config::TripleConfluenceConfig;
pub use strategy::TripleConfluenceStrategy;

use crate::config::EffectiveConfig;
use crate::error::ConfigError;
use crate::strategies::Strategy;

/// Create strategy from config (called by registry)
pub fn create(config: &EffectiveConfig) -> Result<Box<dyn Strategy>, ConfigError> {
    let strategy_config: TripleConfluenceConfig =
        serde_json::from_value(config.strategy.clone())?;
    strategy_config.validate()?;
    Ok(Box::new(TripleConfluenceStrategy::new(
        strategy_config,
        &config.indicators,
    )))
}
