//! RSI Reversal Strategy
//!
//! RSI recovering from an extreme, taken only on the side of the long EMA.

mod config;
mod strategy;

pub use config::RsiReversalConfig;
pub use strategy::RsiReversalStrategy;

use crate::config::EffectiveConfig;
use crate::error::ConfigError;
use crate::strategies::Strategy;

/// Create strategy from config (called by registry)
pub fn create(config: &EffectiveConfig) -> Result<Box<dyn Strategy>, ConfigError> {
    let strategy_config: RsiReversalConfig = serde_json::from_value(config.strategy.clone())?;
    strategy_config.validate()?;
    Ok(Box::new(RsiReversalStrategy::new(
        strategy_config,
        &config.indicators,
    )))
}
