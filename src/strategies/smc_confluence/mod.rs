//! SMC Confluence Strategy
//!
//! Order block, fair value gap and Fibonacci golden-zone entries in the
//! discount/premium half of the recent range, confirmed by a reversal
//! candle or a structure event (shift or inducement sweep).

mod config;
mod strategy;

pub use config::SmcConfluenceConfig;
pub use strategy::SmcConfluenceStrategy;

use crate::config::EffectiveConfig;
use crate::error::ConfigError;
use crate::strategies::Strategy;

/// Create strategy from config (called by registry)
pub fn create(config: &EffectiveConfig) -> Result<Box<dyn Strategy>, ConfigError> {
    let strategy_config: SmcConfluenceConfig = serde_json::from_value(config.strategy.clone())?;
    strategy_config.validate()?;
    Ok(Box::new(SmcConfluenceStrategy::new(strategy_config, config)))
}
