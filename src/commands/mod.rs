pub mod analyze;
pub mod run;

use anyhow::{Context, Result};
use tracing::info;
use xauusd_strategies::{Config, EffectiveConfig};

/// Load the configuration file and resolve the selected strategy's overrides
pub fn load_config(path: &str, strategy_override: Option<&str>) -> Result<EffectiveConfig> {
    let mut config =
        Config::from_file(path).with_context(|| format!("Failed to load configuration {}", path))?;
    info!("Loaded configuration from: {}", path);

    if let Some(strategy) = strategy_override {
        info!("Overriding strategy to: {}", strategy);
        config.set_strategy_name(strategy);
    }

    config.resolve().context("Invalid configuration")
}
