//! SMC Confluence Configuration

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmcConfluenceConfig {
    /// Bars scanned for order blocks (default: 100)
    pub ob_lookback: usize,

    /// Bars scanned for fair value gaps (default: 20)
    pub fvg_lookback: usize,

    /// Bars defining the premium/discount range (default: 50)
    pub range_lookback: usize,

    /// Order-block retest tolerance beyond the far edge, in ATR (default: 0.1)
    pub retest_outside_atr: f64,

    /// Order-block retest tolerance past the near edge, in ATR (default: 0.5)
    pub retest_inside_atr: f64,

    /// Golden-zone buffer, in ATR (default: 0.2)
    pub fib_buffer_atr: f64,

    /// Stop buffer beyond the order block, in ATR (default: 0.5)
    pub sl_buffer_atr: f64,

    /// Stop distance when no order block is present, in ATR (default: 2.0)
    pub fallback_sl_atr: f64,

    /// Target the nearest opposing swing instead of a fixed R multiple (default: true)
    pub dynamic_tp: bool,

    /// Maximum order-block width in points (default: targets.max_sl_points)
    pub max_zone_points: Option<f64>,
}

impl Default for SmcConfluenceConfig {
    fn default() -> Self {
        Self {
            ob_lookback: 100,
            fvg_lookback: 20,
            range_lookback: 50,
            retest_outside_atr: 0.1,
            retest_inside_atr: 0.5,
            fib_buffer_atr: 0.2,
            sl_buffer_atr: 0.5,
            fallback_sl_atr: 2.0,
            dynamic_tp: true,
            max_zone_points: None,
        }
    }
}

impl SmcConfluenceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ob_lookback < 6 || self.fvg_lookback < 3 || self.range_lookback < 2 {
            return Err(ConfigError::invalid(
                "strategy.*_lookback",
                "ob >= 6, fvg >= 3, range >= 2",
            ));
        }
        if self.fallback_sl_atr <= 0.0 {
            return Err(ConfigError::invalid("strategy.fallback_sl_atr", "must be > 0"));
        }
        if self.max_zone_points.is_some_and(|p| p <= 0.0) {
            return Err(ConfigError::invalid("strategy.max_zone_points", "must be > 0"));
        }
        Ok(())
    }
}
