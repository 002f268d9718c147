//! Higher-timeframe trend filter
//!
//! Classifies a second candle series (H1 by default) by the side of its last
//! close relative to a long EMA.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::MtfConfig;
use crate::indicators::ema;
use crate::{Candle, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HtfTrend {
    Up,
    Down,
    /// Close sits exactly on the EMA
    Range,
    /// Not enough higher-timeframe history
    Unknown,
    /// Filter switched off in configuration
    Disabled,
}

impl HtfTrend {
    pub fn from_candles(candles: &[Candle], cfg: &MtfConfig) -> HtfTrend {
        if !cfg.enabled {
            return HtfTrend::Disabled;
        }
        if cfg.ema_period == 0 || candles.len() < cfg.ema_period {
            debug!(
                bars = candles.len(),
                needed = cfg.ema_period,
                "Higher timeframe history too short"
            );
            return HtfTrend::Unknown;
        }

        let close: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let ema_values = ema(&close, cfg.ema_period);
        let (Some(&last_close), Some(Some(last_ema))) = (close.last(), ema_values.last().copied())
        else {
            return HtfTrend::Unknown;
        };

        if last_close > last_ema {
            HtfTrend::Up
        } else if last_close < last_ema {
            HtfTrend::Down
        } else {
            HtfTrend::Range
        }
    }

    /// Whether an entry on `side` agrees with this trend.
    /// `accept_unknown` lets short higher-timeframe history pass.
    pub fn allows(self, side: Side, accept_unknown: bool) -> bool {
        match (self, side) {
            (HtfTrend::Disabled, _) => true,
            (HtfTrend::Unknown, _) => accept_unknown,
            (HtfTrend::Up, Side::Buy) | (HtfTrend::Down, Side::Sell) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for HtfTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HtfTrend::Up => "UP",
            HtfTrend::Down => "DOWN",
            HtfTrend::Range => "RANGE",
            HtfTrend::Unknown => "UNKNOWN",
            HtfTrend::Disabled => "OFF",
        };
        write!(f, "{}", s)
    }
}
