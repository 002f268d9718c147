//! RSI Reversal Strategy
//!
//! 1. Trend side from close vs the long EMA
//! 2. RSI was beyond the extreme on any of the last N bars
//! 3. RSI is back inside the band on the reference candle

use crate::config::IndicatorConfig;
use crate::strategies::{AuxData, Decision, MarketContext, Strategy};
use crate::Side;

use super::config::RsiReversalConfig;

pub struct RsiReversalStrategy {
    config: RsiReversalConfig,
    min_history: usize,
}

impl RsiReversalStrategy {
    pub fn new(config: RsiReversalConfig, indicators: &IndicatorConfig) -> Self {
        let min_history = indicators
            .ema_trend_period
            .max(indicators.rsi_period + config.cross_lookback + 1);
        Self {
            config,
            min_history,
        }
    }

    /// RSI values of the lookback bars before the reference candle
    fn previous_rsi(&self, ctx: &MarketContext) -> Vec<f64> {
        let rows = ctx.recent_rows(self.config.cross_lookback + 1);
        rows[..rows.len().saturating_sub(1)]
            .iter()
            .filter_map(|r| r.rsi)
            .collect()
    }
}

impl Strategy for RsiReversalStrategy {
    fn name(&self) -> &'static str {
        "rsi_reversal"
    }

    fn min_history(&self) -> usize {
        self.min_history
    }

    fn evaluate(&self, ctx: &MarketContext) -> Decision {
        let (Some(candle), Some(row)) = (ctx.candle(), ctx.row()) else {
            return Decision::wait("No reference candle");
        };
        let (Some(rsi), Some(ema_trend)) = (row.rsi, row.ema_trend) else {
            return Decision::wait("Indicators warming up");
        };

        let price = candle.close;
        let previous = self.previous_rsi(ctx);
        let was_oversold = previous.iter().any(|&v| v < self.config.oversold);
        let was_overbought = previous.iter().any(|&v| v > self.config.overbought);

        let aux = AuxData {
            price: Some(price),
            atr: row.atr,
            rsi: Some(rsi),
            candle_time: Some(candle.datetime),
            ..AuxData::default()
        };

        if price > ema_trend && was_oversold && rsi > self.config.oversold {
            return Decision::entry(
                Side::Buy,
                format!(
                    "RSI recovered above {:.0} ({:.1}) in uptrend (close {:.2} > EMA {:.2})",
                    self.config.oversold, rsi, price, ema_trend
                ),
            )
            .with_aux(aux);
        }

        if price < ema_trend && was_overbought && rsi < self.config.overbought {
            return Decision::entry(
                Side::Sell,
                format!(
                    "RSI fell back below {:.0} ({:.1}) in downtrend (close {:.2} < EMA {:.2})",
                    self.config.overbought, rsi, price, ema_trend
                ),
            )
            .with_aux(aux);
        }

        let trend = if price > ema_trend {
            "UP"
        } else if price < ema_trend {
            "DOWN"
        } else {
            "FLAT"
        };
        Decision::wait(format!("RSI {:.1} | trend {}", rsi, trend)).with_aux(aux)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::indicators::{IndicatorFrame, IndicatorRow};
    use crate::multi_timeframe::HtfTrend;
    use crate::{Candle, Signal};
    use chrono::{Duration, TimeZone, Utc};

    fn fixture(close: f64, ema: f64, rsi: &[f64]) -> (Vec<Candle>, IndicatorFrame) {
        let start = Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap();
        let candles = (0..rsi.len())
            .map(|i| {
                Candle::new_unchecked(
                    start + Duration::minutes(15 * i as i64),
                    close,
                    close + 1.0,
                    close - 1.0,
                    close,
                    1.0,
                )
            })
            .collect();
        let rows = rsi
            .iter()
            .map(|&v| IndicatorRow {
                rsi: Some(v),
                ema_trend: Some(ema),
                atr: Some(2.0),
                ..IndicatorRow::default()
            })
            .collect();
        (candles, IndicatorFrame::from_rows(rows))
    }

    fn strategy() -> RsiReversalStrategy {
        let indicators = IndicatorConfig {
            ema_trend_period: 5,
            rsi_period: 2,
            ..IndicatorConfig::default()
        };
        RsiReversalStrategy::new(RsiReversalConfig::default(), &indicators)
    }

    fn run(candles: &[Candle], frame: &IndicatorFrame) -> Signal {
        let session = SessionConfig::default();
        let ctx = MarketContext {
            candles,
            indicators: frame,
            closed_index: candles.len() - 1,
            htf_trend: HtfTrend::Disabled,
            position_open: false,
            now: Utc.with_ymd_and_hms(2025, 4, 1, 12, 0, 0).unwrap(),
            news_blackout: None,
            session: &session,
            point: 0.01,
        };
        strategy().analyze(&ctx).signal
    }

    #[test]
    fn test_buy_on_recovery_in_uptrend() {
        let (candles, frame) = fixture(2010.0, 2000.0, &[50.0, 45.0, 40.0, 35.0, 28.0, 34.0]);
        assert_eq!(run(&candles, &frame), Signal::Buy);
    }

    #[test]
    fn test_no_buy_below_ema_or_without_extreme() {
        let (candles, frame) = fixture(1990.0, 2000.0, &[50.0, 45.0, 40.0, 35.0, 28.0, 34.0]);
        assert_eq!(run(&candles, &frame), Signal::Wait);

        let (candles, frame) = fixture(2010.0, 2000.0, &[50.0, 45.0, 40.0, 35.0, 31.0, 34.0]);
        assert_eq!(run(&candles, &frame), Signal::Wait);

        // Extreme older than the lookback window
        let (candles, frame) = fixture(2010.0, 2000.0, &[28.0, 35.0, 36.0, 37.0, 38.0, 39.0]);
        assert_eq!(run(&candles, &frame), Signal::Wait);
    }

    #[test]
    fn test_sell_on_fall_back_in_downtrend() {
        let (candles, frame) = fixture(1990.0, 2000.0, &[50.0, 55.0, 60.0, 72.0, 69.0, 66.0]);
        assert_eq!(run(&candles, &frame), Signal::Sell);
    }
}
