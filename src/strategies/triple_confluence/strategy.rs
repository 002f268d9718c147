//! Triple Confluence Strategy
//!
//! 1. Trend: close vs the long EMA
//! 2. Value: low touched the lower band (BUY) or high the upper band (SELL)
//!    on any of the last N bars
//! 3. Momentum: RSI above the buy floor / below the sell ceiling
//! 4. Reversal candle on the reference bar
//! 5. Higher timeframe agrees (unknown accepted by default)

use crate::config::IndicatorConfig;
use crate::strategies::{AuxData, Decision, MarketContext, Strategy};
use crate::structure::{candle_pattern, CandlePattern};
use crate::Side;

use super::config::TripleConfluenceConfig;

pub struct TripleConfluenceStrategy {
    config: TripleConfluenceConfig,
    min_history: usize,
}

impl TripleConfluenceStrategy {
    pub fn new(config: TripleConfluenceConfig, indicators: &IndicatorConfig) -> Self {
        let min_history = indicators
            .ema_trend_period
            .max(indicators.bb_period + config.touch_lookback)
            .max(indicators.rsi_period + 1);
        Self {
            config,
            min_history,
        }
    }

    fn touched_band(&self, ctx: &MarketContext, side: Side) -> bool {
        let candles = ctx.recent_candles(self.config.touch_lookback);
        let rows = ctx.recent_rows(self.config.touch_lookback);
        candles.iter().zip(rows).any(|(c, r)| match side {
            Side::Buy => r.bb_lower.is_some_and(|band| c.low <= band),
            Side::Sell => r.bb_upper.is_some_and(|band| c.high >= band),
        })
    }
}

impl Strategy for TripleConfluenceStrategy {
    fn name(&self) -> &'static str {
        "triple_confluence"
    }

    fn magic_offset(&self) -> u64 {
        0
    }

    fn min_history(&self) -> usize {
        self.min_history
    }

    fn evaluate(&self, ctx: &MarketContext) -> Decision {
        let (Some(candle), Some(row)) = (ctx.candle(), ctx.row()) else {
            return Decision::wait("No reference candle");
        };
        let (Some(ema_trend), Some(rsi)) = (row.ema_trend, row.rsi) else {
            return Decision::wait("Indicators warming up");
        };

        let price = candle.close;
        let pattern = candle_pattern(ctx.candles, ctx.closed_index);
        let touched_lower = self.touched_band(ctx, Side::Buy);
        let touched_upper = self.touched_band(ctx, Side::Sell);
        let aux = AuxData {
            price: Some(price),
            atr: row.atr,
            rsi: Some(rsi),
            pattern,
            candle_time: Some(candle.datetime),
            ..AuxData::default()
        };

        let setup = if price > ema_trend && touched_lower && rsi > self.config.rsi_buy_min {
            Some((Side::Buy, "Up + BB low", pattern.is_some_and(CandlePattern::is_bullish)))
        } else if price < ema_trend && touched_upper && rsi < self.config.rsi_sell_max {
            Some((Side::Sell, "Down + BB up", pattern.is_some_and(CandlePattern::is_bearish)))
        } else {
            None
        };

        let Some((side, label, has_pattern)) = setup else {
            let trend = if price > ema_trend {
                "UP"
            } else if price < ema_trend {
                "DOWN"
            } else {
                "FLAT"
            };
            let band = if touched_lower {
                "Lower"
            } else if touched_upper {
                "Upper"
            } else {
                "Mid"
            };
            return Decision::wait(format!("TRPL | T:{} | BB:{} | RSI:{:.1}", trend, band, rsi))
                .with_aux(aux);
        };

        if !ctx.htf_trend.allows(side, self.config.accept_unknown_htf) {
            return Decision::wait(format!(
                "TRPL | {} | RSI:{:.1} | filtered by H1 trend {}",
                label, rsi, ctx.htf_trend
            ))
            .with_aux(aux);
        }
        let Some(pattern) = pattern.filter(|_| has_pattern) else {
            return Decision::wait(format!(
                "TRPL | {} | RSI:{:.1} | waiting for pattern",
                label, rsi
            ))
            .with_aux(aux);
        };

        Decision::entry(
            side,
            format!("TRPL | {} | {} | RSI:{:.1} | H1:{}", label, pattern, rsi, ctx.htf_trend),
        )
        .with_aux(aux)
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

    /// Six quiet bars, a bar dipping to the lower band, then the reference bar
    fn series(reference: (f64, f64, f64, f64)) -> (Vec<Candle>, IndicatorFrame) {
        let start = Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap();
        let mut ohlc = vec![(2010.0, 2011.0, 2009.0, 2010.5); 6];
        ohlc.push((2010.0, 2010.2, 2004.8, 2005.5));
        ohlc.push(reference);
        ohlc.push((2008.0, 2008.5, 2007.5, 2008.2));
        let candles = ohlc
            .iter()
            .enumerate()
            .map(|(i, &(o, h, l, c))| {
                Candle::new_unchecked(start + Duration::minutes(15 * i as i64), o, h, l, c, 1.0)
            })
            .collect::<Vec<_>>();
        let rows = vec![
            IndicatorRow {
                ema_trend: Some(2000.0),
                rsi: Some(45.0),
                bb_upper: Some(2015.0),
                bb_lower: Some(2005.0),
                atr: Some(2.0),
                ..IndicatorRow::default()
            };
            candles.len()
        ];
        (candles, IndicatorFrame::from_rows(rows))
    }

    fn run(candles: &[Candle], frame: &IndicatorFrame, htf: HtfTrend) -> Signal {
        let indicators = IndicatorConfig {
            ema_trend_period: 3,
            bb_period: 2,
            rsi_period: 2,
            ..IndicatorConfig::default()
        };
        let strategy = TripleConfluenceStrategy::new(TripleConfluenceConfig::default(), &indicators);
        let session = SessionConfig::default();
        let ctx = MarketContext {
            candles,
            indicators: frame,
            closed_index: candles.len() - 2,
            htf_trend: htf,
            position_open: false,
            now: Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap(),
            news_blackout: None,
            session: &session,
            point: 0.01,
        };
        strategy.analyze(&ctx).signal
    }

    #[test]
    fn test_buy_with_band_touch_and_engulfing() {
        // Bullish engulfing of the touch bar
        let (candles, frame) = series((2005.0, 2011.0, 2004.9, 2010.8));
        assert_eq!(run(&candles, &frame, HtfTrend::Up), Signal::Buy);
        assert_eq!(run(&candles, &frame, HtfTrend::Unknown), Signal::Buy);
        assert_eq!(run(&candles, &frame, HtfTrend::Down), Signal::Wait);
    }

    #[test]
    fn test_wait_for_pattern() {
        let (candles, frame) = series((2005.5, 2007.0, 2005.3, 2006.5));
        assert_eq!(run(&candles, &frame, HtfTrend::Up), Signal::Wait);
    }
}
