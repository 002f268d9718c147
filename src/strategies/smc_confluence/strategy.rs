//! SMC Confluence Strategy
//!
//! Location: price retesting an unmitigated order block, inside a fair value
//! gap, or inside the 61.8-78.6% retracement band.
//! Bias: BUY only in the discount half of the range, SELL only in premium.
//! Confirmation: (reversal candle AND structure event) OR (order block
//! overlapping the golden zone AND structure event).

use crate::config::EffectiveConfig;
use crate::strategies::{AuxData, Decision, MarketContext, Strategy};
use crate::structure::{
    candle_pattern, fair_value_gaps, inducement_sweep, liquidity_targets, market_structure_shift,
    order_blocks, swing_points, swing_range, CandlePattern, FairValueGaps, FibonacciLevels,
    MarketStructureShift, OrderBlocks, SwingPoint, TrendDirection, Zone,
};
use crate::Side;

use super::config::SmcConfluenceConfig;

pub struct SmcConfluenceStrategy {
    config: SmcConfluenceConfig,
    max_zone_points: f64,
    risk_reward_ratio: f64,
    min_history: usize,
}

/// Structure computed once per evaluation and shared by both sides
struct Structure {
    price: f64,
    atr: f64,
    trend: TrendDirection,
    blocks: OrderBlocks,
    gaps: FairValueGaps,
    swings: Vec<SwingPoint>,
    mss: Option<MarketStructureShift>,
    sweep: bool,
    range: Option<(f64, f64)>,
    fib: Option<FibonacciLevels>,
    pattern: Option<CandlePattern>,
}

impl Structure {
    fn midpoint(&self) -> Option<f64> {
        self.range.map(|(high, low)| (high + low) / 2.0)
    }

    fn in_discount(&self) -> bool {
        self.midpoint().is_some_and(|mid| self.price < mid)
    }

    fn in_premium(&self) -> bool {
        self.midpoint().is_some_and(|mid| self.price > mid)
    }
}

impl SmcConfluenceStrategy {
    pub fn new(config: SmcConfluenceConfig, effective: &EffectiveConfig) -> Self {
        let max_zone_points = config
            .max_zone_points
            .unwrap_or(effective.targets.max_sl_points);
        let min_history = effective
            .indicators
            .ema_trend_period
            .max(effective.indicators.atr_period + 5);
        Self {
            config,
            max_zone_points,
            risk_reward_ratio: effective.targets.risk_reward_ratio,
            min_history,
        }
    }

    fn ob_retest(&self, side: Side, zone: &Zone, s: &Structure) -> bool {
        let outside = s.atr * self.config.retest_outside_atr;
        let inside = s.atr * self.config.retest_inside_atr;
        match side {
            Side::Buy => s.price >= zone.bottom - outside && s.price <= zone.top + inside,
            Side::Sell => s.price <= zone.top + outside && s.price >= zone.bottom - inside,
        }
    }

    fn in_golden_band(&self, side: Side, s: &Structure) -> bool {
        let Some(fib) = s.fib else { return false };
        let buffer = s.atr * self.config.fib_buffer_atr;
        let (low, high) = fib.golden_zone();
        match (side, s.trend) {
            (Side::Buy, TrendDirection::Up) => s.price >= low && s.price <= high + buffer,
            (Side::Sell, TrendDirection::Down) => s.price >= low - buffer && s.price <= high,
            _ => false,
        }
    }

    /// Nearest opposing liquidity, falling back to the range extreme
    fn liquidity_target(&self, side: Side, s: &Structure) -> Option<f64> {
        if !self.config.dynamic_tp {
            return None;
        }
        let (highs, lows) = liquidity_targets(&s.swings, s.price);
        match side {
            Side::Buy => highs
                .first()
                .copied()
                .or_else(|| s.range.map(|(high, _)| high))
                .filter(|&tp| tp > s.price),
            Side::Sell => lows
                .first()
                .copied()
                .or_else(|| s.range.map(|(_, low)| low))
                .filter(|&tp| tp < s.price),
        }
    }

    fn evaluate_side(&self, side: Side, s: &Structure) -> Result<(f64, f64, String), String> {
        let (block, gaps, structure_ok, pattern_ok, in_bias, bias) = match side {
            Side::Buy => (
                s.blocks.bullish,
                &s.gaps.bullish,
                s.sweep || s.mss == Some(MarketStructureShift::Bullish),
                s.pattern.is_some_and(CandlePattern::is_bullish),
                s.in_discount(),
                "discount",
            ),
            Side::Sell => (
                s.blocks.bearish,
                &s.gaps.bearish,
                s.sweep || s.mss == Some(MarketStructureShift::Bearish),
                s.pattern.is_some_and(CandlePattern::is_bearish),
                s.in_premium(),
                "premium",
            ),
        };

        let ob_match = block.is_some_and(|z| self.ob_retest(side, &z, s));
        let fvg_match = gaps.iter().any(|z| z.contains(s.price));
        let fib_match = self.in_golden_band(side, s);

        if !(ob_match || fvg_match || fib_match) {
            return Err(String::new());
        }
        let setup = if ob_match && fib_match {
            "Golden"
        } else if ob_match {
            "OB"
        } else if fvg_match {
            "FVG"
        } else {
            "Fibo"
        };

        if !in_bias {
            return Err(format!("{} {} outside {} zone", side, setup, bias));
        }

        let golden = ob_match && fib_match;
        if !structure_ok || !(pattern_ok || golden) {
            let mut missing = Vec::new();
            if !pattern_ok {
                missing.push("candle");
            }
            if !structure_ok {
                missing.push("IDM/MSS");
            }
            return Err(format!(
                "{} {} in {} | need {}",
                side,
                setup,
                bias,
                missing.join(",")
            ));
        }

        let stop_loss = match (side, block) {
            (Side::Buy, Some(z)) => z.bottom - s.atr * self.config.sl_buffer_atr,
            (Side::Sell, Some(z)) => z.top + s.atr * self.config.sl_buffer_atr,
            (Side::Buy, None) => s.price - s.atr * self.config.fallback_sl_atr,
            (Side::Sell, None) => s.price + s.atr * self.config.fallback_sl_atr,
        };
        let risk = (s.price - stop_loss).abs();
        let take_profit = self
            .liquidity_target(side, s)
            .unwrap_or(s.price + side.sign() * risk * self.risk_reward_ratio);

        let why = match s.pattern {
            Some(p) if pattern_ok => p.to_string(),
            _ => "Golden setup".to_string(),
        };
        Ok((
            stop_loss,
            take_profit,
            format!("{} | SMC {} | {} | IDM/MSS sync", side, setup, why),
        ))
    }
}

impl Strategy for SmcConfluenceStrategy {
    fn name(&self) -> &'static str {
        "smc_confluence"
    }

    fn magic_offset(&self) -> u64 {
        100
    }

    fn min_history(&self) -> usize {
        self.min_history
    }

    fn evaluate(&self, ctx: &MarketContext) -> Decision {
        let (Some(candle), Some(row)) = (ctx.candle(), ctx.row()) else {
            return Decision::wait("No reference candle");
        };
        let (Some(ema_trend), Some(atr)) = (row.ema_trend, row.atr.filter(|a| *a > 0.0)) else {
            return Decision::wait("Indicators warming up");
        };
        if ctx.indicators.len() != ctx.candles.len() {
            return Decision::wait("Indicator frame out of sync with candles");
        }

        let last = ctx.closed_index;
        let price = candle.close;
        let atr_series: Vec<Option<f64>> = ctx.indicators.rows().iter().map(|r| r.atr).collect();

        let blocks = order_blocks(
            ctx.candles,
            &atr_series,
            last,
            self.config.ob_lookback,
            self.max_zone_points * ctx.point,
        );
        let gaps = fair_value_gaps(ctx.candles, &atr_series, last, self.config.fvg_lookback);
        let swings = swing_points(ctx.candles, last);
        let mss = market_structure_shift(ctx.candles, &swings, last);

        let trend = match mss {
            Some(MarketStructureShift::Bullish) => TrendDirection::Up,
            Some(MarketStructureShift::Bearish) => TrendDirection::Down,
            None if price > ema_trend => TrendDirection::Up,
            None => TrendDirection::Down,
        };
        let sweep = inducement_sweep(ctx.candles, &swings, last, trend);
        let range = swing_range(ctx.candles, last, self.config.range_lookback)
            .filter(|(high, low)| high > low);
        let fib = range.map(|(high, low)| FibonacciLevels::new(high, low, trend));

        let structure = Structure {
            price,
            atr,
            trend,
            blocks,
            gaps,
            swings,
            mss,
            sweep,
            range,
            fib,
            pattern: candle_pattern(ctx.candles, last),
        };

        let mut aux = AuxData {
            price: Some(price),
            atr: Some(atr),
            rsi: row.rsi,
            pattern: structure.pattern,
            candle_time: Some(candle.datetime),
            ..AuxData::default()
        };

        let mut notes = Vec::new();
        for side in [Side::Buy, Side::Sell] {
            match self.evaluate_side(side, &structure) {
                Ok((stop_loss, take_profit, reason)) => {
                    aux.stop_loss = Some(stop_loss);
                    aux.take_profit = Some(take_profit);
                    return Decision::entry(side, reason).with_aux(aux);
                }
                Err(note) if !note.is_empty() => notes.push(note),
                Err(_) => {}
            }
        }

        let zone = if structure.in_discount() {
            "DISC"
        } else if structure.in_premium() {
            "PREM"
        } else {
            "MID"
        };
        let mss_label = match structure.mss {
            Some(MarketStructureShift::Bullish) => "BULL",
            Some(MarketStructureShift::Bearish) => "BEAR",
            None => "none",
        };
        let mut reason = format!(
            "SMC | {} | IDM:{} | MSS:{}",
            zone,
            if structure.sweep { "yes" } else { "no" },
            mss_label
        );
        if !notes.is_empty() {
            reason = format!("{} | {}", reason, notes.join(" ; "));
        }
        Decision::wait(reason).with_aux(aux)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndicatorConfig;
    use crate::indicators::{IndicatorFrame, IndicatorRow};
    use crate::multi_timeframe::HtfTrend;
    use crate::{Candle, Signal};
    use chrono::{Duration, TimeZone, Utc};

    fn bars(ohlc: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2025, 5, 5, 8, 0, 0).unwrap();
        ohlc.iter()
            .enumerate()
            .map(|(i, &(o, h, l, c))| {
                Candle::new_unchecked(start + Duration::minutes(5 * i as i64), o, h, l, c, 1.0)
            })
            .collect()
    }

    /// Range top at 2020, bullish order block 2003.5-2006.5 formed at bar 6,
    /// swing low 2006.0 at bar 10, then a bullish pinbar sweeping it.
    fn retest_series(reference: (f64, f64, f64, f64)) -> Vec<Candle> {
        let base = (2010.0, 2010.5, 2009.5, 2010.2);
        bars(&[
            base,
            base,
            (2010.0, 2020.0, 2009.5, 2010.2),
            base,
            base,
            base,
            (2006.0, 2006.5, 2003.5, 2004.0),
            (2004.0, 2009.5, 2003.8, 2009.0),
            (2009.0, 2010.0, 2008.5, 2009.5),
            (2009.5, 2009.8, 2007.5, 2008.0),
            (2008.0, 2008.2, 2006.0, 2007.0),
            (2007.0, 2008.5, 2006.6, 2007.8),
            (2007.8, 2008.0, 2006.5, 2007.0),
            reference,
            (2007.2, 2007.6, 2007.0, 2007.4),
        ])
    }

    fn frame(len: usize) -> IndicatorFrame {
        IndicatorFrame::from_rows(vec![
            IndicatorRow {
                ema_trend: Some(1990.0),
                atr: Some(2.0),
                rsi: Some(45.0),
                ..IndicatorRow::default()
            };
            len
        ])
    }

    fn strategy() -> SmcConfluenceStrategy {
        let mut effective = EffectiveConfig::default();
        effective.indicators = IndicatorConfig {
            ema_trend_period: 5,
            atr_period: 3,
            ..IndicatorConfig::default()
        };
        SmcConfluenceStrategy::new(SmcConfluenceConfig::default(), &effective)
    }

    fn analyze(candles: &[Candle]) -> Decision {
        let frame = frame(candles.len());
        let session = crate::config::SessionConfig::default();
        let ctx = MarketContext {
            candles,
            indicators: &frame,
            closed_index: candles.len() - 2,
            htf_trend: HtfTrend::Disabled,
            position_open: false,
            now: Utc.with_ymd_and_hms(2025, 5, 5, 10, 0, 0).unwrap(),
            news_blackout: None,
            session: &session,
            point: 0.01,
        };
        strategy().analyze(&ctx)
    }

    #[test]
    fn test_buy_on_order_block_retest_with_sweep() {
        let candles = retest_series((2006.8, 2007.3, 2005.5, 2007.2));
        let decision = analyze(&candles);

        assert_eq!(decision.signal, Signal::Buy, "{}", decision.reason);
        assert_eq!(decision.aux.pattern, Some(CandlePattern::BullishPinbar));
        assert!((decision.aux.stop_loss.unwrap() - 2002.5).abs() < 1e-9);
        // Nearest swing high above price
        assert!((decision.aux.take_profit.unwrap() - 2010.0).abs() < 1e-9);
    }

    #[test]
    fn test_wait_without_structure_confirmation() {
        // Low stays above the last swing low: no sweep, no shift
        let candles = retest_series((2006.8, 2007.3, 2006.2, 2007.2));
        let decision = analyze(&candles);
        assert_eq!(decision.signal, Signal::Wait);
        assert!(decision.reason.contains("IDM/MSS"), "{}", decision.reason);
    }
}
