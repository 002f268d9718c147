//! MACD Trend Strategy
//!
//! BUY when:
//! 1. Close above the trend EMA
//! 2. MACD crossed above its signal within the lookback and is still above
//! 3. RSI inside the buy band
//! 4. ADX above threshold
//! 5. Higher timeframe is UP (or the filter is off)
//!
//! SELL mirrors every condition.

use crate::config::IndicatorConfig;
use crate::indicators::IndicatorRow;
use crate::strategies::{AuxData, Decision, MarketContext, Strategy};
use crate::Side;

use super::config::MacdTrendConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cross {
    Above,
    Below,
}

pub struct MacdTrendStrategy {
    config: MacdTrendConfig,
    min_history: usize,
}

impl MacdTrendStrategy {
    pub fn new(config: MacdTrendConfig, indicators: &IndicatorConfig) -> Self {
        let macd_warmup =
            indicators.macd_fast.max(indicators.macd_slow) + indicators.macd_signal + config.cross_lookback;
        let min_history = indicators
            .ema_trend_period
            .max(macd_warmup)
            .max(indicators.adx_period * 2);
        Self {
            config,
            min_history,
        }
    }

    /// Whether the MACD line crossed its signal in the given direction on any
    /// bar of the lookback window
    fn crossed(&self, ctx: &MarketContext, direction: Cross) -> bool {
        let rows = ctx.recent_rows(self.config.cross_lookback + 1);
        rows.windows(2).any(|pair| {
            let (Some((prev_line, prev_sig)), Some((line, sig))) =
                (macd_pair(&pair[0]), macd_pair(&pair[1]))
            else {
                return false;
            };
            match direction {
                Cross::Above => line > sig && prev_line <= prev_sig,
                Cross::Below => line < sig && prev_line >= prev_sig,
            }
        })
    }

    fn adx_ok(&self, adx: Option<f64>) -> bool {
        self.config.adx_threshold <= 0.0 || adx.is_some_and(|v| v > self.config.adx_threshold)
    }
}

fn macd_pair(row: &IndicatorRow) -> Option<(f64, f64)> {
    Some((row.macd_line?, row.macd_signal?))
}

fn mark(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "no"
    }
}

impl Strategy for MacdTrendStrategy {
    fn name(&self) -> &'static str {
        "macd_trend"
    }

    fn min_history(&self) -> usize {
        self.min_history
    }

    fn evaluate(&self, ctx: &MarketContext) -> Decision {
        let (Some(candle), Some(row)) = (ctx.candle(), ctx.row()) else {
            return Decision::wait("No reference candle");
        };
        let (Some(ema_trend), Some(rsi), Some((line, signal))) =
            (row.ema_trend, row.rsi, macd_pair(row))
        else {
            return Decision::wait("Indicators warming up");
        };

        let price = candle.close;
        let adx_ok = self.adx_ok(row.adx);
        let aux = AuxData {
            price: Some(price),
            atr: row.atr,
            rsi: Some(rsi),
            candle_time: Some(candle.datetime),
            ..AuxData::default()
        };

        let (side, cross, rsi_ok) = if price > ema_trend {
            let cross = line > signal && self.crossed(ctx, Cross::Above);
            let rsi_ok = rsi > self.config.rsi_buy_min && rsi < self.config.rsi_buy_max;
            (Side::Buy, cross, rsi_ok)
        } else if price < ema_trend {
            let cross = line < signal && self.crossed(ctx, Cross::Below);
            let rsi_ok = rsi > self.config.rsi_sell_min && rsi < self.config.rsi_sell_max;
            (Side::Sell, cross, rsi_ok)
        } else {
            return Decision::wait("RANGE | price on EMA").with_aux(aux);
        };

        let htf_ok = ctx.htf_trend.allows(side, false);
        let trend = if side == Side::Buy { "UP" } else { "DOWN" };
        let status = format!(
            "{} | H1:{} ({}) MACD:{} RSI:{} ({:.1}) ADX:{}",
            trend,
            mark(htf_ok),
            ctx.htf_trend,
            mark(cross),
            mark(rsi_ok),
            rsi,
            mark(adx_ok)
        );

        if !adx_ok {
            return Decision::wait(format!("{} [ADX low]", status)).with_aux(aux);
        }
        if !htf_ok {
            return Decision::wait(format!("{} [H1 trend conflict]", status)).with_aux(aux);
        }
        if cross && rsi_ok {
            return Decision::entry(side, format!("{} [trend cross]", status)).with_aux(aux);
        }
        Decision::wait(status).with_aux(aux)
    }
}
