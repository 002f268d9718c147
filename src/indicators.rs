//! Technical indicators
//!
//! Moving averages are computed with the `ta` crate; RSI, ATR and ADX follow
//! the Wilder/rolling-mean definitions used by the trading terminal charts
//! and are implemented here directly.
//!
//! Every function returns a series of the same length as its input. Values
//! that do not yet have enough history are `None` and must never be used to
//! produce a signal.

use statrs::statistics::Statistics;
use ta::indicators::{ExponentialMovingAverage, SimpleMovingAverage};
use ta::Next;

use crate::config::IndicatorConfig;
use crate::Candle;

// =============================================================================
// Type Aliases for Complex Return Types
// =============================================================================

/// Type alias for band indicators (upper, middle, lower)
pub type BandOutput = (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>);

/// Type alias for two-line indicators (line1, line2)
pub type DualLineOutput = (Vec<Option<f64>>, Vec<Option<f64>>);

// =============================================================================
// Moving Averages
// =============================================================================

/// Calculate Simple Moving Average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![None; values.len()];
    }

    let mut indicator = match SimpleMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let sma_val = indicator.next(value);
            (i + 1 >= period).then_some(sma_val)
        })
        .collect()
}

/// EMA seeded with the first value, no warm-up masking.
///
/// `ta`'s EMA uses k = 2/(period+1) and starts from the first input, which
/// is the recursive form `ema[0] = x[0]; ema[t] = k*x[t] + (1-k)*ema[t-1]`.
fn ema_unmasked(values: &[f64], period: usize) -> Option<Vec<f64>> {
    let mut indicator = ExponentialMovingAverage::new(period).ok()?;
    Some(values.iter().map(|&v| indicator.next(v)).collect())
}

/// Calculate Exponential Moving Average
///
/// The first `period - 1` values are `None`.
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![None; values.len()];
    }

    match ema_unmasked(values, period) {
        Some(raw) => raw
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i + 1 >= period).then_some(v))
            .collect(),
        None => vec![None; values.len()],
    }
}

/// Exponential mean with smoothing factor 1/period, seeded with the first value.
///
/// This is Wilder's smoothing in its recursive form; used for RSI gains and
/// losses and for the directional movement components of ADX.
pub fn wilder_mean(values: &[f64], period: usize) -> Vec<f64> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let alpha = 1.0 / period as f64;
    let mut out = Vec::with_capacity(values.len());
    let mut acc = values[0];
    out.push(acc);
    for &v in &values[1..] {
        acc = alpha * v + (1.0 - alpha) * acc;
        out.push(acc);
    }
    out
}

// =============================================================================
// Momentum Indicators
// =============================================================================

/// Calculate RSI with Wilder smoothing
///
/// Defined from index `period` onwards. When the average loss is zero the
/// value is 100 (or 50 if there were no gains either); when the average gain
/// is zero the value is 0.
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![None; values.len()];
    }

    let mut gains = Vec::with_capacity(values.len());
    let mut losses = Vec::with_capacity(values.len());
    gains.push(0.0);
    losses.push(0.0);
    for w in values.windows(2) {
        let delta = w[1] - w[0];
        gains.push(delta.max(0.0));
        losses.push((-delta).max(0.0));
    }

    let avg_gain = wilder_mean(&gains, period);
    let avg_loss = wilder_mean(&losses, period);

    avg_gain
        .iter()
        .zip(avg_loss.iter())
        .enumerate()
        .map(|(i, (&g, &l))| {
            if i < period {
                return None;
            }
            let value = if l <= 0.0 {
                if g <= 0.0 {
                    50.0
                } else {
                    100.0
                }
            } else {
                let rs = g / l;
                100.0 - 100.0 / (1.0 + rs)
            };
            Some(value.clamp(0.0, 100.0))
        })
        .collect()
}

/// Calculate MACD line and signal line
///
/// The MACD line is defined once the slow EMA is; the signal line once
/// `signal_period - 1` further MACD values exist.
pub fn macd(
    values: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> DualLineOutput {
    let n = values.len();
    if n == 0 || fast_period == 0 || slow_period == 0 || signal_period == 0 {
        return (vec![None; n], vec![None; n]);
    }

    let (fast, slow) = match (
        ema_unmasked(values, fast_period),
        ema_unmasked(values, slow_period),
    ) {
        (Some(f), Some(s)) => (f, s),
        _ => return (vec![None; n], vec![None; n]),
    };

    let raw_macd: Vec<f64> = fast.iter().zip(slow.iter()).map(|(f, s)| f - s).collect();
    let raw_signal = match ema_unmasked(&raw_macd, signal_period) {
        Some(s) => s,
        None => return (vec![None; n], vec![None; n]),
    };

    let macd_warmup = fast_period.max(slow_period);
    let signal_warmup = macd_warmup + signal_period - 1;

    let macd_line = raw_macd
        .iter()
        .enumerate()
        .map(|(i, &v)| (i + 1 >= macd_warmup).then_some(v))
        .collect();
    let signal_line = raw_signal
        .iter()
        .enumerate()
        .map(|(i, &v)| (i + 1 >= signal_warmup).then_some(v))
        .collect();

    (macd_line, signal_line)
}

// =============================================================================
// Volatility Indicators
// =============================================================================

/// Calculate Bollinger Bands
///
/// Middle band is the simple moving average; the bands use the sample
/// standard deviation of the same window.
pub fn bollinger_bands(values: &[f64], period: usize, num_std: f64) -> BandOutput {
    let n = values.len();
    if n == 0 || period < 2 {
        return (vec![None; n], vec![None; n], vec![None; n]);
    }

    let middle = sma(values, period);
    let mut upper = Vec::with_capacity(n);
    let mut lower = Vec::with_capacity(n);

    for (i, mid) in middle.iter().enumerate() {
        match mid {
            Some(m) => {
                let std = values[i + 1 - period..=i].iter().std_dev();
                upper.push(Some(m + num_std * std));
                lower.push(Some(m - num_std * std));
            }
            None => {
                upper.push(None);
                lower.push(None);
            }
        }
    }

    (upper, middle, lower)
}

/// Calculate True Range
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(high.len());

    for i in 0..high.len() {
        let tr_value = if i == 0 {
            high[i] - low[i]
        } else {
            let hl = high[i] - low[i];
            let hc = (high[i] - close[i - 1]).abs();
            let lc = (low[i] - close[i - 1]).abs();
            hl.max(hc).max(lc)
        };
        tr.push(tr_value);
    }

    tr
}

/// Calculate Average True Range as the simple rolling mean of true range
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    if high.len() != low.len() || high.len() != close.len() {
        return vec![None; high.len()];
    }
    sma(&true_range(high, low, close), period)
}

// =============================================================================
// Trend Indicators
// =============================================================================

/// Calculate Directional Movement Index components
/// Returns (+DI, -DI)
pub fn dmi(high: &[f64], low: &[f64], close: &[f64], period: usize) -> DualLineOutput {
    let n = high.len();
    if n == 0 || period == 0 {
        return (vec![None; n], vec![None; n]);
    }

    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];

    for i in 1..n {
        let up_move = high[i] - high[i - 1];
        let down_move = low[i - 1] - low[i];

        if up_move > down_move && up_move > 0.0 {
            plus_dm[i] = up_move;
        }
        if down_move > up_move && down_move > 0.0 {
            minus_dm[i] = down_move;
        }
    }

    let smoothed_plus = wilder_mean(&plus_dm, period);
    let smoothed_minus = wilder_mean(&minus_dm, period);
    let atr_values = atr(high, low, close, period);

    let mut plus_di = Vec::with_capacity(n);
    let mut minus_di = Vec::with_capacity(n);

    for i in 0..n {
        match atr_values[i] {
            Some(atr_val) if atr_val > 0.0 => {
                plus_di.push(Some(100.0 * smoothed_plus[i] / atr_val));
                minus_di.push(Some(100.0 * smoothed_minus[i] / atr_val));
            }
            _ => {
                plus_di.push(None);
                minus_di.push(None);
            }
        }
    }

    (plus_di, minus_di)
}

/// Calculate Average Directional Index
///
/// DX is smoothed with Wilder's method starting from the first bar where the
/// directional indicators exist, so ADX needs `2 * period - 1` bars.
pub fn adx(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = high.len();
    if n == 0 || period == 0 {
        return vec![None; n];
    }

    let (plus_di, minus_di) = dmi(high, low, close, period);

    let mut result = vec![None; n];
    let first = match plus_di.iter().position(Option::is_some) {
        Some(idx) => idx,
        None => return result,
    };

    let dx: Vec<f64> = (first..n)
        .map(|i| match (plus_di[i], minus_di[i]) {
            (Some(p), Some(m)) if p + m > 0.0 => 100.0 * (p - m).abs() / (p + m),
            _ => 0.0,
        })
        .collect();

    let smoothed = wilder_mean(&dx, period);
    for (j, value) in smoothed.into_iter().enumerate() {
        if j + 1 >= period {
            result[first + j] = Some(value.clamp(0.0, 100.0));
        }
    }

    result
}

// =============================================================================
// Indicator Frame - per-candle derived values
// =============================================================================

/// Derived values attached to one candle
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IndicatorRow {
    pub ema_trend: Option<f64>,
    pub ema_exit: Option<f64>,
    pub rsi: Option<f64>,
    pub macd_line: Option<f64>,
    pub macd_signal: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_lower: Option<f64>,
    pub atr: Option<f64>,
    pub adx: Option<f64>,
}

/// Indicator values for a whole candle window, recomputed from scratch each poll
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorFrame {
    rows: Vec<IndicatorRow>,
}

impl IndicatorFrame {
    pub fn compute(candles: &[Candle], cfg: &IndicatorConfig) -> Self {
        let close: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let high: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let low: Vec<f64> = candles.iter().map(|c| c.low).collect();

        let ema_trend = ema(&close, cfg.ema_trend_period);
        let ema_exit = ema(&close, cfg.ema_exit_period);
        let rsi_values = rsi(&close, cfg.rsi_period);
        let (macd_line, macd_signal) =
            macd(&close, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal);
        let (bb_upper, bb_middle, bb_lower) =
            bollinger_bands(&close, cfg.bb_period, cfg.bb_std);
        let atr_values = atr(&high, &low, &close, cfg.atr_period);
        let adx_values = adx(&high, &low, &close, cfg.adx_period);

        let rows = (0..candles.len())
            .map(|i| IndicatorRow {
                ema_trend: ema_trend[i],
                ema_exit: ema_exit[i],
                rsi: rsi_values[i],
                macd_line: macd_line[i],
                macd_signal: macd_signal[i],
                bb_upper: bb_upper[i],
                bb_middle: bb_middle[i],
                bb_lower: bb_lower[i],
                atr: atr_values[i],
                adx: adx_values[i],
            })
            .collect();

        IndicatorFrame { rows }
    }

    /// Wrap precomputed rows (replayed or synthetic data)
    pub fn from_rows(rows: Vec<IndicatorRow>) -> Self {
        IndicatorFrame { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<&IndicatorRow> {
        self.rows.get(index)
    }

    pub fn rows(&self) -> &[IndicatorRow] {
        &self.rows
    }
}
