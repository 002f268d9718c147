//! Price-structure features
//!
//! Swing points, order blocks, fair value gaps, market-structure shifts,
//! inducement sweeps, single-candle reversal patterns and Fibonacci
//! retracements. Every function takes the index of the last candle it may
//! look at (`last_closed`) so the still-forming bar can never leak into a
//! confirmed structure.

use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Candle;

/// Swing points are only searched for in this many bars before `last_closed`
pub const SWING_SCAN_WINDOW: usize = 100;

/// Bars before the first valid order-block impulse candle
const MIN_ORDER_BLOCK_INDEX: usize = 5;

// =============================================================================
// Swing points (5-bar fractals)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwingKind {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub index: usize,
    pub price: f64,
    pub kind: SwingKind,
}

/// Detect 2-left/2-right fractal swing points.
///
/// A candidate at `i` is only reported once `i + 2 <= last_closed`, so its
/// right-hand neighbours are both closed. Results are ordered by index.
pub fn swing_points(candles: &[Candle], last_closed: usize) -> Vec<SwingPoint> {
    if candles.is_empty() || last_closed >= candles.len() || last_closed < 4 {
        return Vec::new();
    }

    let end = last_closed - 2;
    let start = 2.max((last_closed + 1).saturating_sub(SWING_SCAN_WINDOW));
    let mut swings = Vec::new();

    for i in start..=end {
        let neighbours = [i - 2, i - 1, i + 1, i + 2];
        let high = candles[i].high;
        if neighbours.iter().all(|&j| high > candles[j].high) {
            swings.push(SwingPoint {
                index: i,
                price: high,
                kind: SwingKind::High,
            });
        }
        let low = candles[i].low;
        if neighbours.iter().all(|&j| low < candles[j].low) {
            swings.push(SwingPoint {
                index: i,
                price: low,
                kind: SwingKind::Low,
            });
        }
    }

    swings
}

fn last_swing(swings: &[SwingPoint], kind: SwingKind) -> Option<&SwingPoint> {
    swings.iter().rev().find(|s| s.kind == kind)
}

// =============================================================================
// Zones: order blocks and fair value gaps
// =============================================================================

/// Price zone derived from a 2-3 candle impulse pattern
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub top: f64,
    pub bottom: f64,
    /// Index of the candle that created the zone
    pub index: usize,
}

impl Zone {
    pub fn mid(&self) -> f64 {
        (self.top + self.bottom) / 2.0
    }

    pub fn width(&self) -> f64 {
        self.top - self.bottom
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.bottom && price <= self.top
    }

    fn distance_to(&self, price: f64) -> f64 {
        if self.contains(price) {
            0.0
        } else {
            (price - self.top).abs().min((price - self.bottom).abs())
        }
    }
}

/// Nearest unmitigated order block on each side
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OrderBlocks {
    pub bullish: Option<Zone>,
    pub bearish: Option<Zone>,
}

/// Scan backwards from `last_closed` for order blocks.
///
/// An impulse candle (body > ATR) whose preceding candle has the opposite
/// colour marks a zone spanning that preceding candle. A zone is dropped if
/// it is wider than `max_width` (price units), if any later closed candle
/// traded through its midpoint, or if the reference close has already left
/// it on the wrong side. Of the survivors, the one nearest to the reference
/// close is kept; ties go to the more recent zone.
pub fn order_blocks(
    candles: &[Candle],
    atr: &[Option<f64>],
    last_closed: usize,
    lookback: usize,
    max_width: f64,
) -> OrderBlocks {
    if candles.is_empty() || last_closed >= candles.len() || atr.len() != candles.len() {
        return OrderBlocks::default();
    }

    let reference = candles[last_closed].close;
    let lowest = (last_closed + 2).saturating_sub(lookback);
    let mut bullish: Option<Zone> = None;
    let mut bearish: Option<Zone> = None;

    for i in (lowest.max(1)..=last_closed).rev() {
        if i < MIN_ORDER_BLOCK_INDEX {
            break;
        }
        let Some(atr_val) = atr[i] else { continue };

        let curr = &candles[i];
        let prev = &candles[i - 1];
        if curr.body() <= atr_val {
            continue;
        }

        let zone = Zone {
            top: prev.high,
            bottom: prev.low,
            index: i - 1,
        };
        if zone.width() > max_width {
            continue;
        }
        let after = &candles[i + 1..=last_closed];

        if curr.is_bullish() && prev.is_bearish() {
            let mitigated = after.iter().any(|c| c.low < zone.mid());
            if !mitigated && reference > zone.bottom {
                bullish = Some(nearer(bullish, zone, reference));
            }
        } else if curr.is_bearish() && prev.is_bullish() {
            let mitigated = after.iter().any(|c| c.high > zone.mid());
            if !mitigated && reference < zone.top {
                bearish = Some(nearer(bearish, zone, reference));
            }
        }
    }

    OrderBlocks { bullish, bearish }
}

fn nearer(current: Option<Zone>, candidate: Zone, price: f64) -> Zone {
    match current {
        // Scanning runs newest first, so strict comparison keeps the newer zone on ties
        Some(existing) if existing.distance_to(price) <= candidate.distance_to(price) => existing,
        _ => candidate,
    }
}

/// Fair value gaps found in the lookback window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FairValueGaps {
    pub bullish: Vec<Zone>,
    pub bearish: Vec<Zone>,
}

/// Collect 3-candle imbalances whose third candle lies within `lookback`
/// bars of `last_closed`, newest first.
///
/// Bullish: candle1.high < candle3.low with a bullish candle2 body above
/// half an ATR. Bearish mirrors it.
pub fn fair_value_gaps(
    candles: &[Candle],
    atr: &[Option<f64>],
    last_closed: usize,
    lookback: usize,
) -> FairValueGaps {
    let mut gaps = FairValueGaps::default();
    if candles.is_empty() || last_closed >= candles.len() || atr.len() != candles.len() {
        return gaps;
    }

    let lowest = (last_closed + 2).saturating_sub(lookback).max(2);
    for i in (lowest..=last_closed).rev() {
        let Some(atr_val) = atr[i] else { continue };
        let (c1, c2, c3) = (&candles[i - 2], &candles[i - 1], &candles[i]);
        let strong_body = c2.body() > atr_val * 0.5;

        if c1.high < c3.low && c2.is_bullish() && strong_body {
            gaps.bullish.push(Zone {
                top: c3.low,
                bottom: c1.high,
                index: i - 1,
            });
        }
        if c1.low > c3.high && c2.is_bearish() && strong_body {
            gaps.bearish.push(Zone {
                top: c1.low,
                bottom: c3.high,
                index: i - 1,
            });
        }
    }

    gaps
}

// =============================================================================
// Market structure
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketStructureShift {
    Bullish,
    Bearish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Up,
    Down,
}

/// Close of the reference candle beyond the latest opposite swing.
///
/// If both a bullish and a bearish break hold (the close sits above the last
/// swing high and below the last swing low at once), the break of the more
/// recently formed swing wins; on equal indices the bullish break wins.
pub fn market_structure_shift(
    candles: &[Candle],
    swings: &[SwingPoint],
    last_closed: usize,
) -> Option<MarketStructureShift> {
    let close = candles.get(last_closed)?.close;

    let bull = last_swing(swings, SwingKind::High).filter(|s| close > s.price);
    let bear = last_swing(swings, SwingKind::Low).filter(|s| close < s.price);

    match (bull, bear) {
        (Some(high), Some(low)) => {
            let winner = if low.index > high.index {
                MarketStructureShift::Bearish
            } else {
                MarketStructureShift::Bullish
            };
            debug!(
                swing_high = high.price,
                swing_low = low.price,
                close,
                ?winner,
                "Ambiguous structure shift resolved by swing recency"
            );
            Some(winner)
        }
        (Some(_), None) => Some(MarketStructureShift::Bullish),
        (None, Some(_)) => Some(MarketStructureShift::Bearish),
        (None, None) => None,
    }
}

/// True when the reference candle swept the latest counter-trend swing:
/// the last swing low in an uptrend, the last swing high in a downtrend.
pub fn inducement_sweep(
    candles: &[Candle],
    swings: &[SwingPoint],
    last_closed: usize,
    trend: TrendDirection,
) -> bool {
    let Some(candle) = candles.get(last_closed) else {
        return false;
    };
    match trend {
        TrendDirection::Up => {
            last_swing(swings, SwingKind::Low).is_some_and(|s| candle.low < s.price)
        }
        TrendDirection::Down => {
            last_swing(swings, SwingKind::High).is_some_and(|s| candle.high > s.price)
        }
    }
}

// =============================================================================
// Candlestick patterns
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandlePattern {
    BullishEngulfing,
    BearishEngulfing,
    BullishPinbar,
    BearishPinbar,
}

impl CandlePattern {
    pub fn is_bullish(self) -> bool {
        matches!(
            self,
            CandlePattern::BullishEngulfing | CandlePattern::BullishPinbar
        )
    }

    pub fn is_bearish(self) -> bool {
        !self.is_bullish()
    }
}

impl std::fmt::Display for CandlePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CandlePattern::BullishEngulfing => "BULLISH_ENGULFING",
            CandlePattern::BearishEngulfing => "BEARISH_ENGULFING",
            CandlePattern::BullishPinbar => "BULLISH_PINBAR",
            CandlePattern::BearishPinbar => "BEARISH_PINBAR",
        };
        write!(f, "{}", s)
    }
}

/// Wick share of the total range that makes a pinbar
const PINBAR_WICK_RATIO: f64 = 0.6;

/// Classify the candle at `index` against its predecessor.
/// Engulfing takes precedence over pinbar.
pub fn candle_pattern(candles: &[Candle], index: usize) -> Option<CandlePattern> {
    if index == 0 {
        return None;
    }
    let curr = candles.get(index)?;
    let prev = &candles[index - 1];

    if prev.is_bearish() && curr.is_bullish() && curr.close > prev.open && curr.open < prev.close
    {
        return Some(CandlePattern::BullishEngulfing);
    }
    if prev.is_bullish() && curr.is_bearish() && curr.close < prev.open && curr.open > prev.close
    {
        return Some(CandlePattern::BearishEngulfing);
    }

    let range = curr.range();
    if range <= 0.0 {
        return None;
    }
    if curr.lower_wick() >= range * PINBAR_WICK_RATIO {
        return Some(CandlePattern::BullishPinbar);
    }
    if curr.upper_wick() >= range * PINBAR_WICK_RATIO {
        return Some(CandlePattern::BearishPinbar);
    }
    None
}

// =============================================================================
// Ranges and Fibonacci
// =============================================================================

/// Highest high and lowest low of the `lookback` candles ending at `last_closed`
pub fn swing_range(candles: &[Candle], last_closed: usize, lookback: usize) -> Option<(f64, f64)> {
    if last_closed >= candles.len() || lookback == 0 {
        return None;
    }
    let start = (last_closed + 1).saturating_sub(lookback);
    let window = &candles[start..=last_closed];
    let high = window.iter().map(|c| OrderedFloat(c.high)).max()?;
    let low = window.iter().map(|c| OrderedFloat(c.low)).min()?;
    Some((high.into_inner(), low.into_inner()))
}

/// Highest high or lowest low of the `lookback` candles ending at `last_closed`
pub fn swing_extreme(
    candles: &[Candle],
    last_closed: usize,
    lookback: usize,
    kind: SwingKind,
) -> Option<f64> {
    let (high, low) = swing_range(candles, last_closed, lookback)?;
    Some(match kind {
        SwingKind::High => high,
        SwingKind::Low => low,
    })
}

pub const FIB_RATIOS: [f64; 7] = [0.0, 0.236, 0.382, 0.5, 0.618, 0.786, 1.0];

/// Retracement levels anchored so that 0% is the trend-start extreme of the
/// retracement: the high in an uptrend, the low in a downtrend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FibonacciLevels {
    levels: [f64; 7],
}

impl FibonacciLevels {
    pub fn new(high: f64, low: f64, trend: TrendDirection) -> Self {
        let diff = high - low;
        let mut levels = [0.0; 7];
        for (slot, ratio) in levels.iter_mut().zip(FIB_RATIOS) {
            *slot = match trend {
                TrendDirection::Up => high - diff * ratio,
                TrendDirection::Down => low + diff * ratio,
            };
        }
        FibonacciLevels { levels }
    }

    /// Price at one of [`FIB_RATIOS`]
    pub fn level(&self, ratio: f64) -> Option<f64> {
        FIB_RATIOS
            .iter()
            .position(|r| (r - ratio).abs() < 1e-9)
            .map(|i| self.levels[i])
    }

    /// Band between the 61.8% and 78.6% levels, as (low, high)
    pub fn golden_zone(&self) -> (f64, f64) {
        let (a, b) = (self.levels[4], self.levels[5]);
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

/// Swing highs above `price` and swing lows below it, nearest first
pub fn liquidity_targets(swings: &[SwingPoint], price: f64) -> (Vec<f64>, Vec<f64>) {
    let highs = swings
        .iter()
        .filter(|s| s.kind == SwingKind::High && s.price > price)
        .map(|s| s.price)
        .sorted_by_key(|p| OrderedFloat(*p))
        .collect();
    let lows = swings
        .iter()
        .filter(|s| s.kind == SwingKind::Low && s.price < price)
        .map(|s| s.price)
        .sorted_by_key(|p| std::cmp::Reverse(OrderedFloat(*p)))
        .collect();
    (highs, lows)
}
