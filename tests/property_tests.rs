//! Property tests for engine invariants.
//!
//! 1. RSI stays inside [0, 100]
//! 2. Protection only ever tightens the stop, and never past the exit price
//! 3. The partial take-profit fires at most once per ticket
//! 4. Position sizes respect lot limits and the volume step

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use xauusd_strategies::config::{ProtectionConfig, RiskConfig};
use xauusd_strategies::indicators::rsi;
use xauusd_strategies::orders::OrderIntent;
use xauusd_strategies::protection::ProtectionEngine;
use xauusd_strategies::risk::RiskSizer;
use xauusd_strategies::session::SessionState;
use xauusd_strategies::{Position, Side, Symbol, SymbolSpec, Tick};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_closes() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1500.0..2500.0_f64, 1..200)
}

/// Price increments in cents, kept on the 0.01 grid
fn arb_path() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec((-300i32..=300).prop_map(|c| f64::from(c) / 100.0), 1..60)
}

fn arb_side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Buy), Just(Side::Sell)]
}

fn position(side: Side) -> Position {
    let sign = side.sign();
    Position {
        ticket: 1,
        symbol: Symbol::new("XAUUSD"),
        side,
        volume: dec!(0.10),
        entry_price: 2000.0,
        stop_loss: Some(2000.0 - sign * 5.0),
        take_profit: Some(2000.0 + sign * 12.5),
        open_time: Utc.with_ymd_and_hms(2025, 1, 6, 8, 0, 0).unwrap(),
        magic: 888888,
    }
}

/// Walk `path` from the entry price, applying every plan to the position.
/// Returns (exit price, stop before, stop after, partial closes this step).
fn walk(side: Side, path: &[f64]) -> Vec<(f64, Option<f64>, Option<f64>, usize)> {
    let engine = ProtectionEngine::new(ProtectionConfig::default(), 650.0);
    let spec = SymbolSpec::default();
    let mut state = SessionState::new();
    let mut pos = position(side);
    let mut mid = 2000.0;
    let mut steps = Vec::new();

    for (i, delta) in path.iter().enumerate() {
        mid = ((mid + delta) * 100.0_f64).round() / 100.0;
        let tick = Tick {
            bid: mid,
            ask: mid + 0.2,
            time: pos.open_time + Duration::minutes(i as i64 + 1),
        };
        let before = pos.stop_loss;
        let plan = engine.evaluate(&pos, &tick, &spec, None, &mut state);
        let mut partials = 0;
        for intent in &plan.intents {
            match intent {
                OrderIntent::PartialClose { volume, .. } => {
                    pos.volume -= *volume;
                    partials += 1;
                }
                OrderIntent::ModifyStops {
                    stop_loss,
                    take_profit,
                    ..
                } => {
                    pos.stop_loss = *stop_loss;
                    pos.take_profit = *take_profit;
                }
                _ => {}
            }
        }
        steps.push((tick.exit_price(side), before, pos.stop_loss, partials));
    }
    steps
}

// ── 1. Indicator bounds ──────────────────────────────────────────────

proptest! {
    #[test]
    fn rsi_is_bounded(closes in arb_closes(), period in 2usize..30) {
        for value in rsi(&closes, period).into_iter().flatten() {
            prop_assert!((0.0..=100.0).contains(&value), "rsi {}", value);
        }
    }
}

// ── 2. Stop ratchet ──────────────────────────────────────────────────

proptest! {
    /// Stops may only tighten and always stay on the losing side of the
    /// price they were set against
    #[test]
    fn stop_only_tightens(side in arb_side(), path in arb_path()) {
        let sign = side.sign();
        for (exit, before, after, _) in walk(side, &path) {
            let (before, after) = (before.unwrap(), after.unwrap());
            prop_assert!((after - before) * sign >= -1e-9, "stop loosened {} -> {}", before, after);
            if (after - before).abs() > 1e-9 {
                prop_assert!((exit - after) * sign > 0.0, "stop {} at or past exit {}", after, exit);
            }
        }
    }

    /// Half the volume is closed once at most, however long the path
    #[test]
    fn partial_fires_at_most_once(side in arb_side(), path in arb_path()) {
        let total: usize = walk(side, &path).iter().map(|s| s.3).sum();
        prop_assert!(total <= 1);
    }
}

// ── 3. Sizing ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn size_respects_lot_limits(balance in 0.0..1_000_000.0_f64, stop_points in 0.0..5000.0_f64) {
        let spec = SymbolSpec::default();
        let sizer = RiskSizer::new(RiskConfig::default());
        let volume = sizer.size(balance, stop_points, &spec);
        prop_assert!(volume >= spec.volume_min);
        prop_assert!(volume <= spec.volume_max);
        prop_assert_eq!((volume / spec.volume_step).fract(), Decimal::ZERO);
    }
}
