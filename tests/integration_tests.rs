//! Integration tests for the xauusd-strategies engine
//!
//! These tests drive the public API end to end: candle series through the
//! indicator pipeline and strategies, entry planning and execution against
//! the paper broker, and the protection engine over a price path.

use approx::assert_relative_eq;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal_macros::dec;
use serde_json::json;

use xauusd_strategies::broker::{Broker, LogNotifier, PaperBroker};
use xauusd_strategies::config::{EffectiveConfig, ProtectionConfig};
use xauusd_strategies::indicators::IndicatorFrame;
use xauusd_strategies::multi_timeframe::HtfTrend;
use xauusd_strategies::orders::OrderIntent;
use xauusd_strategies::protection::ProtectionEngine;
use xauusd_strategies::session::SessionState;
use xauusd_strategies::strategies::{
    available_strategies, closed_index, create_strategy, MarketContext,
};
use xauusd_strategies::structure::{order_blocks, swing_points, SwingKind};
use xauusd_strategies::trader::Trader;
use xauusd_strategies::{Candle, Position, Side, Signal, Strategy, Symbol, SymbolSpec, Tick};

// =============================================================================
// Test Utilities
// =============================================================================

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap()
}

/// M15 candles following `closes`, each opening at the previous close
fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
    let mut prev = closes.first().copied().unwrap_or(2000.0);
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = prev;
            prev = close;
            Candle::new(
                start_time() + Duration::minutes(15 * i as i64),
                open,
                open.max(close) + 0.2,
                open.min(close) - 0.2,
                close,
                100.0,
            )
            .unwrap()
        })
        .collect()
}

/// Steady uptrend, a six-bar flush into oversold, one recovery bar and a
/// forming bar
fn oversold_dip_in_uptrend() -> Vec<Candle> {
    let mut closes: Vec<f64> = (0..230).map(|i| 2000.0 + 0.5 * i as f64).collect();
    let mut last = *closes.last().unwrap();
    for _ in 0..6 {
        last -= 2.3;
        closes.push(last);
    }
    closes.push(last + 2.0);
    closes.push(last + 2.1);
    candles_from_closes(&closes)
}

/// Doji bars oscillating around 2000
fn flat_dojis(count: usize) -> Vec<Candle> {
    (0..count)
        .map(|i| {
            let close = if i % 2 == 0 { 2000.1 } else { 1999.9 };
            Candle::new(
                start_time() + Duration::minutes(15 * i as i64),
                close,
                close + 0.5,
                close - 0.5,
                close,
                100.0,
            )
            .unwrap()
        })
        .collect()
}

fn config_for(strategy: &str) -> EffectiveConfig {
    let mut config = EffectiveConfig::default();
    config.strategy = json!({ "name": strategy });
    config
}

fn paper_broker(candles: Vec<Candle>) -> PaperBroker {
    let warmup = candles.len();
    PaperBroker::new(
        Symbol::new("XAUUSD"),
        SymbolSpec::default(),
        15,
        candles,
        10_000.0,
        0.0,
        warmup,
    )
}

fn context<'a>(
    candles: &'a [Candle],
    frame: &'a IndicatorFrame,
    config: &'a EffectiveConfig,
) -> MarketContext<'a> {
    let closed = closed_index(candles.len(), false).unwrap();
    MarketContext {
        candles,
        indicators: frame,
        closed_index: closed,
        htf_trend: HtfTrend::Disabled,
        position_open: false,
        now: candles[closed].datetime + Duration::minutes(20),
        news_blackout: None,
        session: &config.session,
        point: 0.01,
    }
}

// =============================================================================
// Scenario A: RSI reversal entry, planned and filled
// =============================================================================

#[test]
fn test_rsi_reversal_buy_end_to_end() {
    let config = config_for("rsi_reversal");
    let mut trader =
        Trader::new(config, paper_broker(oversold_dip_in_uptrend()), Box::new(LogNotifier))
            .unwrap();

    let report = trader.run_tick(None).unwrap();
    assert_eq!(report.signal(), Some(Signal::Buy));
    let decision = report.decision.as_ref().unwrap();
    assert!(decision.reason.contains("RSI recovered above 30"));
    let rsi = decision.aux.rsi.unwrap();
    assert!(rsi > 30.0 && rsi < 45.0, "rsi {}", rsi);

    let opened = report.opened.expect("entry should be filled");
    assert_eq!(opened.volume, dec!(2));

    let positions = trader.broker().positions().to_vec();
    assert_eq!(positions.len(), 1);
    let pos = &positions[0];
    assert_eq!(pos.magic, 888888 + 200);
    let sl = pos.stop_loss.unwrap();
    let tp = pos.take_profit.unwrap();
    assert!(sl < pos.entry_price && pos.entry_price < tp);
    let risk = pos.entry_price - sl;
    assert!(risk >= 1.0 - 1e-9 && risk <= 10.0 + 1e-9);
    assert_relative_eq!(tp - pos.entry_price, risk * 2.5, epsilon = 0.02);
}

#[test]
fn test_one_entry_per_candle() {
    let config = config_for("rsi_reversal");
    let mut trader =
        Trader::new(config, paper_broker(oversold_dip_in_uptrend()), Box::new(LogNotifier))
            .unwrap();

    assert!(trader.run_tick(None).unwrap().opened.is_some());
    let again = trader.run_tick(None).unwrap();
    assert_eq!(again.signal(), Some(Signal::Wait));
    assert!(again.opened.is_none());
    assert_eq!(trader.broker().positions().len(), 1);
}

// =============================================================================
// Scenario B: protection over a rising price path
// =============================================================================

fn apply(position: &mut Position, intents: &[OrderIntent]) {
    for intent in intents {
        match intent {
            OrderIntent::PartialClose { volume, .. } => position.volume -= *volume,
            OrderIntent::ModifyStops {
                stop_loss,
                take_profit,
                ..
            } => {
                position.stop_loss = *stop_loss;
                position.take_profit = *take_profit;
            }
            other => panic!("unexpected intent {}", other),
        }
    }
}

#[test]
fn test_protection_sequence_on_rising_bid() {
    let engine = ProtectionEngine::new(ProtectionConfig::default(), 650.0);
    let spec = SymbolSpec::default();
    let mut state = SessionState::new();
    let mut position = Position {
        ticket: 7,
        symbol: Symbol::new("XAUUSD"),
        side: Side::Buy,
        volume: dec!(0.10),
        entry_price: 2000.0,
        stop_loss: Some(1995.0),
        take_profit: Some(2012.5),
        open_time: start_time(),
        magic: 888888,
    };

    let mut partials = Vec::new();
    let mut last_stop = 1995.0;
    for step in 0..=13 {
        let bid = 2000.0 + 0.5 * step as f64;
        let tick = Tick {
            bid,
            ask: bid + 0.2,
            time: start_time() + Duration::minutes(step),
        };
        let plan = engine.evaluate(&position, &tick, &spec, None, &mut state);
        if let Some(volume) = plan.partial_volume() {
            partials.push((bid, volume));
        }
        apply(&mut position, &plan.intents);

        let stop = position.stop_loss.unwrap();
        assert!(stop >= last_stop, "stop moved back at bid {}", bid);
        assert!(stop < bid || stop == last_stop);
        last_stop = stop;
    }

    // Half the position closes once, at 1R
    assert_eq!(partials, vec![(2005.0, dec!(0.05))]);
    assert_eq!(position.volume, dec!(0.05));
    // Trailing 150 points behind the final bid of 2006.5
    assert_relative_eq!(position.stop_loss.unwrap(), 2005.0, epsilon = 1e-9);
    assert_eq!(position.take_profit, Some(2012.5));
    assert!(state.is_partially_closed(7));
}

#[test]
fn test_protection_through_paper_broker() {
    // Entry bar, then a steady climb
    let mut closes = vec![2000.0; 3];
    closes.extend((1..=12).map(|i| 2000.0 + 0.5 * i as f64));
    let mut broker = PaperBroker::new(
        Symbol::new("XAUUSD"),
        SymbolSpec::default(),
        15,
        candles_from_closes(&closes),
        10_000.0,
        0.0,
        3,
    );
    let ticket = broker
        .execute(&OrderIntent::Open {
            side: Side::Buy,
            volume: dec!(0.10),
            price: 2000.0,
            stop_loss: 1995.0,
            take_profit: 2012.5,
            magic: 888888,
            comment: "test".to_string(),
        })
        .unwrap()
        .ticket;

    let engine = ProtectionEngine::new(ProtectionConfig::default(), 650.0);
    let mut state = SessionState::new();
    while broker.step() {
        let tick = broker.fetch_tick().unwrap();
        let spec = broker.symbol_spec().unwrap();
        let positions = broker.open_positions(&Symbol::new("XAUUSD"), 888888).unwrap();
        for pos in &positions {
            let plan = engine.evaluate(pos, &tick, &spec, None, &mut state);
            for intent in &plan.intents {
                broker.execute(intent).unwrap();
            }
        }
    }

    let pos = &broker.positions()[0];
    assert_eq!(pos.ticket, ticket);
    assert_eq!(pos.volume, dec!(0.05));
    assert!(pos.stop_loss.unwrap() > pos.entry_price);
    // The partial close booked 5.0 * 0.05 lots
    let realized = broker.daily_realized_pnl(tick_time(&broker)).unwrap();
    assert_relative_eq!(realized, 25.0, epsilon = 1e-6);
}

fn tick_time(broker: &PaperBroker) -> DateTime<Utc> {
    broker.fetch_tick().unwrap().time
}

// =============================================================================
// Scenario C: no conditions, no entries
// =============================================================================

#[test]
fn test_flat_market_waits_for_every_strategy() {
    let candles = flat_dojis(300);
    for name in available_strategies() {
        let config = config_for(name);
        let strategy = create_strategy(&config).unwrap();
        let frame = IndicatorFrame::compute(&candles, &config.indicators);
        let decision = strategy.analyze(&context(&candles, &frame, &config));
        assert_eq!(decision.signal, Signal::Wait, "{}: {}", name, decision.reason);
    }
}

#[test]
fn test_analysis_is_idempotent() {
    let candles = oversold_dip_in_uptrend();
    for name in available_strategies() {
        let config = config_for(name);
        let strategy = create_strategy(&config).unwrap();
        let frame = IndicatorFrame::compute(&candles, &config.indicators);
        let first = strategy.analyze(&context(&candles, &frame, &config));
        let second = strategy.analyze(&context(&candles, &frame, &config));
        assert_eq!(first, second, "{}", name);
    }
}

#[test]
fn test_outside_session_sleeps() {
    let candles = oversold_dip_in_uptrend();
    let mut config = config_for("rsi_reversal");
    config.session.start_hour = 8;
    config.session.end_hour = 9;
    let strategy = create_strategy(&config).unwrap();
    let frame = IndicatorFrame::compute(&candles, &config.indicators);
    let ctx = context(&candles, &frame, &config);
    assert!(!config.session.contains_hour(chrono::Timelike::hour(&ctx.now)));
    assert_eq!(strategy.analyze(&ctx).signal, Signal::Sleep);
}

// =============================================================================
// Structure invariants
// =============================================================================

#[test]
fn test_swings_ignore_future_candles() {
    let highs = [
        1.0, 2.0, 3.0, 2.5, 2.0, 2.2, 4.0, 3.0, 2.0, 2.5, 2.8, 5.0, 2.0, 1.5,
    ];
    let candles: Vec<Candle> = highs
        .iter()
        .enumerate()
        .map(|(i, &h)| {
            let base = 2000.0 + h;
            Candle::new(
                start_time() + Duration::minutes(15 * i as i64),
                base - 0.5,
                base,
                base - 1.0,
                base - 0.4,
                1.0,
            )
            .unwrap()
        })
        .collect();

    for last in 4..candles.len() {
        let truncated = swing_points(&candles[..=last], last);
        let full = swing_points(&candles, last);
        assert_eq!(truncated, full, "look-ahead at {}", last);
        assert!(full.iter().all(|s| s.index + 2 <= last));
    }

    // The peak at 6 is confirmed only once two later bars have closed
    let is_peak = |s: &xauusd_strategies::structure::SwingPoint| {
        s.index == 6 && s.kind == SwingKind::High
    };
    assert!(!swing_points(&candles, 7).iter().any(is_peak));
    assert!(swing_points(&candles, 8).iter().any(is_peak));
}

#[test]
fn test_mitigated_order_block_stays_mitigated() {
    let bar = |i: i64, o: f64, h: f64, l: f64, c: f64| {
        Candle::new(start_time() + Duration::minutes(15 * i), o, h, l, c, 1.0).unwrap()
    };
    let mut candles: Vec<Candle> = (0..6).map(|i| bar(i, 100.0, 100.5, 99.5, 100.2)).collect();
    candles.push(bar(6, 100.5, 100.8, 99.0, 99.2));
    candles.push(bar(7, 99.3, 103.5, 99.2, 103.3));
    candles.push(bar(8, 103.3, 104.0, 102.8, 103.8));
    let atr = vec![Some(1.0); candles.len()];
    assert!(order_blocks(&candles, &atr, 8, 50, 5.0).bullish.is_some());

    // Dip through the midpoint, then recover above the zone
    candles.push(bar(9, 103.8, 103.9, 99.7, 100.4));
    candles.push(bar(10, 100.4, 103.0, 100.3, 102.8));
    let atr = vec![Some(1.0); candles.len()];
    let later = order_blocks(&candles, &atr, 10, 50, 5.0);
    assert!(later.bullish.map_or(true, |zone| zone.index != 6));
}
