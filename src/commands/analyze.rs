//! Analyze command implementation
//!
//! Runs the indicator pipeline and the configured strategy over a candle
//! file without placing anything, printing the decision for the last bar or
//! for every bar.

use anyhow::Result;
use chrono::Duration;
use std::collections::BTreeMap;
use tracing::info;

use xauusd_strategies::data;
use xauusd_strategies::indicators::IndicatorFrame;
use xauusd_strategies::multi_timeframe::HtfTrend;
use xauusd_strategies::strategies::{create_strategy, MarketContext};
use xauusd_strategies::{Candle, EffectiveConfig, Signal};

pub fn run(
    config_path: String,
    strategy_override: Option<String>,
    candles_path: String,
    htf_path: Option<String>,
    all: bool,
) -> Result<()> {
    let config = super::load_config(&config_path, strategy_override.as_deref())?;
    let candles = data::load_csv(&candles_path)?;
    let htf_candles = match &htf_path {
        Some(path) => data::load_csv(path)?,
        None => data::resample(&candles, config.mtf.timeframe_minutes),
    };

    let strategy = create_strategy(&config)?;
    let frame = IndicatorFrame::compute(&candles, &config.indicators);
    info!(
        "Analyzing {} candles with {} (min history {})",
        candles.len(),
        strategy.name(),
        strategy.min_history()
    );

    let indices: Vec<usize> = if all {
        (0..candles.len()).collect()
    } else {
        candles.len().checked_sub(1).into_iter().collect()
    };

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for index in indices {
        let now = bar_close_time(&config, &candles[index]);
        let htf_trend = HtfTrend::from_candles(
            &htf_before(&htf_candles, &config, now),
            &config.mtf,
        );
        let ctx = MarketContext {
            candles: &candles[..=index],
            indicators: &frame,
            closed_index: index,
            htf_trend,
            position_open: false,
            now,
            news_blackout: None,
            session: &config.session,
            point: 0.01,
        };
        let decision = strategy.analyze(&ctx);
        *counts.entry(decision.signal.to_string()).or_default() += 1;

        if !all || matches!(decision.signal, Signal::Buy | Signal::Sell) {
            println!(
                "{} | {:<5} | {}",
                candles[index].datetime.format("%Y-%m-%d %H:%M"),
                decision.signal,
                decision.reason
            );
        }
    }

    if all {
        println!("\n{}", "=".repeat(60));
        println!("SIGNAL SUMMARY ({})", strategy.name());
        println!("{}", "=".repeat(60));
        for (signal, count) in &counts {
            println!("{:<8} {}", signal, count);
        }
        println!("{}", "=".repeat(60));
    }

    Ok(())
}

fn bar_close_time(config: &EffectiveConfig, candle: &Candle) -> chrono::DateTime<chrono::Utc> {
    candle.datetime + Duration::minutes(i64::from(config.timeframe_minutes)) - Duration::seconds(1)
}

/// Higher-timeframe bars that had opened by `now`
fn htf_before(
    htf: &[Candle],
    config: &EffectiveConfig,
    now: chrono::DateTime<chrono::Utc>,
) -> Vec<Candle> {
    let visible: Vec<Candle> = htf.iter().take_while(|c| c.datetime <= now).cloned().collect();
    let start = visible.len().saturating_sub(config.history_bars);
    visible[start..].to_vec()
}
