//! Paper-trading loop
//!
//! Replays a candle file through the full pipeline, one bar per poll, with
//! the same tick sequence a terminal-backed deployment runs.

use anyhow::{Context, Result};
use chrono::Utc;
use std::time::Duration;
use tokio::signal;
use tokio::time::interval;
use tracing::{error, info, warn};

use xauusd_strategies::broker::{Broker, LogNotifier, PaperBroker};
use xauusd_strategies::data;
use xauusd_strategies::news::{self, EconomicCalendar, NewsCalendar};
use xauusd_strategies::trader::Trader;
use xauusd_strategies::SymbolSpec;

pub struct RunArgs {
    pub config: String,
    pub strategy: Option<String>,
    pub candles: String,
    pub htf_candles: Option<String>,
    pub balance: f64,
    pub spread_points: f64,
    pub interval: Option<u64>,
    pub max_ticks: Option<usize>,
}

pub fn run(args: RunArgs) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;
    runtime.block_on(run_async(args))
}

async fn run_async(args: RunArgs) -> Result<()> {
    info!("Starting paper trading loop");

    let config = super::load_config(&args.config, args.strategy.as_deref())?;
    let candles = data::load_csv(&args.candles)?;
    if candles.is_empty() {
        anyhow::bail!("No candles in {}", args.candles);
    }

    let warmup = config.history_bars.min(candles.len());
    let mut broker = PaperBroker::new(
        config.symbol.clone(),
        SymbolSpec::default(),
        config.timeframe_minutes,
        candles,
        args.balance,
        args.spread_points,
        warmup,
    );
    if let Some(path) = &args.htf_candles {
        broker = broker.with_htf_candles(data::load_csv(path)?);
    }

    let poll_secs = args
        .interval
        .unwrap_or_else(|| config.execution.poll_interval(config.realtime_candle));
    let news_enabled = config.news.enabled;
    let mut calendar = EconomicCalendar::new(&config.news)?;

    let mut trader = Trader::new(config, broker, Box::new(LogNotifier))?;
    info!(
        "Strategy: {} | magic {} | poll every {}s",
        trader.strategy_name(),
        trader.magic(),
        poll_secs
    );

    let mut ticker = interval(Duration::from_secs(poll_secs.max(1)));
    let mut ticks = 0usize;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if news_enabled {
                    let now = trader.clock().unwrap_or_else(Utc::now);
                    news::refresh_quietly(&mut calendar, now).await;
                }
                let calendar_ref: Option<&dyn NewsCalendar> =
                    news_enabled.then_some(&calendar as &dyn NewsCalendar);

                match trader.run_tick(calendar_ref) {
                    Ok(report) => {
                        if let Some(opened) = &report.opened {
                            info!("Opened ticket #{} @ {:.2}", opened.ticket, opened.price);
                        }
                    }
                    Err(e) => error!("Tick failed: {}", e),
                }

                ticks += 1;
                if args.max_ticks.is_some_and(|max| ticks >= max) {
                    info!("Reached {} ticks", ticks);
                    break;
                }
                if !trader.broker_mut().step() {
                    info!("Candle file exhausted after {} ticks", ticks);
                    break;
                }
            }
            result = signal::ctrl_c() => {
                match result {
                    Ok(()) => warn!("Ctrl+C received - shutting down"),
                    Err(e) => error!("Failed to listen for shutdown signal: {}", e),
                }
                break;
            }
        }
    }

    let broker = trader.broker();
    info!(
        "Final balance {:.2} | open positions {}",
        broker.account_balance().unwrap_or(0.0),
        broker.positions().len()
    );
    Ok(())
}
