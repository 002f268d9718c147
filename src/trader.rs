//! Polling loop core
//!
//! One call to [`Trader::run_tick`] is one poll of the terminal:
//!
//! 1. Quote, symbol spec, own positions (by magic number)
//! 2. Candle history and the indicator pipeline
//! 3. Protection for every open position, one after another
//! 4. Daily guard, news blackout, higher-timeframe trend
//! 5. Strategy decision, entry guards, entry plan, execution
//!
//! Protection runs even when entries are halted. A failed data fetch is
//! counted and reported once when the streak reaches the alert threshold.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::broker::{Broker, ExecutionReport, Notifier};
use crate::config::EffectiveConfig;
use crate::error::{BrokerError, EngineError};
use crate::indicators::IndicatorFrame;
use crate::multi_timeframe::HtfTrend;
use crate::news::NewsCalendar;
use crate::orders::{EntryPlanner, OrderIntent};
use crate::protection::{ExitSnapshot, ProtectionEngine, ProtectionPlan};
use crate::risk::DailyGuard;
use crate::session::SessionState;
use crate::strategies::{
    closed_index, create_strategy, magic_number, Decision, MarketContext, Strategy,
};
use crate::{Position, Signal};

/// What happened during one poll
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub time: Option<DateTime<Utc>>,
    pub decision: Option<Decision>,
    /// Protection plans that were executed in full
    pub protections: Vec<ProtectionPlan>,
    pub opened: Option<ExecutionReport>,
    /// Why no entry was attempted despite the decision
    pub skipped: Option<String>,
}

impl TickReport {
    pub fn signal(&self) -> Option<Signal> {
        self.decision.as_ref().map(|d| d.signal)
    }
}

pub struct Trader<B: Broker> {
    config: EffectiveConfig,
    broker: B,
    strategy: Box<dyn Strategy>,
    protection: ProtectionEngine,
    planner: EntryPlanner,
    guard: DailyGuard,
    notifier: Box<dyn Notifier>,
    state: SessionState,
    magic: u64,
}

impl<B: Broker> Trader<B> {
    pub fn new(
        config: EffectiveConfig,
        broker: B,
        notifier: Box<dyn Notifier>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let strategy = create_strategy(&config)?;
        let magic = magic_number(&config, strategy.as_ref());
        info!(
            strategy = strategy.name(),
            magic,
            symbol = %config.symbol,
            timeframe = config.timeframe_minutes,
            "Trader initialized"
        );

        Ok(Trader {
            protection: ProtectionEngine::new(
                config.protection.clone(),
                config.targets.stop_loss_points,
            ),
            planner: EntryPlanner::new(
                config.targets.clone(),
                config.execution.clone(),
                config.risk.clone(),
            ),
            guard: DailyGuard::from_config(&config.risk),
            config,
            broker,
            strategy,
            notifier,
            state: SessionState::new(),
            magic,
        })
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn broker_mut(&mut self) -> &mut B {
        &mut self.broker
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn magic(&self) -> u64 {
        self.magic
    }

    /// Time of the broker's latest quote. During a replay this is the
    /// simulated clock, so calendar refreshes and blackout checks agree.
    pub fn clock(&self) -> Option<DateTime<Utc>> {
        match self.broker.fetch_tick() {
            Ok(tick) => Some(tick.time),
            Err(e) => {
                debug!(error = %e, "No quote for the loop clock");
                None
            }
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Run one poll. Errors are per-tick: the caller logs them and polls
    /// again after its interval.
    pub fn run_tick(
        &mut self,
        news: Option<&dyn NewsCalendar>,
    ) -> Result<TickReport, EngineError> {
        let tick = self.fetch(|b| b.fetch_tick(), "tick")?;
        let spec = self.fetch(|b| b.symbol_spec(), "symbol spec")?;
        let symbol = self.config.symbol.clone();
        let magic = self.magic;
        let positions = self.fetch(|b| b.open_positions(&symbol, magic), "positions")?;
        let tickets: Vec<u64> = positions.iter().map(|p| p.ticket).collect();
        self.state.retain_open(&tickets);

        let (tf, bars) = (self.config.timeframe_minutes, self.config.history_bars);
        let candles = self.fetch(|b| b.fetch_candles(tf, bars), "candles")?;
        let Some(closed) = closed_index(candles.len(), self.config.realtime_candle) else {
            return Err(self.data_failure(format!("only {} candles returned", candles.len())));
        };
        self.state.record_data_success();

        let frame = IndicatorFrame::compute(&candles, &self.config.indicators);
        let now = tick.time;
        let mut report = TickReport {
            time: Some(now),
            ..TickReport::default()
        };

        // Protection
        let snapshot = frame.row(closed).map(|row| ExitSnapshot {
            close: candles[closed].close,
            rsi: row.rsi,
            ema_exit: row.ema_exit,
        });
        let mut closed_tickets = Vec::new();
        for position in &positions {
            let plan = self.protection.evaluate(
                position,
                &tick,
                &spec,
                snapshot.as_ref(),
                &mut self.state,
            );
            if plan.is_empty() {
                continue;
            }
            if self.apply_protection(position, &plan) {
                if plan
                    .intents
                    .iter()
                    .any(|i| matches!(i, OrderIntent::Close { .. }))
                {
                    closed_tickets.push(position.ticket);
                }
                report.protections.push(plan);
            }
        }
        let position_open = positions
            .iter()
            .any(|p| !closed_tickets.contains(&p.ticket));

        // Entry filters
        let realized = self
            .broker
            .daily_realized_pnl(now)
            .map_err(|e| EngineError::DataUnavailable(format!("daily P/L: {}", e)))?;
        if let Some(reason) = self.guard.halt_reason(realized) {
            info!(realized, "{}", reason);
            report.skipped = Some(reason);
            return Ok(report);
        }

        let news_blackout = if self.config.news.enabled {
            news.and_then(|calendar| calendar.blackout(now, self.config.news.avoid_minutes))
        } else {
            None
        };

        let htf_trend = self.htf_trend();

        let ctx = MarketContext {
            candles: &candles,
            indicators: &frame,
            closed_index: closed,
            htf_trend,
            position_open,
            now,
            news_blackout,
            session: &self.config.session,
            point: spec.point,
        };
        let decision = self.strategy.analyze(&ctx);
        info!(
            strategy = self.strategy.name(),
            signal = %decision.signal,
            htf = %htf_trend,
            "{}",
            decision.reason
        );
        report.decision = Some(decision.clone());

        if !decision.is_entry() {
            return Ok(report);
        }

        // Entry guards
        let candle_time = candles[closed].datetime;
        if self.state.already_traded(candle_time) {
            let reason = format!(
                "Already traded candle {}",
                candle_time.format("%Y-%m-%d %H:%M")
            );
            debug!("{}", reason);
            report.skipped = Some(reason);
            return Ok(report);
        }
        if let Some(remaining) = self
            .state
            .cooldown_remaining(now, self.config.execution.error_cooldown_secs)
        {
            let reason = format!("Order error cooldown, {}s left", remaining);
            info!("{}", reason);
            report.skipped = Some(reason);
            return Ok(report);
        }

        let balance = self
            .broker
            .account_balance()
            .map_err(|e| EngineError::DataUnavailable(format!("balance: {}", e)))?;
        let plan = match self
            .planner
            .plan(&decision, &tick, &spec, &candles, closed, balance, magic)
        {
            Ok(plan) => plan,
            Err(skip) => {
                info!(signal = %decision.signal, "Entry skipped: {}", skip);
                report.skipped = Some(skip.to_string());
                return Ok(report);
            }
        };

        match self.broker.execute(&plan.intent) {
            Ok(execution) => {
                self.state.record_trade(candle_time);
                info!(
                    ticket = execution.ticket,
                    price = execution.price,
                    volume = %execution.volume,
                    stop_source = ?plan.stop_source,
                    risk_points = plan.risk_points,
                    "{}",
                    plan.intent
                );
                self.notifier.notify(&format!(
                    "{} {} | {} | #{}",
                    self.strategy.name(),
                    plan.intent,
                    decision.reason,
                    execution.ticket
                ));
                report.opened = Some(execution);
            }
            Err(e) => {
                self.state.record_order_error(now);
                error!(error = %e, "{} failed", plan.intent);
                self.notifier
                    .notify(&format!("ORDER FAILED | {} | {}", plan.intent, e));
                report.skipped = Some(e.to_string());
            }
        }

        Ok(report)
    }

    /// Execute every intent of a protection plan. Returns false if any was
    /// rejected; a rejected partial close releases its once-per-ticket mark.
    fn apply_protection(&mut self, position: &Position, plan: &ProtectionPlan) -> bool {
        for intent in &plan.intents {
            if let Err(e) = self.broker.execute(intent) {
                let ticket = intent.ticket().unwrap_or(position.ticket);
                let err = EngineError::ModificationRejected {
                    ticket,
                    reason: e.to_string(),
                };
                warn!(error = %err, "{} not applied", intent);
                if matches!(intent, OrderIntent::PartialClose { .. }) {
                    self.state.release_partial(ticket);
                }
                return false;
            }
        }
        for event in &plan.events {
            info!(ticket = position.ticket, "{}", event);
            self.notifier.notify(&event.to_string());
        }
        true
    }

    fn htf_trend(&self) -> HtfTrend {
        let mtf = &self.config.mtf;
        if !mtf.enabled {
            return HtfTrend::Disabled;
        }
        match self
            .broker
            .fetch_candles(mtf.timeframe_minutes, self.config.history_bars)
        {
            Ok(htf) => HtfTrend::from_candles(&htf, mtf),
            Err(e) => {
                warn!(error = %e, "Higher timeframe candles unavailable");
                HtfTrend::Unknown
            }
        }
    }

    fn fetch<T>(
        &mut self,
        call: impl FnOnce(&B) -> Result<T, BrokerError>,
        what: &str,
    ) -> Result<T, EngineError> {
        call(&self.broker).map_err(|e| self.data_failure(format!("{}: {}", what, e)))
    }

    fn data_failure(&mut self, detail: String) -> EngineError {
        let threshold = self.config.execution.data_failure_alert_threshold;
        if self.state.record_data_failure(threshold) {
            let failures = self.state.consecutive_data_failures();
            error!(failures, "Market data unavailable: {}", detail);
            self.notifier.notify(&format!(
                "DATA ALERT | {} consecutive failures | {}",
                failures, detail
            ));
        }
        EngineError::DataUnavailable(detail)
    }
}
