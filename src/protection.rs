//! Position protection engine
//!
//! Driven once per poll for every open position. Stages run in a fixed
//! order against a working copy of the stop and target:
//!
//! 1. Break-even: profit >= `trigger_pct` of the TP distance
//! 2. Profit lock: profit >= `trigger_pct` of the TP distance, stop to
//!    `lock_level` of it
//! 3. Partial take-profit: profit >= `rr` x risk, once per ticket, then
//!    forced break-even on the remainder
//! 4. Trailing stop: profit > trigger, stop follows price at a distance
//! 5. Dynamic take-profit: target pushed out when price gets close
//! 6. Rule exit: indicator invalidation closes the whole position and
//!    supersedes every other action
//!
//! A stop is only ever moved in the position's favour and never onto the
//! wrong side of the current price. All stop/target changes of one tick are
//! folded into a single modification request.

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::config::{ProtectionConfig, RiskBasis};
use crate::orders::OrderIntent;
use crate::risk::round_to_step;
use crate::session::SessionState;
use crate::{Position, Side, SymbolSpec, Tick};

/// Indicator values of the last closed candle, used by the rule exit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitSnapshot {
    pub close: f64,
    pub rsi: Option<f64>,
    pub ema_exit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProtectionEvent {
    BreakEven { ticket: u64, stop: f64 },
    ProfitLock { ticket: u64, stop: f64 },
    PartialClose { ticket: u64, volume: Decimal, price: f64 },
    Trailing { ticket: u64, stop: f64 },
    TakeProfitExtended { ticket: u64, from: f64, to: f64 },
    RuleExit { ticket: u64, reason: String },
}

impl std::fmt::Display for ProtectionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtectionEvent::BreakEven { ticket, stop } => {
                write!(f, "BREAK EVEN SET | ticket {} | SL {:.2}", ticket, stop)
            }
            ProtectionEvent::ProfitLock { ticket, stop } => {
                write!(f, "PROFIT LOCKED | ticket {} | SL {:.2}", ticket, stop)
            }
            ProtectionEvent::PartialClose {
                ticket,
                volume,
                price,
            } => write!(
                f,
                "PARTIAL TP | ticket {} | closed {} lots @ {:.2}",
                ticket, volume, price
            ),
            ProtectionEvent::Trailing { ticket, stop } => {
                write!(f, "TRAILING SL MOVED | ticket {} | SL {:.2}", ticket, stop)
            }
            ProtectionEvent::TakeProfitExtended { ticket, from, to } => write!(
                f,
                "TP EXTENDED | ticket {} | {:.2} -> {:.2}",
                ticket, from, to
            ),
            ProtectionEvent::RuleExit { ticket, reason } => {
                write!(f, "RULE EXIT | ticket {} | {}", ticket, reason)
            }
        }
    }
}

/// Actions proposed for one position in one tick
#[derive(Debug, Clone, PartialEq)]
pub struct ProtectionPlan {
    pub ticket: u64,
    pub intents: Vec<OrderIntent>,
    pub events: Vec<ProtectionEvent>,
}

impl ProtectionPlan {
    fn new(ticket: u64) -> Self {
        ProtectionPlan {
            ticket,
            intents: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    /// Stop requested by this plan, if it modifies one
    pub fn proposed_stop(&self) -> Option<f64> {
        self.intents.iter().find_map(|intent| match intent {
            OrderIntent::ModifyStops { stop_loss, .. } => *stop_loss,
            _ => None,
        })
    }

    /// Target requested by this plan, if it modifies one
    pub fn proposed_target(&self) -> Option<f64> {
        self.intents.iter().find_map(|intent| match intent {
            OrderIntent::ModifyStops { take_profit, .. } => *take_profit,
            _ => None,
        })
    }

    pub fn partial_volume(&self) -> Option<Decimal> {
        self.intents.iter().find_map(|intent| match intent {
            OrderIntent::PartialClose { volume, .. } => Some(*volume),
            _ => None,
        })
    }
}

/// Working copy of the levels being adjusted during one evaluation
struct Levels<'a> {
    side: Side,
    price: f64,
    spec: &'a SymbolSpec,
    stop: Option<f64>,
    target: Option<f64>,
}

impl Levels<'_> {
    /// Move the stop to `candidate` if it tightens risk by more than
    /// `min_step` and stays on the losing side of the current price.
    fn tighten(&mut self, candidate: f64, min_step: f64) -> bool {
        let candidate = self.spec.normalize_price(candidate);
        let sign = self.side.sign();
        if (self.price - candidate) * sign <= 0.0 {
            return false;
        }
        let improves = match self.stop {
            None => true,
            Some(current) => {
                let gain = (candidate - current) * sign;
                gain > 1e-9 && gain + 1e-9 >= min_step
            }
        };
        if improves {
            self.stop = Some(candidate);
        }
        improves
    }
}

#[derive(Debug, Clone)]
pub struct ProtectionEngine {
    config: ProtectionConfig,
    /// Stop distance assumed for positions without a stop, in points
    fallback_stop_points: f64,
}

impl ProtectionEngine {
    pub fn new(config: ProtectionConfig, fallback_stop_points: f64) -> Self {
        ProtectionEngine {
            config,
            fallback_stop_points,
        }
    }

    pub fn config(&self) -> &ProtectionConfig {
        &self.config
    }

    /// Evaluate every stage for `position` at the current quote
    pub fn evaluate(
        &self,
        position: &Position,
        tick: &Tick,
        spec: &SymbolSpec,
        snapshot: Option<&ExitSnapshot>,
        state: &mut SessionState,
    ) -> ProtectionPlan {
        let ticket = position.ticket;
        let side = position.side;
        let sign = side.sign();
        let point = spec.point;
        let price = tick.exit_price(side);
        let profit = position.profit_distance(price);
        let mut plan = ProtectionPlan::new(ticket);

        let current_risk = position.stop_distance();
        let original_risk = match current_risk {
            Some(risk) => state.record_initial_risk(ticket, risk),
            None => state
                .initial_risk(ticket)
                .unwrap_or(self.fallback_stop_points * point),
        };
        let target_distance = match position.target_distance().filter(|d| *d > 0.0) {
            Some(distance) => Some(state.record_initial_target(ticket, distance)),
            None => state.initial_target(ticket),
        };

        if let Some(reason) = self.rule_exit(side, snapshot) {
            info!(ticket, %side, reason = %reason, "Rule exit");
            plan.intents.push(OrderIntent::Close {
                ticket,
                side,
                volume: position.volume,
            });
            plan.events.push(ProtectionEvent::RuleExit { ticket, reason });
            return plan;
        }

        let mut levels = Levels {
            side,
            price,
            spec,
            stop: position.stop_loss,
            target: position.take_profit,
        };

        // 1. Break-even
        let be = &self.config.break_even;
        let be_stop = position.entry_price + sign * be.lock_points * point;
        if be.enabled {
            let trigger = match target_distance {
                Some(tp_dist) => tp_dist * be.trigger_pct,
                None => be.fallback_trigger_points * point,
            };
            if profit >= trigger && levels.tighten(be_stop, 0.0) {
                debug!(ticket, profit, trigger, stop = levels.stop, "Break-even triggered");
                plan.events.push(ProtectionEvent::BreakEven {
                    ticket,
                    stop: spec.normalize_price(be_stop),
                });
            }
        }

        // 2. Profit lock
        let lock = &self.config.profit_lock;
        if lock.enabled {
            if let Some(tp_dist) = target_distance {
                let lock_stop = position.entry_price + sign * tp_dist * lock.lock_level;
                if profit >= tp_dist * lock.trigger_pct && levels.tighten(lock_stop, 0.0) {
                    debug!(ticket, profit, stop = levels.stop, "Profit lock triggered");
                    plan.events.push(ProtectionEvent::ProfitLock {
                        ticket,
                        stop: spec.normalize_price(lock_stop),
                    });
                }
            }
        }

        // 3. Partial take-profit
        let partial = &self.config.partial_tp;
        if partial.enabled && !state.is_partially_closed(ticket) {
            let basis = match partial.basis {
                RiskBasis::OriginalRisk => original_risk,
                RiskBasis::CurrentRisk => current_risk.unwrap_or(original_risk),
            };
            let trigger = (basis * partial.rr).max(partial.min_trigger_points * point);

            if profit >= trigger {
                let ratio = Decimal::try_from(partial.ratio).unwrap_or(Decimal::ZERO);
                let close_volume = round_to_step(position.volume * ratio, spec.volume_step);
                let remaining = position.volume - close_volume;

                if close_volume >= spec.volume_min && remaining >= spec.volume_min {
                    state.mark_partially_closed(ticket);
                    info!(
                        ticket,
                        profit,
                        trigger,
                        volume = %close_volume,
                        "Partial take-profit"
                    );
                    plan.intents.push(OrderIntent::PartialClose {
                        ticket,
                        side,
                        volume: close_volume,
                    });
                    plan.events.push(ProtectionEvent::PartialClose {
                        ticket,
                        volume: close_volume,
                        price,
                    });
                    if levels.tighten(be_stop, 0.0) {
                        plan.events.push(ProtectionEvent::BreakEven {
                            ticket,
                            stop: spec.normalize_price(be_stop),
                        });
                    }
                } else {
                    debug!(
                        ticket,
                        volume = %position.volume,
                        close = %close_volume,
                        "Partial take-profit skipped, volume below minimum lot"
                    );
                }
            }
        }

        // 4. Trailing stop
        let trailing = &self.config.trailing;
        if trailing.enabled && profit > trailing.trigger_points * point {
            let candidate = price - sign * trailing.distance_points * point;
            if levels.tighten(candidate, trailing.step_points * point) {
                debug!(ticket, profit, stop = levels.stop, "Trailing stop moved");
                plan.events.push(ProtectionEvent::Trailing {
                    ticket,
                    stop: spec.normalize_price(candidate),
                });
            }
        }

        // 5. Dynamic take-profit
        let dynamic = &self.config.dynamic_tp;
        if dynamic.enabled {
            if let Some(tp) = levels.target {
                let distance = (tp - price) * sign;
                if distance > 0.0 && distance <= dynamic.trigger_points * point {
                    let extended =
                        spec.normalize_price(tp + sign * dynamic.extension_points * point);
                    levels.target = Some(extended);
                    debug!(ticket, from = tp, to = extended, "Take-profit extended");
                    plan.events.push(ProtectionEvent::TakeProfitExtended {
                        ticket,
                        from: tp,
                        to: extended,
                    });
                }
            }
        }

        if levels.stop != position.stop_loss || levels.target != position.take_profit {
            plan.intents.push(OrderIntent::ModifyStops {
                ticket,
                stop_loss: levels.stop,
                take_profit: levels.target,
            });
        }

        plan
    }

    /// Thesis invalidation for an open position
    fn rule_exit(&self, side: Side, snapshot: Option<&ExitSnapshot>) -> Option<String> {
        let rules = &self.config.rule_exit;
        if !rules.enabled {
            return None;
        }
        let snapshot = snapshot?;

        match side {
            Side::Buy => {
                if let Some(rsi) = snapshot.rsi.filter(|r| *r >= rules.rsi_overbought) {
                    return Some(format!("RSI {:.1} reached overbought", rsi));
                }
                if rules.use_ema_exit {
                    if let Some(ema) = snapshot.ema_exit.filter(|e| snapshot.close < *e) {
                        return Some(format!(
                            "close {:.2} crossed below exit EMA {:.2}",
                            snapshot.close, ema
                        ));
                    }
                }
            }
            Side::Sell => {
                if let Some(rsi) = snapshot.rsi.filter(|r| *r <= rules.rsi_oversold) {
                    return Some(format!("RSI {:.1} reached oversold", rsi));
                }
                if rules.use_ema_exit {
                    if let Some(ema) = snapshot.ema_exit.filter(|e| snapshot.close > *e) {
                        return Some(format!(
                            "close {:.2} crossed above exit EMA {:.2}",
                            snapshot.close, ema
                        ));
                    }
                }
            }
        }
        None
    }
}
