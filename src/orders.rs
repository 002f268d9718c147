//! Order intents and entry planning
//!
//! The engine never talks to the broker directly: it emits [`OrderIntent`]s
//! that the execution collaborator carries out.

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ExecutionConfig, RiskConfig, TargetsConfig};
use crate::error::EngineError;
use crate::risk::RiskSizer;
use crate::strategies::Decision;
use crate::structure::{swing_extreme, SwingKind};
use crate::{Candle, Side, Signal, SymbolSpec, Tick};

/// Action requested from the execution layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OrderIntent {
    Open {
        side: Side,
        volume: Decimal,
        /// Quote the plan was built on
        price: f64,
        stop_loss: f64,
        take_profit: f64,
        magic: u64,
        comment: String,
    },
    Close {
        ticket: u64,
        side: Side,
        volume: Decimal,
    },
    PartialClose {
        ticket: u64,
        side: Side,
        volume: Decimal,
    },
    ModifyStops {
        ticket: u64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    },
}

impl OrderIntent {
    pub fn ticket(&self) -> Option<u64> {
        match self {
            OrderIntent::Open { .. } => None,
            OrderIntent::Close { ticket, .. }
            | OrderIntent::PartialClose { ticket, .. }
            | OrderIntent::ModifyStops { ticket, .. } => Some(*ticket),
        }
    }
}

impl std::fmt::Display for OrderIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderIntent::Open {
                side,
                volume,
                price,
                stop_loss,
                take_profit,
                ..
            } => write!(
                f,
                "OPEN {} {} @ {:.2} SL {:.2} TP {:.2}",
                side, volume, price, stop_loss, take_profit
            ),
            OrderIntent::Close {
                ticket,
                side,
                volume,
            } => write!(f, "CLOSE #{} {} {}", ticket, side, volume),
            OrderIntent::PartialClose {
                ticket,
                side,
                volume,
            } => write!(f, "PARTIAL_CLOSE #{} {} {}", ticket, side, volume),
            OrderIntent::ModifyStops {
                ticket,
                stop_loss,
                take_profit,
            } => {
                write!(f, "MODIFY #{}", ticket)?;
                if let Some(sl) = stop_loss {
                    write!(f, " SL {:.2}", sl)?;
                }
                if let Some(tp) = take_profit {
                    write!(f, " TP {:.2}", tp)?;
                }
                Ok(())
            }
        }
    }
}

/// Why an entry signal did not become an order
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EntrySkip {
    #[error("signal {0} is not an entry")]
    NotAnEntry(Signal),

    #[error("spread {spread:.0} points exceeds {max:.0}")]
    SpreadTooWide { spread: f64, max: f64 },

    #[error("unusable quote or symbol spec: {0}")]
    BadQuote(String),
}

/// Where the stop distance came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopSource {
    Strategy,
    Swing,
    Atr,
    Fixed,
}

/// Entry order plus the numbers behind it
#[derive(Debug, Clone, PartialEq)]
pub struct EntryPlan {
    pub intent: OrderIntent,
    pub stop_source: StopSource,
    pub risk_points: f64,
}

/// Turns an entry decision into an [`OrderIntent::Open`]
#[derive(Debug, Clone)]
pub struct EntryPlanner {
    targets: TargetsConfig,
    execution: ExecutionConfig,
    sizer: RiskSizer,
}

impl EntryPlanner {
    pub fn new(targets: TargetsConfig, execution: ExecutionConfig, risk: RiskConfig) -> Self {
        EntryPlanner {
            targets,
            execution,
            sizer: RiskSizer::new(risk),
        }
    }

    /// Build the entry order.
    ///
    /// Stop priority: the strategy's stop if it lies on the losing side of
    /// the entry price, then the swing extreme (if enabled), then ATR (if
    /// enabled), then the fixed distance. The distance is floored at
    /// `min_risk_points` and, unless the strategy chose it, capped at
    /// `max_sl_points`. The target is the strategy's if it lies on the
    /// winning side, otherwise `risk * risk_reward_ratio`.
    #[allow(clippy::too_many_arguments)]
    pub fn plan(
        &self,
        decision: &Decision,
        tick: &Tick,
        spec: &SymbolSpec,
        candles: &[Candle],
        closed_index: usize,
        balance: f64,
        magic: u64,
    ) -> Result<EntryPlan, EntrySkip> {
        let side = decision
            .signal
            .side()
            .ok_or(EntrySkip::NotAnEntry(decision.signal))?;
        let point = spec.point;
        if point.is_nan() || point <= 0.0 {
            return Err(EntrySkip::BadQuote(format!("point {}", point)));
        }

        let spread = tick.spread_points(point);
        if spread > self.execution.max_spread_points {
            return Err(EntrySkip::SpreadTooWide {
                spread,
                max: self.execution.max_spread_points,
            });
        }

        let price = tick.entry_price(side);
        if price.is_nan() || price <= 0.0 {
            return Err(EntrySkip::BadQuote(format!("{} price {}", side, price)));
        }

        let (raw_risk, stop_source) =
            self.stop_distance(decision, side, price, candles, closed_index, point);
        let mut risk = raw_risk.max(self.execution.min_risk_points * point);
        if stop_source != StopSource::Strategy {
            risk = risk.min(self.targets.max_sl_points * point);
        }

        let stop_loss = spec.normalize_price(price - side.sign() * risk);
        let take_profit = decision
            .aux
            .take_profit
            .filter(|tp| (tp - price) * side.sign() > 0.0)
            .unwrap_or(price + side.sign() * risk * self.targets.risk_reward_ratio);
        let take_profit = spec.normalize_price(take_profit);

        let risk_points = risk / point;
        let volume = self.sizer.size(balance, risk_points, spec);

        debug!(
            %side,
            price,
            stop_loss,
            take_profit,
            risk_points,
            source = ?stop_source,
            volume = %volume,
            "Entry planned"
        );

        Ok(EntryPlan {
            intent: OrderIntent::Open {
                side,
                volume,
                price,
                stop_loss,
                take_profit,
                magic,
                comment: decision.reason.chars().take(31).collect(),
            },
            stop_source,
            risk_points,
        })
    }

    fn stop_distance(
        &self,
        decision: &Decision,
        side: Side,
        price: f64,
        candles: &[Candle],
        closed_index: usize,
        point: f64,
    ) -> (f64, StopSource) {
        if let Some(sl) = decision.aux.stop_loss {
            let distance = (price - sl) * side.sign();
            if distance > 0.0 {
                return (distance, StopSource::Strategy);
            }
            let err = EngineError::InvalidZone(format!(
                "{} stop {:.2} is on the wrong side of {:.2}",
                side, sl, price
            ));
            warn!(error = %err, "Ignoring strategy stop");
        }

        if let Some(distance) = self.swing_distance(side, price, candles, closed_index) {
            return (distance, StopSource::Swing);
        }

        if self.execution.auto_risk {
            if let Some(atr) = decision.aux.atr.filter(|a| *a > 0.0) {
                return (atr * self.targets.atr_sl_mult, StopSource::Atr);
            }
        }

        (self.targets.stop_loss_points * point, StopSource::Fixed)
    }

    fn swing_distance(
        &self,
        side: Side,
        price: f64,
        candles: &[Candle],
        closed_index: usize,
    ) -> Option<f64> {
        if !self.execution.use_swing_sl {
            return None;
        }
        let kind = match side {
            Side::Buy => SwingKind::Low,
            Side::Sell => SwingKind::High,
        };
        let extreme = swing_extreme(candles, closed_index, self.execution.swing_lookback, kind)?;
        let distance = (price - extreme) * side.sign();
        (distance > 0.0).then_some(distance)
    }
}
