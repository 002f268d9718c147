//! Risk management
//!
//! Position sizing in broker lots and the daily profit/loss guard.
//!
//! Two sizing modes:
//! ```text
//! fixed fraction: volume = balance / risk_divisor
//! risk percent:   volume = (balance * risk_percent / 100) / (stop_points * value_per_point)
//! ```
//!
//! `value_per_point` is the account-currency value of a one-point move for
//! one lot, derived from the broker's tick value and tick size. When the
//! broker reports nothing usable the configured nominal value is used
//! instead. The result is rounded to the lot step and clamped to the
//! tighter of the configured and broker lot limits.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, warn};

use crate::config::{RiskConfig, SizingMode};
use crate::SymbolSpec;

/// Round a volume to the nearest multiple of `step`, halves away from zero
pub fn round_to_step(volume: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return volume;
    }
    let Some(steps) = volume.checked_div(step) else {
        return volume;
    };
    let steps = steps.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    steps.checked_mul(step).map_or(volume, |v| v.normalize())
}

/// Lot-size calculator
#[derive(Debug, Clone)]
pub struct RiskSizer {
    config: RiskConfig,
}

impl RiskSizer {
    pub fn new(config: RiskConfig) -> Self {
        RiskSizer { config }
    }

    /// Account-currency value of a one-point move for one lot
    pub fn value_per_point(&self, spec: &SymbolSpec) -> f64 {
        let tick_size = if spec.tick_size > 0.0 {
            spec.tick_size
        } else {
            spec.point
        };
        let value = if tick_size > 0.0 {
            spec.tick_value * spec.point / tick_size
        } else {
            0.0
        };

        if value.is_finite() && value > 0.0 {
            value
        } else {
            debug!(
                tick_value = spec.tick_value,
                tick_size = spec.tick_size,
                nominal = self.config.nominal_value_per_point,
                "Tick data unavailable, using nominal value per point"
            );
            self.config.nominal_value_per_point
        }
    }

    /// Volume for a new position with a stop `stop_points` away from entry
    pub fn size(&self, balance: f64, stop_points: f64, spec: &SymbolSpec) -> Decimal {
        let raw = match self.config.mode {
            SizingMode::FixedFraction => balance / self.config.risk_divisor,
            SizingMode::RiskPercent if stop_points > 0.0 => {
                let risk_amount = balance * self.config.risk_percent / 100.0;
                risk_amount / (stop_points * self.value_per_point(spec))
            }
            SizingMode::RiskPercent => {
                warn!(
                    stop_points,
                    "Risk-percent sizing without a stop distance, using fixed fraction"
                );
                balance / self.config.risk_divisor
            }
        };

        let lower = self.config.min_lot.max(spec.volume_min);
        let upper = self.config.max_lot.min(spec.volume_max).max(lower);
        // Beyond Decimal range only happens far above any lot cap
        let raw = Decimal::from_f64(raw).unwrap_or(if raw.is_finite() && raw > 0.0 {
            upper
        } else {
            Decimal::ZERO
        });
        let volume = round_to_step(raw, spec.volume_step).clamp(lower, upper);

        debug!(
            balance,
            stop_points,
            raw = %raw,
            volume = %volume,
            "Position size"
        );
        volume
    }
}

/// Halts new entries once today's realized P/L reaches a configured bound
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyGuard {
    profit_target: f64,
    loss_limit: f64,
}

impl DailyGuard {
    pub fn from_config(config: &RiskConfig) -> Self {
        DailyGuard {
            profit_target: config.daily_profit_target,
            loss_limit: config.daily_loss_limit,
        }
    }

    /// Reason to halt entries, if any. Zero bounds are disabled.
    pub fn halt_reason(&self, realized_today: f64) -> Option<String> {
        if self.profit_target > 0.0 && realized_today >= self.profit_target {
            return Some(format!(
                "Daily profit target reached ({:.2} >= {:.2})",
                realized_today, self.profit_target
            ));
        }
        if self.loss_limit > 0.0 && realized_today <= -self.loss_limit {
            return Some(format!(
                "Daily loss limit reached ({:.2} <= -{:.2})",
                realized_today, self.loss_limit
            ));
        }
        None
    }
}
