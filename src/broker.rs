//! Broker and notification collaborators
//!
//! The engine consumes snapshots (candles, quotes, positions, account) and
//! hands back [`OrderIntent`]s. [`PaperBroker`] replays a candle file one bar
//! per poll and fills intents against it, which is enough to drive the
//! polling loop end to end without a terminal.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::data::resample;
use crate::error::BrokerError;
use crate::orders::OrderIntent;
use crate::{Candle, Position, Side, Symbol, SymbolSpec, Tick};

/// Terminal return code for invalid stop levels
pub const RETCODE_INVALID_STOPS: i32 = 10016;
/// Terminal return code for an invalid volume
pub const RETCODE_INVALID_VOLUME: i32 = 10014;

/// Outcome of an executed intent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub ticket: u64,
    pub price: f64,
    pub volume: Decimal,
    /// Profit realised by this execution (zero for opens and modifications)
    pub realized_pnl: f64,
}

/// Trading terminal collaborator
pub trait Broker {
    /// Most recent `count` candles of the given timeframe, oldest first. The
    /// last candle is still forming.
    fn fetch_candles(
        &self,
        timeframe_minutes: u32,
        count: usize,
    ) -> Result<Vec<Candle>, BrokerError>;

    fn fetch_tick(&self) -> Result<Tick, BrokerError>;

    fn symbol_spec(&self) -> Result<SymbolSpec, BrokerError>;

    fn account_balance(&self) -> Result<f64, BrokerError>;

    /// Open positions on `symbol` tagged with `magic`
    fn open_positions(&self, symbol: &Symbol, magic: u64) -> Result<Vec<Position>, BrokerError>;

    /// Profit realised since midnight of `now`'s day
    fn daily_realized_pnl(&self, now: DateTime<Utc>) -> Result<f64, BrokerError>;

    fn execute(&mut self, intent: &OrderIntent) -> Result<ExecutionReport, BrokerError>;
}

/// Best-effort operator notifications
pub trait Notifier {
    fn notify(&self, message: &str);
}

/// Notifier that only writes to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        info!(target: "notify", "{}", message);
    }
}

// =============================================================================
// Paper broker
// =============================================================================

#[derive(Debug, Clone)]
struct Realized {
    time: DateTime<Utc>,
    pnl: f64,
}

/// In-memory broker replaying a candle series
#[derive(Debug, Clone)]
pub struct PaperBroker {
    symbol: Symbol,
    spec: SymbolSpec,
    timeframe_minutes: u32,
    candles: Vec<Candle>,
    htf_candles: Option<Vec<Candle>>,
    /// Number of candles visible; the last visible one is forming
    cursor: usize,
    spread: f64,
    balance: f64,
    positions: Vec<Position>,
    history: Vec<Realized>,
    next_ticket: u64,
}

impl PaperBroker {
    /// `warmup` candles are visible before the first [`PaperBroker::step`]
    pub fn new(
        symbol: Symbol,
        spec: SymbolSpec,
        timeframe_minutes: u32,
        candles: Vec<Candle>,
        balance: f64,
        spread_points: f64,
        warmup: usize,
    ) -> Self {
        let spread = spread_points * spec.point;
        let cursor = warmup.clamp(1, candles.len().max(1));
        PaperBroker {
            symbol,
            spec,
            timeframe_minutes,
            candles,
            htf_candles: None,
            cursor,
            spread,
            balance,
            positions: Vec::new(),
            history: Vec::new(),
            next_ticket: 1,
        }
    }

    /// Serve higher-timeframe requests from a separate series instead of
    /// resampling the base candles
    pub fn with_htf_candles(mut self, candles: Vec<Candle>) -> Self {
        self.htf_candles = Some(candles);
        self
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.candles.len()
    }

    /// Forming candle
    fn current(&self) -> Option<&Candle> {
        self.cursor.checked_sub(1).and_then(|i| self.candles.get(i))
    }

    /// Reveal the next candle and settle any stop/target it touched.
    /// Returns false once the series is exhausted.
    pub fn step(&mut self) -> bool {
        if self.is_exhausted() {
            return false;
        }
        self.cursor += 1;
        if let Some(bar) = self.current().cloned() {
            self.settle_levels(&bar);
        }
        true
    }

    /// Close positions whose stop or target lies inside `bar`. The stop wins
    /// when both were touched.
    fn settle_levels(&mut self, bar: &Candle) {
        let mut hits = Vec::new();
        for pos in &self.positions {
            let (stop_hit, target_hit) = match pos.side {
                Side::Buy => (
                    pos.stop_loss.is_some_and(|sl| bar.low <= sl),
                    pos.take_profit.is_some_and(|tp| bar.high >= tp),
                ),
                Side::Sell => (
                    pos.stop_loss.is_some_and(|sl| bar.high + self.spread >= sl),
                    pos.take_profit.is_some_and(|tp| bar.low + self.spread <= tp),
                ),
            };
            let fill = if stop_hit {
                pos.stop_loss
            } else if target_hit {
                pos.take_profit
            } else {
                None
            };
            if let Some(price) = fill {
                hits.push((pos.ticket, price, stop_hit));
            }
        }

        for (ticket, price, stop_hit) in hits {
            if let Some(idx) = self.positions.iter().position(|p| p.ticket == ticket) {
                let pos = self.positions.remove(idx);
                let pnl = self.realize(&pos, pos.volume, price, bar.datetime);
                info!(
                    ticket,
                    price,
                    pnl,
                    reason = if stop_hit { "stop" } else { "target" },
                    "Paper position closed"
                );
            }
        }
    }

    fn quote(&self) -> Result<Tick, BrokerError> {
        let bar = self
            .current()
            .ok_or_else(|| BrokerError::Unavailable("no candles loaded".to_string()))?;
        Ok(Tick {
            bid: bar.close,
            ask: bar.close + self.spread,
            // Last second of the forming bar
            time: bar.datetime + Duration::minutes(i64::from(self.timeframe_minutes))
                - Duration::seconds(1),
        })
    }

    fn realize(
        &mut self,
        pos: &Position,
        volume: Decimal,
        price: f64,
        time: DateTime<Utc>,
    ) -> f64 {
        let tick_size = if self.spec.tick_size > 0.0 {
            self.spec.tick_size
        } else {
            self.spec.point
        };
        let lots = volume.to_f64().unwrap_or(0.0);
        let pnl = pos.profit_distance(price) * lots * self.spec.tick_value / tick_size;
        self.balance += pnl;
        self.history.push(Realized { time, pnl });
        pnl
    }

    fn position_index(&self, ticket: u64) -> Result<usize, BrokerError> {
        self.positions
            .iter()
            .position(|p| p.ticket == ticket)
            .ok_or(BrokerError::UnknownTicket(ticket))
    }

    fn check_volume(&self, volume: Decimal) -> Result<(), BrokerError> {
        if volume < self.spec.volume_min || volume > self.spec.volume_max {
            return Err(BrokerError::Rejected {
                code: RETCODE_INVALID_VOLUME,
                message: format!("volume {} outside lot limits", volume),
            });
        }
        Ok(())
    }

    /// Stops must sit on the losing side of the exit price, targets on the
    /// winning side
    fn check_levels(
        side: Side,
        price: f64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<(), BrokerError> {
        let sign = side.sign();
        let stop_ok = stop_loss.map_or(true, |sl| (price - sl) * sign > 0.0);
        let target_ok = take_profit.map_or(true, |tp| (tp - price) * sign > 0.0);
        if stop_ok && target_ok {
            Ok(())
        } else {
            Err(BrokerError::Rejected {
                code: RETCODE_INVALID_STOPS,
                message: format!(
                    "Invalid stops: {} @ {:.2} SL {:?} TP {:?}",
                    side, price, stop_loss, take_profit
                ),
            })
        }
    }
}

impl Broker for PaperBroker {
    fn fetch_candles(
        &self,
        timeframe_minutes: u32,
        count: usize,
    ) -> Result<Vec<Candle>, BrokerError> {
        let visible = &self.candles[..self.cursor.min(self.candles.len())];
        if visible.is_empty() {
            return Err(BrokerError::Unavailable("no candles loaded".to_string()));
        }

        let series = if timeframe_minutes == self.timeframe_minutes {
            visible.to_vec()
        } else if let Some(htf) = &self.htf_candles {
            let now = self.quote()?.time;
            htf.iter().take_while(|c| c.datetime <= now).cloned().collect()
        } else {
            resample(visible, timeframe_minutes)
        };

        let start = series.len().saturating_sub(count);
        Ok(series[start..].to_vec())
    }

    fn fetch_tick(&self) -> Result<Tick, BrokerError> {
        self.quote()
    }

    fn symbol_spec(&self) -> Result<SymbolSpec, BrokerError> {
        Ok(self.spec.clone())
    }

    fn account_balance(&self) -> Result<f64, BrokerError> {
        Ok(self.balance)
    }

    fn open_positions(&self, symbol: &Symbol, magic: u64) -> Result<Vec<Position>, BrokerError> {
        Ok(self
            .positions
            .iter()
            .filter(|p| &p.symbol == symbol && p.magic == magic)
            .cloned()
            .collect())
    }

    fn daily_realized_pnl(&self, now: DateTime<Utc>) -> Result<f64, BrokerError> {
        let today = now.date_naive();
        Ok(self
            .history
            .iter()
            .filter(|r| r.time.date_naive() == today)
            .map(|r| r.pnl)
            .sum())
    }

    fn execute(&mut self, intent: &OrderIntent) -> Result<ExecutionReport, BrokerError> {
        let tick = self.quote()?;
        debug!(%intent, "Paper execution");

        match intent {
            OrderIntent::Open {
                side,
                volume,
                stop_loss,
                take_profit,
                magic,
                comment,
                ..
            } => {
                self.check_volume(*volume)?;
                let price = tick.entry_price(*side);
                Self::check_levels(*side, price, Some(*stop_loss), Some(*take_profit))?;

                let ticket = self.next_ticket;
                self.next_ticket += 1;
                self.positions.push(Position {
                    ticket,
                    symbol: self.symbol.clone(),
                    side: *side,
                    volume: *volume,
                    entry_price: price,
                    stop_loss: Some(*stop_loss),
                    take_profit: Some(*take_profit),
                    open_time: tick.time,
                    magic: *magic,
                });
                info!(
                    ticket,
                    %side,
                    price,
                    volume = %volume,
                    comment = %comment,
                    "Paper position opened"
                );
                Ok(ExecutionReport {
                    ticket,
                    price,
                    volume: *volume,
                    realized_pnl: 0.0,
                })
            }
            OrderIntent::Close { ticket, .. } => {
                let idx = self.position_index(*ticket)?;
                let pos = self.positions.remove(idx);
                let price = tick.exit_price(pos.side);
                let pnl = self.realize(&pos, pos.volume, price, tick.time);
                Ok(ExecutionReport {
                    ticket: *ticket,
                    price,
                    volume: pos.volume,
                    realized_pnl: pnl,
                })
            }
            OrderIntent::PartialClose { ticket, volume, .. } => {
                let idx = self.position_index(*ticket)?;
                let pos = self.positions[idx].clone();
                if *volume >= pos.volume {
                    return Err(BrokerError::Rejected {
                        code: RETCODE_INVALID_VOLUME,
                        message: format!("partial {} >= position {}", volume, pos.volume),
                    });
                }
                self.check_volume(*volume)?;
                let price = tick.exit_price(pos.side);
                let pnl = self.realize(&pos, *volume, price, tick.time);
                self.positions[idx].volume = pos.volume - *volume;
                Ok(ExecutionReport {
                    ticket: *ticket,
                    price,
                    volume: *volume,
                    realized_pnl: pnl,
                })
            }
            OrderIntent::ModifyStops {
                ticket,
                stop_loss,
                take_profit,
            } => {
                let idx = self.position_index(*ticket)?;
                let side = self.positions[idx].side;
                let price = tick.exit_price(side);
                if let Err(e) = Self::check_levels(side, price, *stop_loss, *take_profit) {
                    warn!(ticket, error = %e, "Paper modification rejected");
                    return Err(e);
                }
                let pos = &mut self.positions[idx];
                pos.stop_loss = *stop_loss;
                pos.take_profit = *take_profit;
                Ok(ExecutionReport {
                    ticket: *ticket,
                    price,
                    volume: pos.volume,
                    realized_pnl: 0.0,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn bars(closes: &[(f64, f64, f64)]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2025, 1, 6, 8, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &(high, low, close))| {
                Candle::new_unchecked(
                    start + Duration::minutes(15 * i as i64),
                    close,
                    high,
                    low,
                    close,
                    1.0,
                )
            })
            .collect()
    }

    fn broker(candles: Vec<Candle>) -> PaperBroker {
        PaperBroker::new(
            Symbol::new("XAUUSD"),
            SymbolSpec::default(),
            15,
            candles,
            10_000.0,
            0.0,
            1,
        )
    }

    fn open(side: Side, sl: f64, tp: f64) -> OrderIntent {
        OrderIntent::Open {
            side,
            volume: dec!(0.10),
            price: 2000.0,
            stop_loss: sl,
            take_profit: tp,
            magic: 888888,
            comment: "test".to_string(),
        }
    }

    #[test]
    fn test_open_and_stop_hit_before_target() {
        let mut b = broker(bars(&[
            (2000.5, 1999.5, 2000.0),
            // Touches both levels: the stop wins
            (2011.0, 1994.0, 2005.0),
        ]));
        let report = b.execute(&open(Side::Buy, 1995.0, 2010.0)).unwrap();
        assert_eq!(report.price, 2000.0);
        assert_eq!(b.positions().len(), 1);

        assert!(b.step());
        assert!(b.positions().is_empty());
        // 5.0 price units * 0.10 lots * 1.0 / 0.01
        let pnl = b.daily_realized_pnl(b.fetch_tick().unwrap().time).unwrap();
        assert!((pnl + 50.0).abs() < 1e-6);
        assert!((b.account_balance().unwrap() - 9_950.0).abs() < 1e-6);
        assert!(!b.step());
    }

    #[test]
    fn test_partial_close_and_modify() {
        let mut b = broker(bars(&[(2000.5, 1999.5, 2000.0), (2005.5, 2000.0, 2005.0)]));
        let ticket = b.execute(&open(Side::Buy, 1995.0, 2012.5)).unwrap().ticket;
        b.step();

        let report = b
            .execute(&OrderIntent::PartialClose {
                ticket,
                side: Side::Buy,
                volume: dec!(0.05),
            })
            .unwrap();
        assert!((report.realized_pnl - 25.0).abs() < 1e-6);
        assert_eq!(b.positions()[0].volume, dec!(0.05));

        let bad = b.execute(&OrderIntent::ModifyStops {
            ticket,
            stop_loss: Some(2006.0),
            take_profit: Some(2012.5),
        });
        assert!(matches!(
            bad,
            Err(BrokerError::Rejected {
                code: RETCODE_INVALID_STOPS,
                ..
            })
        ));

        b.execute(&OrderIntent::ModifyStops {
            ticket,
            stop_loss: Some(2001.0),
            take_profit: Some(2012.5),
        })
        .unwrap();
        assert_eq!(b.positions()[0].stop_loss, Some(2001.0));
    }

    #[test]
    fn test_unknown_ticket_and_magic_filter() {
        let mut b = broker(bars(&[(2000.5, 1999.5, 2000.0)]));
        b.execute(&open(Side::Sell, 2005.0, 1990.0)).unwrap();
        let symbol = Symbol::new("XAUUSD");
        assert_eq!(b.open_positions(&symbol, 888888).unwrap().len(), 1);
        assert!(b.open_positions(&symbol, 888988).unwrap().is_empty());
        assert!(matches!(
            b.execute(&OrderIntent::Close {
                ticket: 99,
                side: Side::Sell,
                volume: dec!(0.10),
            }),
            Err(BrokerError::UnknownTicket(99))
        ));
    }

    #[test]
    fn test_htf_candles_are_resampled() {
        let mut b = broker(bars(&[(2001.0, 1999.0, 2000.0); 9]));
        while b.step() {}
        let hourly = b.fetch_candles(60, 10).unwrap();
        assert_eq!(hourly.len(), 3);
        assert_eq!(b.fetch_candles(15, 4).unwrap().len(), 4);
    }
}
