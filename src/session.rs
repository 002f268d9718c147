//! Process-local mutable state shared by the evaluator and the protection
//! engine. Owned by the polling loop and passed down by reference.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Tickets that already received their partial take-profit
    partially_closed: HashSet<u64>,
    /// Stop distance (price units) first observed per ticket
    initial_risk: HashMap<u64, f64>,
    /// Target distance (price units) first observed per ticket
    initial_target: HashMap<u64, f64>,
    /// Open time of the candle the last entry was placed on
    last_trade_candle: Option<DateTime<Utc>>,
    /// Time of the last rejected open order
    last_order_error: Option<DateTime<Utc>>,
    consecutive_data_failures: u32,
    data_alert_sent: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget tickets that are no longer open
    pub fn retain_open(&mut self, open_tickets: &[u64]) {
        let tracked =
            |s: &Self| s.partially_closed.len() + s.initial_risk.len() + s.initial_target.len();
        let before = tracked(self);
        self.partially_closed.retain(|t| open_tickets.contains(t));
        self.initial_risk.retain(|t, _| open_tickets.contains(t));
        self.initial_target.retain(|t, _| open_tickets.contains(t));
        let removed = before - tracked(self);
        if removed > 0 {
            debug!(removed, "Cleared state of closed tickets");
        }
    }

    pub fn is_partially_closed(&self, ticket: u64) -> bool {
        self.partially_closed.contains(&ticket)
    }

    /// Returns false if the ticket was already marked
    pub fn mark_partially_closed(&mut self, ticket: u64) -> bool {
        self.partially_closed.insert(ticket)
    }

    /// Undo a mark after the execution layer rejected the partial close
    pub fn release_partial(&mut self, ticket: u64) {
        self.partially_closed.remove(&ticket);
    }

    /// Record the stop distance of a ticket the first time it is seen
    pub fn record_initial_risk(&mut self, ticket: u64, distance: f64) -> f64 {
        *self.initial_risk.entry(ticket).or_insert(distance)
    }

    pub fn initial_risk(&self, ticket: u64) -> Option<f64> {
        self.initial_risk.get(&ticket).copied()
    }

    /// Record the target distance of a ticket the first time it is seen
    pub fn record_initial_target(&mut self, ticket: u64, distance: f64) -> f64 {
        *self.initial_target.entry(ticket).or_insert(distance)
    }

    pub fn initial_target(&self, ticket: u64) -> Option<f64> {
        self.initial_target.get(&ticket).copied()
    }

    pub fn already_traded(&self, candle_time: DateTime<Utc>) -> bool {
        self.last_trade_candle == Some(candle_time)
    }

    pub fn record_trade(&mut self, candle_time: DateTime<Utc>) {
        self.last_trade_candle = Some(candle_time);
    }

    pub fn record_order_error(&mut self, now: DateTime<Utc>) {
        self.last_order_error = Some(now);
    }

    /// Seconds left before entries may be retried after an order error
    pub fn cooldown_remaining(&self, now: DateTime<Utc>, cooldown_secs: i64) -> Option<i64> {
        let last = self.last_order_error?;
        let remaining = (last + Duration::seconds(cooldown_secs) - now).num_seconds();
        (remaining > 0).then_some(remaining)
    }

    /// Count a failed data fetch. Returns true exactly once when the streak
    /// reaches `threshold`.
    pub fn record_data_failure(&mut self, threshold: u32) -> bool {
        self.consecutive_data_failures = self.consecutive_data_failures.saturating_add(1);
        if threshold > 0 && self.consecutive_data_failures >= threshold && !self.data_alert_sent {
            self.data_alert_sent = true;
            return true;
        }
        false
    }

    pub fn record_data_success(&mut self) {
        if self.consecutive_data_failures > 0 {
            info!(
                failures = self.consecutive_data_failures,
                "Market data recovered"
            );
        }
        self.consecutive_data_failures = 0;
        self.data_alert_sent = false;
    }

    pub fn consecutive_data_failures(&self) -> u32 {
        self.consecutive_data_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_partial_marks_and_cleanup() {
        let mut state = SessionState::new();
        assert!(state.mark_partially_closed(7));
        assert!(!state.mark_partially_closed(7));
        assert_eq!(state.record_initial_risk(7, 5.0), 5.0);
        assert_eq!(state.record_initial_risk(7, 1.0), 5.0);
        assert_eq!(state.record_initial_target(7, 12.5), 12.5);

        state.retain_open(&[8]);
        assert!(!state.is_partially_closed(7));
        assert_eq!(state.initial_risk(7), None);
        assert_eq!(state.initial_target(7), None);
    }

    #[test]
    fn test_trade_and_cooldown_guards() {
        let mut state = SessionState::new();
        let t0 = Utc.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap();
        assert!(!state.already_traded(t0));
        state.record_trade(t0);
        assert!(state.already_traded(t0));

        assert_eq!(state.cooldown_remaining(t0, 60), None);
        state.record_order_error(t0);
        assert_eq!(state.cooldown_remaining(t0 + Duration::seconds(20), 60), Some(40));
        assert_eq!(state.cooldown_remaining(t0 + Duration::seconds(60), 60), None);
    }

    #[test]
    fn test_data_failure_alert_once() {
        let mut state = SessionState::new();
        let alerts: Vec<bool> = (0..7).map(|_| state.record_data_failure(5)).collect();
        assert_eq!(alerts, vec![false, false, false, false, true, false, false]);

        state.record_data_success();
        assert_eq!(state.consecutive_data_failures(), 0);
        let alerts: Vec<bool> = (0..5).map(|_| state.record_data_failure(5)).collect();
        assert_eq!(alerts.iter().filter(|a| **a).count(), 1);
    }
}
