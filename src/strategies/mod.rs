//! Trading Strategies Module
//!
//! Strategy framework with:
//! - One trait every signal variant implements
//! - Shared gating (session, news blackout, history, open position)
//! - Name-based registry resolved once at startup

pub mod macd_trend;
pub mod rsi_reversal;
pub mod smc_confluence;
pub mod triple_confluence;

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::debug;

use crate::config::{EffectiveConfig, SessionConfig};
use crate::error::ConfigError;
use crate::indicators::{IndicatorFrame, IndicatorRow};
use crate::multi_timeframe::HtfTrend;
use crate::structure::CandlePattern;
use crate::{Candle, Side, Signal};

// =============================================================================
// Market Context - everything a strategy may look at for one poll
// =============================================================================

/// Index of the candle signals are evaluated on: the last bar in real-time
/// mode, otherwise the last fully closed bar (second to last).
pub fn closed_index(len: usize, realtime_candle: bool) -> Option<usize> {
    match (len, realtime_candle) {
        (0, _) => None,
        (n, true) => Some(n - 1),
        (1, false) => None,
        (n, false) => Some(n - 2),
    }
}

/// Read-only snapshot handed to a strategy
#[derive(Debug, Clone)]
pub struct MarketContext<'a> {
    pub candles: &'a [Candle],
    pub indicators: &'a IndicatorFrame,
    /// Reference candle index, see [`closed_index`]
    pub closed_index: usize,
    pub htf_trend: HtfTrend,
    /// A position with this strategy's magic number is open
    pub position_open: bool,
    /// Broker server time
    pub now: DateTime<Utc>,
    /// Title of the high-impact event currently blacking out entries
    pub news_blackout: Option<String>,
    pub session: &'a SessionConfig,
    /// Instrument point size
    pub point: f64,
}

impl<'a> MarketContext<'a> {
    pub fn candle(&self) -> Option<&'a Candle> {
        self.candles.get(self.closed_index)
    }

    pub fn row(&self) -> Option<&'a IndicatorRow> {
        self.indicators.row(self.closed_index)
    }

    /// Indicator rows of the `count` bars ending at the reference candle
    pub fn recent_rows(&self, count: usize) -> &'a [IndicatorRow] {
        let rows = self.indicators.rows();
        if rows.is_empty() || self.closed_index >= rows.len() {
            return &[];
        }
        let start = (self.closed_index + 1).saturating_sub(count);
        &rows[start..=self.closed_index]
    }

    /// Candles of the `count` bars ending at the reference candle
    pub fn recent_candles(&self, count: usize) -> &'a [Candle] {
        if self.candles.is_empty() || self.closed_index >= self.candles.len() {
            return &[];
        }
        let start = (self.closed_index + 1).saturating_sub(count);
        &self.candles[start..=self.closed_index]
    }

    /// Closed bars available up to and including the reference candle
    pub fn available_bars(&self) -> usize {
        if self.candles.is_empty() {
            0
        } else {
            (self.closed_index + 1).min(self.candles.len())
        }
    }
}

// =============================================================================
// Decision - strategy output
// =============================================================================

/// Values a strategy attaches to its decision for logging and entry planning
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuxData {
    /// Reference close
    pub price: Option<f64>,
    /// Suggested stop-loss price
    pub stop_loss: Option<f64>,
    /// Suggested take-profit price
    pub take_profit: Option<f64>,
    pub atr: Option<f64>,
    pub rsi: Option<f64>,
    pub pattern: Option<CandlePattern>,
    /// Open time of the reference candle
    pub candle_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub signal: Signal,
    pub reason: String,
    pub aux: AuxData,
}

impl Decision {
    pub fn wait(reason: impl Into<String>) -> Self {
        Decision {
            signal: Signal::Wait,
            reason: reason.into(),
            aux: AuxData::default(),
        }
    }

    pub fn sleep(reason: impl Into<String>) -> Self {
        Decision {
            signal: Signal::Sleep,
            reason: reason.into(),
            aux: AuxData::default(),
        }
    }

    pub fn entry(side: Side, reason: impl Into<String>) -> Self {
        let signal = match side {
            Side::Buy => Signal::Buy,
            Side::Sell => Signal::Sell,
        };
        Decision {
            signal,
            reason: reason.into(),
            aux: AuxData::default(),
        }
    }

    pub fn with_aux(mut self, aux: AuxData) -> Self {
        self.aux = aux;
        self
    }

    pub fn is_entry(&self) -> bool {
        self.signal.side().is_some()
    }
}

// =============================================================================
// Strategy Trait - the contract all signal variants implement
// =============================================================================

/// Signal evaluator. Implementors only provide [`Strategy::evaluate`]; the
/// provided [`Strategy::analyze`] applies the gates every variant shares.
pub trait Strategy: Send + Sync {
    /// Strategy identifier (matches the configured strategy name)
    fn name(&self) -> &'static str;

    /// Added to the configured magic base to tag this strategy's positions
    fn magic_offset(&self) -> u64 {
        200
    }

    /// Closed bars needed before any condition can be evaluated
    fn min_history(&self) -> usize;

    /// Evaluate entry conditions on the reference candle
    fn evaluate(&self, ctx: &MarketContext) -> Decision;

    /// Gate and evaluate. Session beats news, news beats history, and an
    /// entry signal is downgraded to WAIT while a position is open.
    fn analyze(&self, ctx: &MarketContext) -> Decision {
        let hour = ctx.now.hour();
        if !ctx.session.contains_hour(hour) {
            return Decision::sleep(format!(
                "Sleeping outside session {:02}:00-{:02}:59 (server {})",
                ctx.session.start_hour,
                ctx.session.end_hour,
                ctx.now.format("%H:%M")
            ));
        }

        if let Some(title) = &ctx.news_blackout {
            return Decision::wait(format!("News blackout: {}", title));
        }

        let available = ctx.available_bars();
        if available < self.min_history() {
            return Decision::wait(format!(
                "Warming up: {} of {} bars",
                available,
                self.min_history()
            ));
        }

        let decision = self.evaluate(ctx);
        if decision.is_entry() && ctx.position_open {
            debug!(
                strategy = self.name(),
                signal = %decision.signal,
                "Entry suppressed, position already open"
            );
            return Decision {
                signal: Signal::Wait,
                reason: format!("{} suppressed: position open", decision.signal),
                aux: decision.aux,
            };
        }
        decision
    }
}

// =============================================================================
// Strategy Factory
// =============================================================================

/// Factory function type for creating strategies from resolved config
pub type StrategyFactory = fn(&EffectiveConfig) -> Result<Box<dyn Strategy>, ConfigError>;

static REGISTRY: OnceLock<HashMap<&'static str, StrategyFactory>> = OnceLock::new();

fn get_registry() -> &'static HashMap<&'static str, StrategyFactory> {
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        map.insert("rsi_reversal", rsi_reversal::create as StrategyFactory);
        map.insert("macd_trend", macd_trend::create as StrategyFactory);
        map.insert("smc_confluence", smc_confluence::create as StrategyFactory);
        map.insert(
            "triple_confluence",
            triple_confluence::create as StrategyFactory,
        );
        map
    })
}

/// Create the configured strategy
pub fn create_strategy(config: &EffectiveConfig) -> Result<Box<dyn Strategy>, ConfigError> {
    let name = config.strategy_name()?;
    let registry = get_registry();
    let factory = registry
        .get(name)
        .ok_or_else(|| ConfigError::UnknownStrategy {
            name: name.to_string(),
            available: available_strategies().join(", "),
        })?;
    factory(config)
}

/// Registered strategy names, sorted
pub fn available_strategies() -> Vec<&'static str> {
    let mut names: Vec<_> = get_registry().keys().copied().collect();
    names.sort_unstable();
    names
}

/// Magic number identifying positions opened by `strategy`
pub fn magic_number(config: &EffectiveConfig, strategy: &dyn Strategy) -> u64 {
    config.magic_base + strategy.magic_offset()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    struct AlwaysBuy;

    impl Strategy for AlwaysBuy {
        fn name(&self) -> &'static str {
            "always_buy"
        }

        fn min_history(&self) -> usize {
            3
        }

        fn evaluate(&self, _ctx: &MarketContext) -> Decision {
            Decision::entry(Side::Buy, "test")
        }
    }

    fn candles(n: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                Candle::new_unchecked(
                    start + chrono::Duration::minutes(15 * i as i64),
                    2000.0,
                    2001.0,
                    1999.0,
                    2000.5,
                    1.0,
                )
            })
            .collect()
    }

    fn context<'a>(
        candles: &'a [Candle],
        frame: &'a IndicatorFrame,
        session: &'a SessionConfig,
        hour: u32,
    ) -> MarketContext<'a> {
        MarketContext {
            candles,
            indicators: frame,
            closed_index: closed_index(candles.len(), false).unwrap_or(0),
            htf_trend: HtfTrend::Disabled,
            position_open: false,
            now: Utc.with_ymd_and_hms(2025, 1, 6, hour, 30, 0).unwrap(),
            news_blackout: None,
            session,
            point: 0.01,
        }
    }

    #[test]
    fn test_closed_index() {
        assert_eq!(closed_index(0, false), None);
        assert_eq!(closed_index(1, false), None);
        assert_eq!(closed_index(1, true), Some(0));
        assert_eq!(closed_index(10, false), Some(8));
        assert_eq!(closed_index(10, true), Some(9));
    }

    #[test]
    fn test_gates_in_order() {
        let data = candles(10);
        let frame = IndicatorFrame::default();
        let session = SessionConfig {
            start_hour: 8,
            end_hour: 20,
        };

        let mut ctx = context(&data, &frame, &session, 3);
        ctx.news_blackout = Some("Non-Farm Payrolls".into());
        assert_eq!(AlwaysBuy.analyze(&ctx).signal, Signal::Sleep);

        let mut ctx = context(&data, &frame, &session, 10);
        ctx.news_blackout = Some("Non-Farm Payrolls".into());
        let decision = AlwaysBuy.analyze(&ctx);
        assert_eq!(decision.signal, Signal::Wait);
        assert!(decision.reason.contains("Non-Farm"));

        let short = candles(3);
        let ctx = context(&short, &frame, &session, 10);
        assert_eq!(AlwaysBuy.analyze(&ctx).signal, Signal::Wait);

        let ctx = context(&data, &frame, &session, 10);
        assert_eq!(AlwaysBuy.analyze(&ctx).signal, Signal::Buy);

        let mut ctx = context(&data, &frame, &session, 10);
        ctx.position_open = true;
        assert_eq!(AlwaysBuy.analyze(&ctx).signal, Signal::Wait);
    }

    #[test]
    fn test_registry() {
        assert_eq!(
            available_strategies(),
            vec!["macd_trend", "rsi_reversal", "smc_confluence", "triple_confluence"]
        );

        let mut config = EffectiveConfig::default();
        for name in available_strategies() {
            config.strategy = json!({ "name": name });
            let strategy = create_strategy(&config).unwrap();
            assert_eq!(strategy.name(), name);
        }

        config.strategy = json!({ "name": "grid" });
        assert!(matches!(
            create_strategy(&config),
            Err(ConfigError::UnknownStrategy { .. })
        ));
    }

    #[test]
    fn test_magic_numbers() {
        let mut config = EffectiveConfig::default();
        let expected = [
            ("triple_confluence", 888888),
            ("smc_confluence", 888988),
            ("macd_trend", 889088),
            ("rsi_reversal", 889088),
        ];
        for (name, magic) in expected {
            config.strategy = json!({ "name": name });
            let strategy = create_strategy(&config).unwrap();
            assert_eq!(magic_number(&config, strategy.as_ref()), magic);
        }
    }
}
