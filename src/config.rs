//! Configuration management
//!
//! The configuration file is a JSON document with a base section per concern
//! and an optional `overrides` map keyed by strategy name. At startup the
//! override object of the selected strategy is deep-merged over the base
//! document and the result is deserialized into an immutable
//! [`EffectiveConfig`]. Nothing reads raw keys after that point.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use rust_decimal::Decimal;

use crate::error::ConfigError;
use crate::Symbol;

/// Raw configuration document as loaded from disk
#[derive(Debug, Clone)]
pub struct Config {
    base: Value,
    overrides: HashMap<String, Value>,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            ConfigError::invalid(path.display().to_string(), format!("cannot read: {}", e))
        })?;
        let document: Value = serde_json::from_str(&contents)?;
        Self::from_value(document)
    }

    /// Build from an already parsed JSON document
    pub fn from_value(mut document: Value) -> Result<Self, ConfigError> {
        let object = document
            .as_object_mut()
            .ok_or_else(|| ConfigError::invalid("<root>", "expected a JSON object"))?;

        let overrides = match object.remove("overrides") {
            Some(v) => serde_json::from_value(v)?,
            None => HashMap::new(),
        };

        // Environment wins over the file for deployment-specific values
        if let Ok(symbol) = std::env::var("XAU_SYMBOL") {
            object.insert("symbol".to_string(), Value::String(symbol));
        }
        if let Ok(url) = std::env::var("XAU_NEWS_URL") {
            let news = object
                .entry("news")
                .or_insert_with(|| Value::Object(Default::default()));
            if let Some(news) = news.as_object_mut() {
                news.insert("calendar_url".to_string(), Value::String(url));
            }
        }

        Ok(Config {
            base: document,
            overrides,
        })
    }

    /// Name of the strategy selected by the base document
    pub fn strategy_name(&self) -> Result<String, ConfigError> {
        self.base
            .get("strategy")
            .and_then(|s| s.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ConfigError::Missing("strategy.name".to_string()))
    }

    /// Select a different strategy than the file names
    pub fn set_strategy_name(&mut self, name: &str) {
        if let Some(object) = self.base.as_object_mut() {
            let strategy = object
                .entry("strategy")
                .or_insert_with(|| Value::Object(Default::default()));
            if let Some(strategy) = strategy.as_object_mut() {
                strategy.insert("name".to_string(), Value::String(name.to_string()));
            }
        }
    }

    /// Resolve base + strategy overrides into the immutable effective config
    pub fn resolve(&self) -> Result<EffectiveConfig, ConfigError> {
        let name = self.strategy_name()?;
        let mut merged = self.base.clone();
        if let Some(overlay) = self.overrides.get(&name) {
            merge_json(&mut merged, overlay);
        }

        let effective: EffectiveConfig = serde_json::from_value(merged)?;
        effective.validate()?;
        Ok(effective)
    }
}

/// Recursively merge `overlay` into `base`. Objects merge key by key; any
/// other value in the overlay replaces the base value.
pub fn merge_json(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Fully resolved, read-only configuration for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    #[serde(default = "default_symbol")]
    pub symbol: Symbol,
    #[serde(default = "default_timeframe")]
    pub timeframe_minutes: u32,
    #[serde(default = "default_magic_base")]
    pub magic_base: u64,
    /// Evaluate the still-forming candle instead of the last closed one
    #[serde(default)]
    pub realtime_candle: bool,
    #[serde(default = "default_history_bars")]
    pub history_bars: usize,
    #[serde(default)]
    pub indicators: IndicatorConfig,
    #[serde(default)]
    pub targets: TargetsConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub protection: ProtectionConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub news: NewsConfig,
    #[serde(default)]
    pub mtf: MtfConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// `{"name": "...", ...strategy parameters}`
    #[serde(default = "default_strategy")]
    pub strategy: Value,
}

fn default_symbol() -> Symbol {
    Symbol::new("XAUUSD")
}

fn default_timeframe() -> u32 {
    15
}

fn default_magic_base() -> u64 {
    888888
}

fn default_history_bars() -> usize {
    300
}

fn default_strategy() -> Value {
    serde_json::json!({ "name": "triple_confluence" })
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        EffectiveConfig {
            symbol: default_symbol(),
            timeframe_minutes: default_timeframe(),
            magic_base: default_magic_base(),
            realtime_candle: false,
            history_bars: default_history_bars(),
            indicators: IndicatorConfig::default(),
            targets: TargetsConfig::default(),
            risk: RiskConfig::default(),
            protection: ProtectionConfig::default(),
            session: SessionConfig::default(),
            news: NewsConfig::default(),
            mtf: MtfConfig::default(),
            execution: ExecutionConfig::default(),
            strategy: default_strategy(),
        }
    }
}

impl EffectiveConfig {
    pub fn strategy_name(&self) -> Result<&str, ConfigError> {
        self.strategy
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ConfigError::Missing("strategy.name".to_string()))
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.strategy_name()?;

        if self.timeframe_minutes == 0 {
            return Err(ConfigError::invalid("timeframe_minutes", "must be > 0"));
        }
        self.indicators.validate()?;
        if self.history_bars < self.indicators.ema_trend_period + 2 {
            return Err(ConfigError::invalid(
                "history_bars",
                format!(
                    "must cover the trend EMA ({} bars) plus the forming candle",
                    self.indicators.ema_trend_period
                ),
            ));
        }
        self.targets.validate()?;
        self.risk.validate()?;
        self.protection.validate()?;
        self.session.validate()?;
        if self.execution.max_spread_points < 0.0 {
            return Err(ConfigError::invalid(
                "execution.max_spread_points",
                "must be >= 0",
            ));
        }
        if self.execution.min_risk_points > self.targets.max_sl_points {
            return Err(ConfigError::invalid(
                "execution.min_risk_points",
                "must not exceed targets.max_sl_points",
            ));
        }
        Ok(())
    }
}

fn require_positive(key: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(key, format!("must be > 0, got {}", value)))
    }
}

fn require_fraction(key: &str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            key,
            format!("must be in (0, 1], got {}", value),
        ))
    }
}

// =============================================================================
// Indicator periods
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub ema_trend_period: usize,
    pub ema_exit_period: usize,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bb_period: usize,
    pub bb_std: f64,
    pub atr_period: usize,
    pub adx_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        IndicatorConfig {
            ema_trend_period: 200,
            ema_exit_period: 20,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bb_period: 20,
            bb_std: 2.0,
            atr_period: 14,
            adx_period: 14,
        }
    }
}

impl IndicatorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            ("indicators.ema_trend_period", self.ema_trend_period),
            ("indicators.ema_exit_period", self.ema_exit_period),
            ("indicators.rsi_period", self.rsi_period),
            ("indicators.macd_fast", self.macd_fast),
            ("indicators.macd_slow", self.macd_slow),
            ("indicators.macd_signal", self.macd_signal),
            ("indicators.atr_period", self.atr_period),
            ("indicators.adx_period", self.adx_period),
        ];
        for (key, period) in periods {
            if period == 0 {
                return Err(ConfigError::invalid(key, "period must be > 0"));
            }
        }
        if self.bb_period < 2 {
            return Err(ConfigError::invalid("indicators.bb_period", "must be >= 2"));
        }
        if self.macd_fast >= self.macd_slow {
            return Err(ConfigError::invalid(
                "indicators.macd_fast",
                "must be smaller than macd_slow",
            ));
        }
        require_positive("indicators.bb_std", self.bb_std)
    }
}

// =============================================================================
// Stop-loss / take-profit construction
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsConfig {
    /// Fixed stop distance used when no other rule applies
    pub stop_loss_points: f64,
    /// Stop distance as a multiple of ATR when `execution.auto_risk` is on
    pub atr_sl_mult: f64,
    pub risk_reward_ratio: f64,
    /// Hard cap on stop distance; also the maximum order-block width
    pub max_sl_points: f64,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        TargetsConfig {
            stop_loss_points: 650.0,
            atr_sl_mult: 1.6,
            risk_reward_ratio: 2.5,
            max_sl_points: 1000.0,
        }
    }
}

impl TargetsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require_positive("targets.stop_loss_points", self.stop_loss_points)?;
        require_positive("targets.atr_sl_mult", self.atr_sl_mult)?;
        require_positive("targets.risk_reward_ratio", self.risk_reward_ratio)?;
        require_positive("targets.max_sl_points", self.max_sl_points)
    }
}

// =============================================================================
// Position sizing and daily limits
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingMode {
    /// `balance / risk_divisor`
    FixedFraction,
    /// `balance * risk_percent / 100 / (stop points * value per point)`
    RiskPercent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub mode: SizingMode,
    pub risk_divisor: f64,
    pub risk_percent: f64,
    #[serde(with = "rust_decimal::serde::str")]
    pub min_lot: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub max_lot: Decimal,
    /// Used when the broker reports no tick value/size
    pub nominal_value_per_point: f64,
    /// Stop opening trades once today's realized profit reaches this (0 = off)
    pub daily_profit_target: f64,
    /// Stop opening trades once today's realized loss reaches this (0 = off)
    pub daily_loss_limit: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            mode: SizingMode::FixedFraction,
            risk_divisor: 5000.0,
            risk_percent: 1.0,
            min_lot: Decimal::new(1, 2),
            max_lot: Decimal::new(10, 0),
            nominal_value_per_point: 1.0,
            daily_profit_target: 500.0,
            daily_loss_limit: 0.0,
        }
    }
}

impl RiskConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require_positive("risk.risk_divisor", self.risk_divisor)?;
        require_positive("risk.risk_percent", self.risk_percent)?;
        require_positive("risk.nominal_value_per_point", self.nominal_value_per_point)?;
        if self.min_lot <= Decimal::ZERO || self.min_lot > self.max_lot {
            return Err(ConfigError::invalid(
                "risk.min_lot",
                "must be > 0 and <= risk.max_lot",
            ));
        }
        if self.daily_profit_target < 0.0 || self.daily_loss_limit < 0.0 {
            return Err(ConfigError::invalid(
                "risk.daily_profit_target",
                "daily limits must be >= 0",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Position protection stages
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionConfig {
    pub break_even: BreakEvenConfig,
    pub profit_lock: ProfitLockConfig,
    pub partial_tp: PartialTpConfig,
    pub trailing: TrailingConfig,
    pub dynamic_tp: DynamicTpConfig,
    pub rule_exit: RuleExitConfig,
}

impl ProtectionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require_fraction("protection.break_even.trigger_pct", self.break_even.trigger_pct)?;
        require_fraction("protection.profit_lock.trigger_pct", self.profit_lock.trigger_pct)?;
        require_fraction("protection.profit_lock.lock_level", self.profit_lock.lock_level)?;
        if self.partial_tp.ratio <= 0.0 || self.partial_tp.ratio >= 1.0 {
            return Err(ConfigError::invalid(
                "protection.partial_tp.ratio",
                "must be in (0, 1)",
            ));
        }
        require_positive("protection.partial_tp.rr", self.partial_tp.rr)?;
        require_positive(
            "protection.trailing.distance_points",
            self.trailing.distance_points,
        )?;
        if self.break_even.lock_points < 0.0
            || self.break_even.fallback_trigger_points < 0.0
            || self.trailing.step_points < 0.0
        {
            return Err(ConfigError::invalid(
                "protection",
                "lock and step distances must be >= 0",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakEvenConfig {
    pub enabled: bool,
    /// Fraction of the take-profit distance that arms break-even
    pub trigger_pct: f64,
    /// Points beyond entry the stop is moved to
    pub lock_points: f64,
    /// Profit in points that arms break-even for a position without a
    /// take-profit
    pub fallback_trigger_points: f64,
}

impl Default for BreakEvenConfig {
    fn default() -> Self {
        BreakEvenConfig {
            enabled: true,
            trigger_pct: 0.5,
            lock_points: 100.0,
            fallback_trigger_points: 300.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfitLockConfig {
    pub enabled: bool,
    pub trigger_pct: f64,
    /// Fraction of the take-profit distance locked in by the stop
    pub lock_level: f64,
}

impl Default for ProfitLockConfig {
    fn default() -> Self {
        ProfitLockConfig {
            enabled: true,
            trigger_pct: 0.65,
            lock_level: 0.5,
        }
    }
}

/// Which stop distance the partial take-profit trigger is measured against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBasis {
    /// Stop distance first observed for the ticket
    OriginalRisk,
    /// Stop distance at the time of evaluation
    CurrentRisk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialTpConfig {
    pub enabled: bool,
    /// R-multiple of profit that triggers the partial close
    pub rr: f64,
    /// Fraction of volume to close
    pub ratio: f64,
    pub min_trigger_points: f64,
    pub basis: RiskBasis,
}

impl Default for PartialTpConfig {
    fn default() -> Self {
        PartialTpConfig {
            enabled: true,
            rr: 1.0,
            ratio: 0.5,
            min_trigger_points: 100.0,
            basis: RiskBasis::OriginalRisk,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrailingConfig {
    pub enabled: bool,
    pub trigger_points: f64,
    pub distance_points: f64,
    pub step_points: f64,
}

impl Default for TrailingConfig {
    fn default() -> Self {
        TrailingConfig {
            enabled: true,
            trigger_points: 200.0,
            distance_points: 150.0,
            step_points: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicTpConfig {
    pub enabled: bool,
    pub trigger_points: f64,
    pub extension_points: f64,
}

impl Default for DynamicTpConfig {
    fn default() -> Self {
        DynamicTpConfig {
            enabled: true,
            trigger_points: 200.0,
            extension_points: 500.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleExitConfig {
    pub enabled: bool,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    /// Close when price crosses the exit EMA against the position
    pub use_ema_exit: bool,
}

impl Default for RuleExitConfig {
    fn default() -> Self {
        RuleExitConfig {
            enabled: false,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            use_ema_exit: true,
        }
    }
}

// =============================================================================
// Filters
// =============================================================================

/// Trading hours in server time, inclusive on both ends.
/// `start_hour > end_hour` wraps over midnight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            start_hour: 0,
            end_hour: 23,
        }
    }
}

impl SessionConfig {
    pub fn contains_hour(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            (self.start_hour..=self.end_hour).contains(&hour)
        } else {
            hour >= self.start_hour || hour <= self.end_hour
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.start_hour > 23 || self.end_hour > 23 {
            return Err(ConfigError::invalid("session", "hours must be within 0..=23"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub enabled: bool,
    pub avoid_minutes: i64,
    pub calendar_url: String,
    pub refresh_hours: i64,
    pub impact: String,
    pub currencies: Vec<String>,
}

impl Default for NewsConfig {
    fn default() -> Self {
        NewsConfig {
            enabled: true,
            avoid_minutes: 30,
            calendar_url: "https://nfs.faireconomy.media/ff_calendar_thisweek.json".to_string(),
            refresh_hours: 4,
            impact: "High".to_string(),
            currencies: vec!["USD".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MtfConfig {
    pub enabled: bool,
    pub timeframe_minutes: u32,
    pub ema_period: usize,
}

impl Default for MtfConfig {
    fn default() -> Self {
        MtfConfig {
            enabled: true,
            timeframe_minutes: 60,
            ema_period: 200,
        }
    }
}

// =============================================================================
// Execution guards
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub max_spread_points: f64,
    /// Derive the stop from ATR when the strategy does not suggest one
    pub auto_risk: bool,
    pub use_swing_sl: bool,
    pub swing_lookback: usize,
    pub min_risk_points: f64,
    pub error_cooldown_secs: i64,
    pub data_failure_alert_threshold: u32,
    /// Polling interval; defaults to 15 s (closed-candle) or 1 s (real-time)
    pub poll_interval_secs: Option<u64>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            max_spread_points: 50.0,
            auto_risk: true,
            use_swing_sl: false,
            swing_lookback: 20,
            min_risk_points: 100.0,
            error_cooldown_secs: 60,
            data_failure_alert_threshold: 5,
            poll_interval_secs: None,
        }
    }
}

impl ExecutionConfig {
    pub fn poll_interval(&self, realtime_candle: bool) -> u64 {
        self.poll_interval_secs
            .unwrap_or(if realtime_candle { 1 } else { 15 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_document() -> Value {
        json!({
            "symbol": "XAUUSD",
            "timeframe_minutes": 15,
            "targets": { "stop_loss_points": 650, "max_sl_points": 1000, "atr_sl_mult": 1.6 },
            "strategy": { "name": "macd_trend" },
            "overrides": {
                "macd_trend": {
                    "targets": { "stop_loss_points": 400, "max_sl_points": 500, "atr_sl_mult": 1.5 }
                },
                "smc_confluence": {
                    "timeframe_minutes": 5,
                    "targets": { "stop_loss_points": 300 }
                }
            }
        })
    }

    #[test]
    fn test_override_applies_to_selected_strategy() {
        let config = Config::from_value(sample_document()).unwrap();
        let effective = config.resolve().unwrap();

        assert_eq!(effective.strategy_name().unwrap(), "macd_trend");
        assert_eq!(effective.targets.stop_loss_points, 400.0);
        assert_eq!(effective.targets.max_sl_points, 500.0);
        assert_eq!(effective.targets.atr_sl_mult, 1.5);
        assert_eq!(effective.timeframe_minutes, 15);
        // Untouched keys keep their defaults
        assert_eq!(effective.targets.risk_reward_ratio, 2.5);
    }

    #[test]
    fn test_deep_merge_keeps_sibling_keys() {
        let mut config = Config::from_value(sample_document()).unwrap();
        config.set_strategy_name("smc_confluence");
        let effective = config.resolve().unwrap();

        assert_eq!(effective.timeframe_minutes, 5);
        assert_eq!(effective.targets.stop_loss_points, 300.0);
        assert_eq!(effective.targets.max_sl_points, 1000.0);
        assert_eq!(effective.targets.atr_sl_mult, 1.6);
    }

    #[test]
    fn test_strategy_without_overrides_uses_base() {
        let mut config = Config::from_value(sample_document()).unwrap();
        config.set_strategy_name("rsi_reversal");
        let effective = config.resolve().unwrap();
        assert_eq!(effective.targets.stop_loss_points, 650.0);
    }

    #[test]
    fn test_missing_strategy_name_is_fatal() {
        let config = Config::from_value(json!({ "symbol": "XAUUSD" })).unwrap();
        assert!(matches!(config.resolve(), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = Config::from_value(json!({
            "strategy": { "name": "rsi_reversal" },
            "protection": { "partial_tp": { "ratio": 1.5 } }
        }))
        .unwrap();
        assert!(matches!(config.resolve(), Err(ConfigError::Invalid { .. })));

        let config = Config::from_value(json!({
            "strategy": { "name": "rsi_reversal" },
            "indicators": { "macd_fast": 30, "macd_slow": 26 }
        }))
        .unwrap();
        assert!(config.resolve().is_err());

        let config = Config::from_value(json!({
            "strategy": { "name": "rsi_reversal" },
            "history_bars": 50
        }))
        .unwrap();
        assert!(config.resolve().is_err());
    }

    #[test]
    fn test_defaults_validate() {
        assert!(EffectiveConfig::default().validate().is_ok());
    }

    #[test]
    fn test_session_wraps_midnight() {
        let session = SessionConfig {
            start_hour: 22,
            end_hour: 3,
        };
        assert!(session.contains_hour(23));
        assert!(session.contains_hour(2));
        assert!(!session.contains_hour(12));

        let day = SessionConfig {
            start_hour: 13,
            end_hour: 23,
        };
        assert!(day.contains_hour(13));
        assert!(day.contains_hour(23));
        assert!(!day.contains_hour(7));
    }

    #[test]
    fn test_merge_json_replaces_scalars_and_arrays() {
        let mut base = json!({ "a": { "b": 1, "c": [1, 2] }, "d": 1 });
        merge_json(&mut base, &json!({ "a": { "c": [3] }, "e": true }));
        assert_eq!(base, json!({ "a": { "b": 1, "c": [3] }, "d": 1, "e": true }));
    }
}
