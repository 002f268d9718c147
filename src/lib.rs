//! XAUUSD Strategies
//!
//! Signal evaluation and position protection for a gold (XAUUSD) trading
//! bot: an indicator pipeline, four interchangeable entry strategies, a
//! staged stop/target protection engine, risk sizing, and a polling loop
//! that drives them against a broker collaborator.

pub mod broker;
pub mod config;
pub mod data;
pub mod error;
pub mod indicators;
pub mod multi_timeframe;
pub mod news;
pub mod orders;
pub mod protection;
pub mod risk;
pub mod session;
pub mod strategies;
pub mod structure;
pub mod trader;
pub mod types;

pub use config::{Config, EffectiveConfig};
pub use error::{BrokerError, ConfigError, EngineError};
pub use strategies::{Decision, Strategy};
pub use types::*;
