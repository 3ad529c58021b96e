//! Configuration and shared value types for the trading engine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default file the trade ledger snapshot is written to.
pub const DEFAULT_LEDGER_FILE: &str = "trading_memory.json";

/// Engine and agent configuration.
///
/// Interval fields are in milliseconds so tests can run the agent loop at
/// high speed; the defaults reproduce the production cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    /// Where ledger snapshots are persisted
    pub ledger_path: String,
    /// Records retained per ledger category
    pub max_records_per_category: usize,
    /// Probability an agent decision is a BUY (otherwise SELL)
    pub buy_probability: f64,
    /// Agents skip BUY at or below this SOL balance
    pub min_sol_balance: f64,
    /// Lower bound of the balance fraction traded per decision
    pub trade_fraction_min: f64,
    /// Upper bound of the balance fraction traded per decision
    pub trade_fraction_max: f64,
    /// Minimum pause between agent decisions
    pub decision_interval_min_ms: u64,
    /// Maximum pause between agent decisions
    pub decision_interval_max_ms: u64,
    /// Poll interval while an agent has nothing to do
    pub idle_poll_ms: u64,
    /// Pause after an unexpected fault in a decision cycle
    pub error_backoff_ms: u64,
    /// How long enable() waits for a previous loop before aborting it
    pub shutdown_grace_ms: u64,
    /// Market feed cadence
    pub market_update_interval_seconds: u64,
    /// Pool SOL reserve pushed by the market feed
    pub feed_reserve_sol: f64,
    /// Pool token reserve pushed by the market feed
    pub feed_reserve_token: f64,
    /// Reference SOL/USD rate used before the first update and on fetch failure
    pub fallback_sol_price_usd: f64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            ledger_path: DEFAULT_LEDGER_FILE.to_string(),
            max_records_per_category: 500,
            buy_probability: 0.7,
            min_sol_balance: 0.01,
            trade_fraction_min: 0.01,
            trade_fraction_max: 0.05,
            decision_interval_min_ms: 30_000,
            decision_interval_max_ms: 120_000,
            idle_poll_ms: 5_000,
            error_backoff_ms: 10_000,
            shutdown_grace_ms: 2_000,
            market_update_interval_seconds: 60,
            feed_reserve_sol: 5.0,
            feed_reserve_token: 100_000.0,
            fallback_sol_price_usd: 120.0,
        }
    }
}

impl TradingConfig {
    /// Load a config from a JSON file. Missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn market_update_interval(&self) -> Duration {
        Duration::from_secs(self.market_update_interval_seconds)
    }
}

/// Token price in both units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceQuote {
    pub sol: f64,
    pub usd: f64,
}

/// Result of a successful swap.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapReceipt {
    /// Amount the wallet paid in (SOL on buy, tokens on sell)
    pub amount_in: f64,
    /// Amount credited to the wallet (tokens on buy, SOL on sell)
    pub amount_out: f64,
    /// Token price in SOL after the swap
    pub new_price_sol: f64,
    pub record: crate::types::TradeRecord,
}
