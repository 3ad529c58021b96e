//! Trading module - constant-product pool, swap engine and per-wallet agents.
//!
//! The [`SwapEngine`] owns the pool, the wallet store and the trade ledger
//! behind one lock. [`AgentScheduler`] runs one [`TradingAgent`] per enabled
//! wallet, [`MarketFeed`] pushes reserve/rate updates, and [`LedgerWriter`]
//! persists every committed snapshot.

pub mod types;
pub mod swap;
pub mod market;
pub mod wallet_store;
pub mod trade_ledger;
pub mod storage;
pub mod metrics;
pub mod engine;
pub mod agent;
pub mod scheduler;
pub mod market_feed;

// Re-export main types
pub use types::{PriceQuote, SwapReceipt, TradingConfig, DEFAULT_LEDGER_FILE};
pub use market::{MarketMetrics, MarketState};
pub use wallet_store::{WalletBalance, WalletStore};
pub use trade_ledger::{LedgerSnapshot, RecordCategory, TradeLedger};
pub use storage::{InMemoryStorage, JsonFileStorage, LedgerStorage, LedgerWriter};

// Re-export key components
pub use engine::SwapEngine;
pub use agent::{AgentDecision, TradingAgent};
pub use scheduler::{AgentPhase, AgentScheduler};
pub use market_feed::{CoinGeckoRateSource, FixedRateSource, MarketFeed, ReferenceRateSource};
pub use metrics::{MetricsSnapshot, TradingMetrics};

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Builder wiring the engine, scheduler and ledger writer together.
pub struct TradingBuilder {
    config: TradingConfig,
    wallets: WalletStore,
    initial_market: Option<(f64, f64, f64)>,
    storage: Option<Arc<dyn LedgerStorage>>,
    seed: Option<u64>,
}

impl TradingBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: TradingConfig::default(),
            wallets: WalletStore::new(),
            initial_market: None,
            storage: None,
            seed: None,
        }
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: TradingConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the ledger file path (used when no storage backend is given).
    pub fn with_ledger_path(mut self, path: impl Into<String>) -> Self {
        self.config.ledger_path = path.into();
        self
    }

    /// Set the agent decision cadence in milliseconds.
    pub fn with_decision_interval(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.config.decision_interval_min_ms = min_ms;
        self.config.decision_interval_max_ms = max_ms;
        self
    }

    /// Set the number of records kept per ledger category.
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.config.max_records_per_category = max_records;
        self
    }

    pub fn with_wallets(mut self, wallets: WalletStore) -> Self {
        self.wallets = wallets;
        self
    }

    /// Seed the pool before the first feed update.
    pub fn with_initial_market(mut self, reserve_sol: f64, reserve_token: f64, sol_price_usd: f64) -> Self {
        self.initial_market = Some((reserve_sol, reserve_token, sol_price_usd));
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn LedgerStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Deterministic agent RNG seeding.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build the configuration only.
    pub fn build_config(self) -> TradingConfig {
        self.config
    }

    /// Build the scheduler and the ledger writer. The writer must be spawned
    /// by the caller; it exits once the scheduler and every engine clone are
    /// dropped.
    pub async fn build(self) -> Result<(AgentScheduler, LedgerWriter)> {
        let storage: Arc<dyn LedgerStorage> = match self.storage {
            Some(storage) => storage,
            None => Arc::new(JsonFileStorage::new(&self.config.ledger_path)),
        };

        let previous = match storage.load().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Failed to load previous ledger, starting empty: {:#}", e);
                LedgerSnapshot::default()
            }
        };
        let ledger = TradeLedger::from_snapshot(&previous, self.config.max_records_per_category);

        let market = match self.initial_market {
            Some((reserve_sol, reserve_token, sol_price_usd)) => {
                MarketState::with_reserves(reserve_sol, reserve_token, sol_price_usd)?
            }
            None => MarketState::new(self.config.fallback_sol_price_usd),
        };

        let (snapshot_sender, snapshot_receiver) = mpsc::unbounded_channel();
        let engine = SwapEngine::new(market, self.wallets, ledger).with_snapshot_sender(snapshot_sender);

        info!(
            "Trading engine built: {} restored sniper actions, cap {} per category",
            previous.sniper_actions.len().min(self.config.max_records_per_category),
            self.config.max_records_per_category
        );

        let mut scheduler = AgentScheduler::new(engine, self.config);
        if let Some(seed) = self.seed {
            scheduler = scheduler.with_seed(seed);
        }

        Ok((scheduler, LedgerWriter::new(storage, snapshot_receiver)))
    }
}

impl Default for TradingBuilder {
    fn default() -> Self {
        Self::new()
    }
}
