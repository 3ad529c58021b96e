//! Swap engine - the single mutation entry point for pool, wallets and ledger.
//!
//! Market state, the wallet store and the trade ledger share one mutex. Every
//! swap and every market update holds it for the full read-modify-write span:
//! all preconditions are checked first, then all writes are committed, so an
//! error never leaves a partial update behind. The committed snapshot is
//! handed to the ledger writer through a non-blocking channel before the
//! guard is dropped, which keeps persisted snapshots in commit order without
//! doing file I/O under the lock.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{Asset, TradingError, TradingResult};
use crate::trading::market::{MarketMetrics, MarketState};
use crate::trading::metrics::{TradingMetrics, MARKET_UPDATES_TOTAL};
use crate::trading::storage::SnapshotSender;
use crate::trading::swap::{quote_buy, quote_sell, validate_amount};
use crate::trading::trade_ledger::{LedgerSnapshot, RecordCategory, TradeLedger};
use crate::trading::types::{PriceQuote, SwapReceipt};
use crate::trading::wallet_store::{WalletBalance, WalletStore};
use crate::types::{TradeAction, TradeRecord, Wallet, WalletId};

/// Everything guarded by the engine lock.
#[derive(Debug)]
struct SharedState {
    market: MarketState,
    wallets: WalletStore,
    ledger: TradeLedger,
}

impl SharedState {
    fn execute_swap(&mut self, action: TradeAction, wallet_id: &str, amount_in: f64) -> TradingResult<SwapReceipt> {
        // Check everything before touching anything.
        validate_amount(amount_in)?;

        let wallet = self
            .wallets
            .get_wallet(wallet_id)
            .ok_or_else(|| TradingError::WalletNotFound(wallet_id.to_string()))?;
        if wallet.watch_only {
            return Err(TradingError::WatchOnly(wallet_id.to_string()));
        }

        let (asset, available) = match action {
            TradeAction::Buy => (Asset::Sol, wallet.sol_balance),
            TradeAction::Sell => (Asset::Token, wallet.token_balance),
        };
        // Negated so a NaN balance fails the check.
        if !(available >= amount_in) {
            return Err(TradingError::InsufficientBalance {
                asset,
                required: amount_in,
                available,
            });
        }

        let (reserve_sol, reserve_token) = self.market.reserves();
        let (new_reserve_sol, new_reserve_token, amount_out) = match action {
            TradeAction::Buy => {
                let quote = quote_buy(reserve_sol, reserve_token, amount_in)?;
                (quote.new_reserve_in, quote.new_reserve_out, quote.amount_out)
            }
            TradeAction::Sell => {
                let quote = quote_sell(reserve_sol, reserve_token, amount_in)?;
                (quote.new_reserve_out, quote.new_reserve_in, quote.amount_out)
            }
        };

        // Commit.
        let wallet = self
            .wallets
            .get_wallet_mut(wallet_id)
            .ok_or_else(|| TradingError::WalletNotFound(wallet_id.to_string()))?;
        match action {
            TradeAction::Buy => {
                wallet.sol_balance -= amount_in;
                wallet.token_balance += amount_out;
            }
            TradeAction::Sell => {
                wallet.token_balance -= amount_in;
                wallet.sol_balance += amount_out;
            }
        }
        let bot = wallet.name.clone();

        self.market.apply_swap(new_reserve_sol, new_reserve_token);
        let new_price_sol = self.market.price().sol;

        let record = TradeRecord {
            bot,
            action,
            quantity: match action {
                TradeAction::Buy => amount_out,
                TradeAction::Sell => amount_in,
            },
            price_sol: new_price_sol,
            current_lp: new_reserve_sol,
            timestamp: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
        };
        self.ledger.append(RecordCategory::SniperActions, record.clone());

        Ok(SwapReceipt {
            amount_in,
            amount_out,
            new_price_sol,
            record,
        })
    }

    fn snapshot(&self) -> LedgerSnapshot {
        self.ledger.snapshot(self.market.metrics(), self.wallets.balances_by_name())
    }
}

/// Shared handle to the pool, wallets and ledger. Cheap to clone; every
/// agent task holds its own clone.
#[derive(Clone)]
pub struct SwapEngine {
    state: Arc<Mutex<SharedState>>,
    snapshot_sender: Option<SnapshotSender>,
    metrics: TradingMetrics,
}

impl SwapEngine {
    pub fn new(market: MarketState, wallets: WalletStore, ledger: TradeLedger) -> Self {
        Self {
            state: Arc::new(Mutex::new(SharedState { market, wallets, ledger })),
            snapshot_sender: None,
            metrics: TradingMetrics::new(),
        }
    }

    /// Publish a snapshot on every committed mutation.
    pub fn with_snapshot_sender(mut self, sender: SnapshotSender) -> Self {
        self.snapshot_sender = Some(sender);
        self
    }

    pub fn with_metrics(mut self, metrics: TradingMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &TradingMetrics {
        &self.metrics
    }

    /// Spend `amount_sol` of the wallet's SOL on tokens.
    #[instrument(skip(self))]
    pub async fn buy(&self, wallet_id: &str, amount_sol: f64) -> TradingResult<SwapReceipt> {
        self.swap(TradeAction::Buy, wallet_id, amount_sol).await
    }

    /// Sell `amount_tokens` of the wallet's tokens for SOL.
    #[instrument(skip(self))]
    pub async fn sell(&self, wallet_id: &str, amount_tokens: f64) -> TradingResult<SwapReceipt> {
        self.swap(TradeAction::Sell, wallet_id, amount_tokens).await
    }

    async fn swap(&self, action: TradeAction, wallet_id: &str, amount_in: f64) -> TradingResult<SwapReceipt> {
        let result = {
            let mut state = self.state.lock().await;
            let result = state.execute_swap(action, wallet_id, amount_in);
            if result.is_ok() {
                self.publish(&state);
            }
            result
        };

        match &result {
            Ok(receipt) => {
                match action {
                    TradeAction::Buy => info!(
                        "{} BUY: {:.2} tokens for {:.3} SOL",
                        receipt.record.bot, receipt.amount_out, receipt.amount_in
                    ),
                    TradeAction::Sell => info!(
                        "{} SELL: {:.2} tokens for {:.3} SOL",
                        receipt.record.bot, receipt.amount_in, receipt.amount_out
                    ),
                }
                let sol_amount = match action {
                    TradeAction::Buy => receipt.amount_in,
                    TradeAction::Sell => receipt.amount_out,
                };
                self.metrics.record_swap(action, sol_amount).await;
            }
            Err(e) => {
                debug!("{} for wallet {} rejected: {}", action, wallet_id, e);
                self.metrics.record_rejection(e).await;
            }
        }

        result
    }

    /// Replace pool reserves and the reference SOL/USD rate.
    #[instrument(skip(self))]
    pub async fn update_market_data(
        &self,
        reserve_sol: f64,
        reserve_token: f64,
        sol_price_usd: f64,
    ) -> TradingResult<()> {
        {
            let mut state = self.state.lock().await;
            state.market.update(reserve_sol, reserve_token, sol_price_usd)?;
            self.publish(&state);
        }
        self.metrics.increment_counter(MARKET_UPDATES_TOTAL).await;
        Ok(())
    }

    /// Append a record produced outside the swap path (volume bots, signals).
    pub async fn append_record(&self, category: RecordCategory, record: TradeRecord) {
        let mut state = self.state.lock().await;
        state.ledger.append(category, record);
        self.publish(&state);
    }

    /// Register a wallet, replacing one with the same id.
    pub async fn register_wallet(&self, wallet: Wallet) -> WalletId {
        let mut state = self.state.lock().await;
        let id = state.wallets.insert(wallet);
        self.publish(&state);
        id
    }

    pub async fn create_wallet(&self, name: &str) -> WalletId {
        let mut state = self.state.lock().await;
        let id = state.wallets.create_wallet(name);
        self.publish(&state);
        id
    }

    pub async fn add_watch_wallet(&self, name: &str, pubkey: &str) -> WalletId {
        let mut state = self.state.lock().await;
        let id = state.wallets.add_watch_wallet(name, pubkey);
        self.publish(&state);
        id
    }

    /// Drop a wallet from the store. Its balances leave the persisted ledger.
    pub async fn remove_wallet(&self, wallet_id: &str) -> Option<Wallet> {
        let mut state = self.state.lock().await;
        let removed = state.wallets.remove_wallet(wallet_id)?;
        self.publish(&state);
        Some(removed)
    }

    pub async fn set_active_wallet(&self, wallet_id: &str) -> bool {
        self.state.lock().await.wallets.set_active_wallet(wallet_id)
    }

    pub async fn active_wallet(&self) -> Option<Wallet> {
        let state = self.state.lock().await;
        let id = state.wallets.active_wallet_id()?;
        state.wallets.get_wallet(id).cloned()
    }

    pub async fn set_network(&self, network: &str) -> bool {
        self.state.lock().await.wallets.set_network(network)
    }

    pub async fn current_network(&self) -> String {
        self.state.lock().await.wallets.current_network().to_string()
    }

    /// Write the wallet config file. The store is copied under the lock and
    /// written after it is released.
    pub async fn save_wallets(&self, path: impl AsRef<Path>) -> Result<()> {
        let wallets = self.state.lock().await.wallets.clone();
        wallets.save_to_file(path)
    }

    /// Empty every ledger category.
    #[instrument(skip(self))]
    pub async fn clear_ledger(&self) {
        let mut state = self.state.lock().await;
        state.ledger.clear();
        self.publish(&state);
        info!("Trade ledger cleared");
    }

    // Bypasses registration checks to simulate a corrupted wallet.
    #[cfg(test)]
    pub(crate) async fn overwrite_balances(&self, wallet_id: &str, sol_balance: f64, token_balance: f64) {
        let mut state = self.state.lock().await;
        if let Some(wallet) = state.wallets.get_wallet_mut(wallet_id) {
            wallet.sol_balance = sol_balance;
            wallet.token_balance = token_balance;
        }
    }

    pub async fn get_wallet(&self, wallet_id: &str) -> Option<Wallet> {
        self.state.lock().await.wallets.get_wallet(wallet_id).cloned()
    }

    pub async fn all_wallets(&self) -> Vec<Wallet> {
        self.state.lock().await.wallets.all_wallets()
    }

    pub async fn current_price(&self) -> PriceQuote {
        self.state.lock().await.market.price()
    }

    /// `(reserve_sol, reserve_token)`
    pub async fn reserves(&self) -> (f64, f64) {
        self.state.lock().await.market.reserves()
    }

    pub async fn market_metrics(&self) -> MarketMetrics {
        self.state.lock().await.market.metrics()
    }

    /// Wallet totals and pool reserves read under one lock acquisition.
    pub async fn supply(&self) -> (WalletBalance, (f64, f64)) {
        let state = self.state.lock().await;
        (state.wallets.totals(), state.market.reserves())
    }

    pub async fn ledger_snapshot(&self) -> LedgerSnapshot {
        self.state.lock().await.snapshot()
    }

    /// The newest `limit` records of a category, oldest first.
    pub async fn recent_trades(&self, category: RecordCategory, limit: usize) -> Vec<TradeRecord> {
        let state = self.state.lock().await;
        let len = state.ledger.len(category);
        state
            .ledger
            .records(category)
            .skip(len.saturating_sub(limit))
            .cloned()
            .collect()
    }

    // Called with the lock held; the send never blocks.
    fn publish(&self, state: &SharedState) {
        if let Some(sender) = &self.snapshot_sender {
            if sender.send(state.snapshot()).is_err() {
                warn!("Ledger writer is gone, snapshot not persisted");
            }
        }
    }
}
