//! Core types and data structures for the sniper-swarm trading simulator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A simple public key representation (display only, never used for signing)
pub type Pubkey = String;

/// Opaque wallet identifier assigned by the wallet store
pub type WalletId = String;

/// A simulated wallet taking part in the pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    /// Identifier the wallet is registered under
    #[serde(default)]
    pub id: WalletId,
    /// Human-readable name, used as the bot name in the trade ledger
    #[serde(default = "default_wallet_name")]
    pub name: String,
    /// Public key shown on dashboards
    #[serde(default)]
    pub pubkey: Pubkey,
    /// Balance of the base currency (SOL)
    #[serde(default)]
    pub sol_balance: f64,
    /// Balance of the pool token
    #[serde(default)]
    pub token_balance: f64,
    /// Watch-only wallets are tracked but never trade
    #[serde(default)]
    pub watch_only: bool,
}

fn default_wallet_name() -> String {
    "Unknown".to_string()
}

impl Wallet {
    /// Create a tradeable wallet with the given balances.
    pub fn new(id: impl Into<WalletId>, name: impl Into<String>, sol_balance: f64, token_balance: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            pubkey: Pubkey::new(),
            sol_balance,
            token_balance,
            watch_only: false,
        }
    }

    /// Mark this wallet as watch-only.
    pub fn watch_only(mut self) -> Self {
        self.watch_only = true;
        self
    }
}

/// Direction of a swap against the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    /// SOL in, tokens out
    Buy,
    /// Tokens in, SOL out
    Sell,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "BUY",
            TradeAction::Sell => "SELL",
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An executed trade as stored in the ledger. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Display name of the wallet that traded
    pub bot: String,
    /// BUY or SELL
    pub action: TradeAction,
    /// Token quantity: received on BUY, sold on SELL
    pub quantity: f64,
    /// Token price in SOL after the swap
    pub price_sol: f64,
    /// Pool SOL reserve after the swap
    pub current_lp: f64,
    /// Unix timestamp in seconds
    pub timestamp: f64,
}
