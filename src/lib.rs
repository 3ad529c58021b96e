//! sniper-swarm - concurrent trading simulator for a single constant-product pool
//!
//! Autonomous per-wallet agents trade SOL against one token through a shared
//! swap engine that keeps pool reserves, wallet balances and the trade ledger
//! consistent under concurrency.

pub mod types;
pub mod error;
pub mod trading;

// Re-export main types for convenience
pub use error::{TradingError, TradingResult};
pub use types::{TradeAction, TradeRecord, Wallet, WalletId};
