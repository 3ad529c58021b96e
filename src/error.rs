//! Error taxonomy for swap and market operations.
//!
//! Every variant is recoverable: the engine checks all preconditions before it
//! writes anything, so an error always means "nothing changed".

use crate::types::WalletId;
use thiserror::Error;

/// Asset side of a balance check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Asset {
    Sol,
    Token,
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Asset::Sol => f.write_str("SOL"),
            Asset::Token => f.write_str("token"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TradingError {
    #[error("Wallet not found")]
    WalletNotFound(WalletId),

    #[error("Wallet is watch-only")]
    WatchOnly(WalletId),

    #[error("Insufficient {asset} balance")]
    InsufficientBalance {
        asset: Asset,
        required: f64,
        available: f64,
    },

    #[error("No liquidity available")]
    NoLiquidity,

    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    #[error("Invalid market data: {0}")]
    InvalidMarketData(String),
}

pub type TradingResult<T> = std::result::Result<T, TradingError>;
