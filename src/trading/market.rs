//! Pool reserves and the prices derived from them.

use crate::error::{TradingError, TradingResult};
use crate::trading::swap::spot_price;
use crate::trading::types::PriceQuote;
use serde::{Deserialize, Serialize};

/// Market metrics block of the persisted ledger.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MarketMetrics {
    pub current_price_sol: f64,
    pub current_price_usd: f64,
    pub liquidity_pool_sol: f64,
    pub liquidity_pool_tokens: f64,
}

/// State of the single SOL/token pool.
///
/// Lives inside the engine's critical section; the setters here are only
/// called with that lock held.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketState {
    reserve_sol: f64,
    reserve_token: f64,
    sol_price_usd: f64,
    token_price_sol: f64,
    token_price_usd: f64,
}

impl MarketState {
    /// Empty pool with a reference SOL/USD rate.
    pub fn new(sol_price_usd: f64) -> Self {
        Self {
            reserve_sol: 0.0,
            reserve_token: 0.0,
            sol_price_usd,
            token_price_sol: 0.0,
            token_price_usd: 0.0,
        }
    }

    /// Pool seeded with reserves.
    pub fn with_reserves(reserve_sol: f64, reserve_token: f64, sol_price_usd: f64) -> TradingResult<Self> {
        let mut state = Self::new(sol_price_usd);
        state.update(reserve_sol, reserve_token, sol_price_usd)?;
        Ok(state)
    }

    /// Replace reserves and reference rate from the market feed.
    pub fn update(&mut self, reserve_sol: f64, reserve_token: f64, sol_price_usd: f64) -> TradingResult<()> {
        for (label, value) in [
            ("reserve_sol", reserve_sol),
            ("reserve_token", reserve_token),
            ("sol_price_usd", sol_price_usd),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(TradingError::InvalidMarketData(format!("{} = {}", label, value)));
            }
        }

        self.reserve_sol = reserve_sol;
        self.reserve_token = reserve_token;
        self.sol_price_usd = sol_price_usd;
        self.refresh_prices();
        Ok(())
    }

    /// Commit reserves computed by a swap.
    pub(crate) fn apply_swap(&mut self, reserve_sol: f64, reserve_token: f64) {
        self.reserve_sol = reserve_sol;
        self.reserve_token = reserve_token;
        self.refresh_prices();
    }

    // Keeps the last known price while the token side is empty.
    fn refresh_prices(&mut self) {
        if let Some(price) = spot_price(self.reserve_sol, self.reserve_token) {
            self.token_price_sol = price;
            self.token_price_usd = price * self.sol_price_usd;
        }
    }

    pub fn reserves(&self) -> (f64, f64) {
        (self.reserve_sol, self.reserve_token)
    }

    pub fn has_liquidity(&self) -> bool {
        self.reserve_sol > 0.0 && self.reserve_token > 0.0
    }

    pub fn price(&self) -> PriceQuote {
        PriceQuote {
            sol: self.token_price_sol,
            usd: self.token_price_usd,
        }
    }

    pub fn metrics(&self) -> MarketMetrics {
        MarketMetrics {
            current_price_sol: self.token_price_sol,
            current_price_usd: self.token_price_usd,
            liquidity_pool_sol: self.reserve_sol,
            liquidity_pool_tokens: self.reserve_token,
        }
    }
}
