//! Constant-product swap math (zero fee).
//!
//! Pure functions only: nothing here touches shared state. The engine calls
//! these inside its critical section and commits the returned reserves.

use crate::error::{TradingError, TradingResult};

/// Outcome of pricing an exact-input swap against a pool side pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwapQuote {
    /// Reserve of the asset paid in, after the swap
    pub new_reserve_in: f64,
    /// Reserve of the asset paid out, after the swap
    pub new_reserve_out: f64,
    /// Amount the trader receives
    pub amount_out: f64,
}

/// Validate a trade input amount.
pub fn validate_amount(amount: f64) -> TradingResult<()> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(TradingError::InvalidAmount(amount))
    }
}

/// Price an exact-input swap: `k = in * out`, `in' = in + x`, `out' = k / in'`.
pub fn quote_exact_in(reserve_in: f64, reserve_out: f64, amount_in: f64) -> TradingResult<SwapQuote> {
    validate_amount(amount_in)?;
    if !(reserve_in > 0.0 && reserve_out > 0.0) {
        return Err(TradingError::NoLiquidity);
    }

    let k = reserve_in * reserve_out;
    let new_reserve_in = reserve_in + amount_in;
    let new_reserve_out = k / new_reserve_in;

    Ok(SwapQuote {
        new_reserve_in,
        new_reserve_out,
        amount_out: reserve_out - new_reserve_out,
    })
}

/// SOL in, tokens out.
pub fn quote_buy(reserve_sol: f64, reserve_token: f64, amount_sol: f64) -> TradingResult<SwapQuote> {
    quote_exact_in(reserve_sol, reserve_token, amount_sol)
}

/// Tokens in, SOL out.
pub fn quote_sell(reserve_sol: f64, reserve_token: f64, amount_tokens: f64) -> TradingResult<SwapQuote> {
    quote_exact_in(reserve_token, reserve_sol, amount_tokens)
}

/// Token price in SOL, or `None` while the token reserve is empty.
pub fn spot_price(reserve_sol: f64, reserve_token: f64) -> Option<f64> {
    (reserve_token > 0.0).then(|| reserve_sol / reserve_token)
}
