//! Tests for swap engine invariants under sequential and concurrent load

use sniper_swarm::trading::{MarketState, RecordCategory, SwapEngine, TradeLedger, WalletStore};
use sniper_swarm::{TradingError, Wallet};
use std::sync::Arc;

fn engine(wallets: Vec<Wallet>, reserve_sol: f64, reserve_token: f64) -> SwapEngine {
    let mut store = WalletStore::new();
    for wallet in wallets {
        store.insert(wallet);
    }
    let market = MarketState::with_reserves(reserve_sol, reserve_token, 120.0).expect("valid market");
    SwapEngine::new(market, store, TradeLedger::new(500))
}

fn close(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol
}

#[tokio::test]
async fn test_buy_then_sell_everything_restores_pool() {
    let engine = engine(vec![Wallet::new("w1", "sniper-1", 1.0, 0.0)], 5.0, 100_000.0);

    let buy = engine.buy("w1", 0.1).await.expect("buy");
    assert!(close(buy.amount_out, 1_960.7843, 1e-4));

    let sell = engine.sell("w1", buy.amount_out).await.expect("sell");
    assert!(close(sell.amount_out, 0.1, 1e-9));

    let (rs, rt) = engine.reserves().await;
    assert!(close(rs, 5.0, 1e-9));
    assert!(close(rt, 100_000.0, 1e-6));

    let wallet = engine.get_wallet("w1").await.unwrap();
    assert!(close(wallet.sol_balance, 1.0, 1e-9));
    assert_eq!(wallet.token_balance, 0.0);
}

#[tokio::test]
async fn test_each_swap_preserves_k_and_conserves_assets() {
    let engine = engine(
        vec![
            Wallet::new("a", "alpha", 3.0, 5_000.0),
            Wallet::new("b", "beta", 2.0, 0.0),
        ],
        5.0,
        100_000.0,
    );

    let (start_wallets, (start_rs, start_rt)) = engine.supply().await;
    let total_sol = start_wallets.sol_balance + start_rs;
    let total_tokens = start_wallets.token_balance + start_rt;

    for step in 0..60 {
        let (rs, rt) = engine.reserves().await;
        let k_before = rs * rt;
        let who = if step % 2 == 0 { "a" } else { "b" };
        let before = engine.get_wallet(who).await.unwrap();

        if step % 3 == 0 && before.token_balance > 0.0 {
            let amount = before.token_balance * 0.2;
            let receipt = engine.sell(who, amount).await.expect("sell");
            let after = engine.get_wallet(who).await.unwrap();
            assert!(close(after.token_balance, before.token_balance - amount, 1e-9));
            assert!(close(after.sol_balance, before.sol_balance + receipt.amount_out, 1e-12));
        } else {
            let amount = before.sol_balance * 0.05;
            let receipt = engine.buy(who, amount).await.expect("buy");
            let after = engine.get_wallet(who).await.unwrap();
            assert!(close(after.sol_balance, before.sol_balance - amount, 1e-12));
            assert!(close(after.token_balance, before.token_balance + receipt.amount_out, 1e-9));
        }

        let (rs, rt) = engine.reserves().await;
        assert!(close(rs * rt, k_before, k_before * 1e-12), "k drifted at step {}", step);
    }

    let (end_wallets, (end_rs, end_rt)) = engine.supply().await;
    assert!(close(end_wallets.sol_balance + end_rs, total_sol, 1e-9));
    assert!(close(end_wallets.token_balance + end_rt, total_tokens, 1e-6));
}

#[tokio::test]
async fn test_concurrent_swaps_never_go_negative() {
    let engine = engine(vec![Wallet::new("shared", "shared", 1.0, 2_000.0)], 5.0, 100_000.0);
    let (start_wallets, (start_rs, _)) = engine.supply().await;
    let total_sol = start_wallets.sol_balance + start_rs;

    let mut handles = Vec::new();
    for task in 0..16 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..50 {
                // deliberately oversized amounts so some swaps must be rejected
                if (task + i) % 2 == 0 {
                    let _ = engine.buy("shared", 0.15).await;
                } else {
                    let _ = engine.sell("shared", 900.0).await;
                }
            }
        }));
    }
    for handle in handles {
        handle.await.expect("task panicked");
    }

    let wallet = engine.get_wallet("shared").await.unwrap();
    let (rs, rt) = engine.reserves().await;
    assert!(wallet.sol_balance >= 0.0, "sol went negative: {}", wallet.sol_balance);
    assert!(wallet.token_balance >= 0.0, "tokens went negative: {}", wallet.token_balance);
    assert!(rs > 0.0 && rt > 0.0);
    assert!(close(wallet.sol_balance + rs, total_sol, 1e-9));
}

#[tokio::test]
async fn test_ledger_cap_through_engine() {
    let engine = engine(vec![Wallet::new("w1", "sniper-1", 100.0, 0.0)], 5.0, 100_000.0);
    for _ in 0..520 {
        engine.buy("w1", 0.001).await.expect("buy");
    }

    let snapshot = engine.ledger_snapshot().await;
    assert_eq!(snapshot.sniper_actions.len(), 500);
    let trades = engine.recent_trades(RecordCategory::SniperActions, 1_000).await;
    assert_eq!(trades.len(), 500);
    // newest record matches the current pool
    let (rs, _) = engine.reserves().await;
    assert_eq!(trades.last().unwrap().current_lp, rs);
}

#[tokio::test]
async fn test_exact_balance_can_be_spent() {
    let engine = engine(vec![Wallet::new("w1", "sniper-1", 0.5, 0.0)], 5.0, 100_000.0);
    engine.buy("w1", 0.5).await.expect("spending the whole balance is allowed");
    assert_eq!(engine.get_wallet("w1").await.unwrap().sol_balance, 0.0);
    assert!(matches!(
        engine.buy("w1", 0.0001).await,
        Err(TradingError::InsufficientBalance { .. })
    ));
}

#[tokio::test]
async fn test_engine_clones_share_state() {
    let engine = engine(vec![Wallet::new("w1", "sniper-1", 1.0, 0.0)], 5.0, 100_000.0);
    let other = Arc::new(engine.clone());
    other.buy("w1", 0.1).await.unwrap();
    assert_eq!(engine.reserves().await, other.reserves().await);
    assert_eq!(engine.recent_trades(RecordCategory::SniperActions, 5).await.len(), 1);
}
