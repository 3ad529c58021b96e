//! Autonomous per-wallet trading loop.
//!
//! An agent owns nothing shared except its cancellation receiver and enabled
//! flag; all state it reads or mutates goes through the [`SwapEngine`].

use anyhow::{bail, Result};
use futures::FutureExt;
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use crate::trading::engine::SwapEngine;
use crate::trading::metrics::AGENT_FAULTS_TOTAL;
use crate::trading::types::TradingConfig;
use crate::types::{Wallet, WalletId};

/// What an agent chose to do in one decision cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AgentDecision {
    /// Spend this much SOL
    Buy(f64),
    /// Sell this many tokens
    Sell(f64),
    /// Nothing to do this cycle
    Hold,
}

/// Counts live loop instances. Taken when the agent is built, so the count
/// is correct before the spawned task is first polled; released when the
/// agent is dropped, whether the loop returned or was aborted.
struct LiveLoopGuard(Arc<AtomicUsize>);

impl LiveLoopGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LiveLoopGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct TradingAgent {
    wallet_id: WalletId,
    engine: SwapEngine,
    config: Arc<TradingConfig>,
    enabled: Arc<AtomicBool>,
    cancel: watch::Receiver<bool>,
    rng: StdRng,
    _live: LiveLoopGuard,
}

impl TradingAgent {
    pub fn new(
        wallet_id: WalletId,
        engine: SwapEngine,
        config: Arc<TradingConfig>,
        enabled: Arc<AtomicBool>,
        cancel: watch::Receiver<bool>,
        rng: StdRng,
        live_loops: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            wallet_id,
            engine,
            config,
            enabled,
            cancel,
            rng,
            _live: LiveLoopGuard::new(live_loops),
        }
    }

    /// Run until cancelled. Swap errors, faults and panics inside a cycle are
    /// logged, never fatal.
    #[instrument(skip(self), fields(wallet = %self.wallet_id))]
    pub async fn run(mut self) {
        info!("Trading agent started for wallet {}", self.wallet_id);

        while !self.is_cancelled() {
            let outcome = AssertUnwindSafe(self.cycle()).catch_unwind().await;
            let pause = match outcome {
                Ok(Ok(pause)) => pause,
                Ok(Err(e)) => {
                    error!("Error in trading logic for wallet {}: {:#}", self.wallet_id, e);
                    self.fault_backoff().await
                }
                Err(_) => {
                    error!("Trading cycle for wallet {} panicked", self.wallet_id);
                    self.fault_backoff().await
                }
            };

            if self.sleep_or_cancel(pause).await {
                break;
            }
        }

        info!("Trading agent stopped for wallet {}", self.wallet_id);
    }

    /// One decision cycle. Returns how long to pause before the next one.
    async fn cycle(&mut self) -> Result<Duration> {
        if !self.enabled.load(Ordering::SeqCst) {
            return Ok(self.config.idle_poll());
        }

        let wallet = match self.engine.get_wallet(&self.wallet_id).await {
            Some(wallet) if !wallet.watch_only => wallet,
            _ => return Ok(self.config.idle_poll()),
        };
        if !wallet.sol_balance.is_finite() || !wallet.token_balance.is_finite() {
            bail!("wallet {} has non-finite balances", self.wallet_id);
        }

        match self.decide(&wallet) {
            AgentDecision::Buy(amount) => {
                if let Err(e) = self.engine.buy(&self.wallet_id, amount).await {
                    warn!("{} BUY of {:.4} SOL failed: {}", wallet.name, amount, e);
                }
            }
            AgentDecision::Sell(amount) => {
                if let Err(e) = self.engine.sell(&self.wallet_id, amount).await {
                    warn!("{} SELL of {:.2} tokens failed: {}", wallet.name, amount, e);
                }
            }
            AgentDecision::Hold => debug!("{} holds this cycle", wallet.name),
        }

        Ok(self.next_interval())
    }

    /// Sample an action: BUY with the configured probability, else SELL.
    /// BUY needs SOL above the dust threshold, SELL needs tokens.
    pub fn decide(&mut self, wallet: &Wallet) -> AgentDecision {
        let buy = self.rng.gen_bool(self.config.buy_probability.clamp(0.0, 1.0));

        if buy {
            if wallet.sol_balance > self.config.min_sol_balance {
                return AgentDecision::Buy(wallet.sol_balance * self.trade_fraction());
            }
        } else if wallet.token_balance > 0.0 {
            return AgentDecision::Sell(wallet.token_balance * self.trade_fraction());
        }

        AgentDecision::Hold
    }

    fn trade_fraction(&mut self) -> f64 {
        let (lo, hi) = (self.config.trade_fraction_min, self.config.trade_fraction_max);
        if hi > lo {
            self.rng.gen_range(lo..=hi)
        } else {
            lo
        }
    }

    fn next_interval(&mut self) -> Duration {
        let (lo, hi) = (self.config.decision_interval_min_ms, self.config.decision_interval_max_ms);
        let millis = if hi > lo { self.rng.gen_range(lo..=hi) } else { lo };
        Duration::from_millis(millis)
    }

    async fn fault_backoff(&self) -> Duration {
        self.engine.metrics().increment_counter(AGENT_FAULTS_TOTAL).await;
        self.config.error_backoff()
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Sleep for `pause`, waking early on cancellation. Returns true when the
    /// loop should exit.
    async fn sleep_or_cancel(&mut self, pause: Duration) -> bool {
        tokio::select! {
            _ = sleep(pause) => self.is_cancelled(),
            changed = self.cancel.changed() => changed.is_err() || self.is_cancelled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::market::MarketState;
    use crate::trading::trade_ledger::TradeLedger;
    use crate::trading::wallet_store::WalletStore;
    use rand::SeedableRng;

    fn agent_with(config: TradingConfig) -> (TradingAgent, watch::Sender<bool>) {
        let market = MarketState::with_reserves(5.0, 100_000.0, 120.0).unwrap();
        let mut store = WalletStore::new();
        store.insert(Wallet::new("w1", "sniper-1", 1.0, 0.0));
        let engine = SwapEngine::new(market, store, TradeLedger::new(500));
        let (tx, rx) = watch::channel(false);
        let agent = TradingAgent::new(
            "w1".to_string(),
            engine,
            Arc::new(config),
            Arc::new(AtomicBool::new(true)),
            rx,
            StdRng::seed_from_u64(7),
            Arc::new(AtomicUsize::new(0)),
        );
        (agent, tx)
    }

    #[test]
    fn test_decision_amounts_stay_within_fraction_bounds() {
        let (mut agent, _tx) = agent_with(TradingConfig::default());
        let wallet = Wallet::new("w1", "sniper-1", 2.0, 1_000.0);

        let (mut buys, mut sells) = (0, 0);
        for _ in 0..2_000 {
            match agent.decide(&wallet) {
                AgentDecision::Buy(amount) => {
                    assert!((0.02..=0.1).contains(&amount), "buy amount {}", amount);
                    buys += 1;
                }
                AgentDecision::Sell(amount) => {
                    assert!((10.0..=50.0).contains(&amount), "sell amount {}", amount);
                    sells += 1;
                }
                AgentDecision::Hold => panic!("funded wallet should always act"),
            }
        }
        // 70/30 split, loosely
        assert!(buys > 1_200 && sells > 400, "buys={} sells={}", buys, sells);
    }

    #[test]
    fn test_dust_and_empty_token_balance_hold() {
        let (mut agent, _tx) = agent_with(TradingConfig::default());
        let dust = Wallet::new("w1", "sniper-1", 0.01, 0.0);
        for _ in 0..200 {
            assert_eq!(agent.decide(&dust), AgentDecision::Hold);
        }
    }

    #[test]
    fn test_only_sells_when_buy_probability_is_zero() {
        let config = TradingConfig {
            buy_probability: 0.0,
            ..TradingConfig::default()
        };
        let (mut agent, _tx) = agent_with(config);
        let wallet = Wallet::new("w1", "sniper-1", 5.0, 100.0);
        for _ in 0..100 {
            assert!(matches!(agent.decide(&wallet), AgentDecision::Sell(_)));
        }
    }

    #[tokio::test]
    async fn test_loop_trades_and_exits_on_cancel() {
        let config = TradingConfig {
            buy_probability: 1.0,
            decision_interval_min_ms: 1,
            decision_interval_max_ms: 2,
            ..TradingConfig::default()
        };
        let (agent, tx) = agent_with(config);
        let engine = agent.engine.clone();
        let live = agent._live.0.clone();

        let handle = tokio::spawn(agent.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(live.load(Ordering::SeqCst), 1);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("agent should stop promptly")
            .unwrap();

        assert_eq!(live.load(Ordering::SeqCst), 0);
        let wallet = engine.get_wallet("w1").await.unwrap();
        assert!(wallet.sol_balance < 1.0);
        assert!(wallet.token_balance > 0.0);
    }

    #[tokio::test]
    async fn test_disabled_agent_idles_without_trading() {
        let config = TradingConfig {
            idle_poll_ms: 5,
            ..TradingConfig::default()
        };
        let (agent, tx) = agent_with(config);
        agent.enabled.store(false, Ordering::SeqCst);
        let engine = agent.engine.clone();

        let handle = tokio::spawn(agent.run());
        tokio::time::sleep(Duration::from_millis(40)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(engine.reserves().await, (5.0, 100_000.0));
    }

    #[tokio::test]
    async fn test_fault_backs_off_and_loop_recovers() {
        let config = TradingConfig {
            buy_probability: 1.0,
            decision_interval_min_ms: 1,
            decision_interval_max_ms: 2,
            error_backoff_ms: 5,
            ..TradingConfig::default()
        };
        let (agent, tx) = agent_with(config);
        let engine = agent.engine.clone();
        engine.overwrite_balances("w1", f64::NAN, 0.0).await;

        let handle = tokio::spawn(agent.run());
        tokio::time::sleep(Duration::from_millis(40)).await;

        let faults = engine.metrics().get_metrics_snapshot().await.counter(AGENT_FAULTS_TOTAL);
        assert!(faults >= 1, "faults={}", faults);
        assert!(!handle.is_finished());
        assert_eq!(engine.reserves().await, (5.0, 100_000.0));

        // once the wallet is healthy again the same loop resumes trading
        engine.overwrite_balances("w1", 1.0, 0.0).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!handle.is_finished());
        assert!(engine.get_wallet("w1").await.unwrap().token_balance > 0.0);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("agent should stop promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn test_panicking_cycle_does_not_end_loop() {
        // an out-of-range probability makes the decision step panic
        let config = TradingConfig {
            buy_probability: f64::NAN,
            decision_interval_min_ms: 1,
            decision_interval_max_ms: 2,
            error_backoff_ms: 2,
            ..TradingConfig::default()
        };
        let (agent, tx) = agent_with(config);
        let engine = agent.engine.clone();
        let live = agent._live.0.clone();

        let handle = tokio::spawn(agent.run());
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(!handle.is_finished());
        assert_eq!(live.load(Ordering::SeqCst), 1);
        let faults = engine.metrics().get_metrics_snapshot().await.counter(AGENT_FAULTS_TOTAL);
        assert!(faults >= 2, "faults={}", faults);

        tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }
}
