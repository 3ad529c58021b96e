//! Agent scheduler - one trading loop per enabled wallet.
//!
//! Each wallet has a single [`AgentState`] behind its own mutex, so
//! enable/disable calls for the same wallet are serialized while different
//! wallets never wait on each other. Re-enabling always retires the previous
//! loop instance first: it is cancelled, given `shutdown_grace` to exit, and
//! aborted and awaited if it overruns, so two instances never coexist.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use crate::error::TradingResult;
use crate::trading::agent::TradingAgent;
use crate::trading::engine::SwapEngine;
use crate::trading::types::{PriceQuote, TradingConfig};
use crate::types::WalletId;

/// Lifecycle phase of a wallet's agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    Disabled,
    Starting,
    Running,
    Stopping,
}

/// Per-wallet agent record, owned by the scheduler.
pub struct AgentState {
    phase: AgentPhase,
    enabled: Arc<AtomicBool>,
    cancel: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl AgentState {
    fn new() -> Self {
        Self {
            phase: AgentPhase::Disabled,
            enabled: Arc::new(AtomicBool::new(false)),
            cancel: None,
            handle: None,
        }
    }

    fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    // Terminal phases collapse back to Disabled once the loop has exited.
    fn refresh_phase(&mut self) -> AgentPhase {
        if matches!(self.phase, AgentPhase::Running | AgentPhase::Stopping) && !self.is_running() {
            self.phase = AgentPhase::Disabled;
        }
        self.phase
    }

    fn signal_stop(&mut self) {
        self.enabled.store(false, Ordering::SeqCst);
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(true);
        }
        if self.phase != AgentPhase::Disabled {
            self.phase = AgentPhase::Stopping;
        }
    }
}

pub struct AgentScheduler {
    engine: SwapEngine,
    config: Arc<TradingConfig>,
    agents: Mutex<HashMap<WalletId, Arc<Mutex<AgentState>>>>,
    seed: Option<u64>,
    spawned: AtomicU64,
    live_loops: Arc<AtomicUsize>,
}

impl AgentScheduler {
    pub fn new(engine: SwapEngine, config: TradingConfig) -> Self {
        Self {
            engine,
            config: Arc::new(config),
            agents: Mutex::new(HashMap::new()),
            seed: None,
            spawned: AtomicU64::new(0),
            live_loops: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Seed agent RNGs deterministically (each loop gets `seed + n`).
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn engine(&self) -> &SwapEngine {
        &self.engine
    }

    pub fn config(&self) -> &TradingConfig {
        &self.config
    }

    /// Start (or restart) the trading loop for a wallet.
    /// Returns false for unknown and watch-only wallets.
    #[instrument(skip(self))]
    pub async fn enable_trading(&self, wallet_id: &str) -> bool {
        match self.engine.get_wallet(wallet_id).await {
            Some(wallet) if wallet.watch_only => {
                warn!("Wallet {} is watch-only, trading not enabled", wallet_id);
                return false;
            }
            Some(_) => {}
            None => {
                warn!("Cannot enable trading for unknown wallet {}", wallet_id);
                return false;
            }
        }

        let slot = self.slot(wallet_id).await;
        let mut agent = slot.lock().await;

        self.retire_loop(wallet_id, &mut agent).await;

        agent.phase = AgentPhase::Starting;
        agent.enabled = Arc::new(AtomicBool::new(true));
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let trading_agent = TradingAgent::new(
            wallet_id.to_string(),
            self.engine.clone(),
            self.config.clone(),
            agent.enabled.clone(),
            cancel_rx,
            self.next_rng(),
            self.live_loops.clone(),
        );
        agent.handle = Some(tokio::spawn(trading_agent.run()));
        agent.cancel = Some(cancel_tx);
        agent.phase = AgentPhase::Running;

        info!("Trading enabled for wallet {}", wallet_id);
        true
    }

    /// Signal the wallet's loop to stop. The loop exits at its next decision
    /// point; an in-flight swap is never interrupted.
    #[instrument(skip(self))]
    pub async fn disable_trading(&self, wallet_id: &str) -> bool {
        let slot = match self.agents.lock().await.get(wallet_id).cloned() {
            Some(slot) => slot,
            None => return true,
        };

        let mut agent = slot.lock().await;
        agent.signal_stop();
        agent.refresh_phase();
        info!("Trading disabled for wallet {}", wallet_id);
        true
    }

    /// Stop the wallet's loop, wait for it to exit, then drop the wallet.
    #[instrument(skip(self))]
    pub async fn remove_wallet(&self, wallet_id: &str) -> bool {
        let slot = self.agents.lock().await.remove(wallet_id);
        if let Some(slot) = slot {
            let mut agent = slot.lock().await;
            self.retire_loop(wallet_id, &mut agent).await;
        }
        match self.engine.remove_wallet(wallet_id).await {
            Some(wallet) => {
                info!("Removed wallet {} ({})", wallet.name, wallet_id);
                true
            }
            None => false,
        }
    }

    pub async fn is_trading_enabled(&self, wallet_id: &str) -> bool {
        let slot = match self.agents.lock().await.get(wallet_id).cloned() {
            Some(slot) => slot,
            None => return false,
        };
        let agent = slot.lock().await;
        agent.enabled.load(Ordering::SeqCst)
    }

    pub async fn agent_phase(&self, wallet_id: &str) -> AgentPhase {
        let slot = match self.agents.lock().await.get(wallet_id).cloned() {
            Some(slot) => slot,
            None => return AgentPhase::Disabled,
        };
        let mut agent = slot.lock().await;
        agent.refresh_phase()
    }

    /// Wallets whose loop is currently running.
    pub async fn active_agents(&self) -> usize {
        let slots: Vec<_> = self.agents.lock().await.values().cloned().collect();
        let mut running = 0;
        for slot in slots {
            if slot.lock().await.is_running() {
                running += 1;
            }
        }
        running
    }

    /// Loop instances alive right now, across all wallets.
    pub fn live_loop_count(&self) -> usize {
        self.live_loops.load(Ordering::SeqCst)
    }

    /// Manual buy, independent of the wallet's autonomous loop.
    pub async fn execute_buy(&self, wallet_id: &str, amount_sol: f64) -> (bool, String) {
        match self.engine.buy(wallet_id, amount_sol).await {
            Ok(receipt) => (
                true,
                format!(
                    "Successfully bought {:.2} tokens for {:.3} SOL",
                    receipt.amount_out, receipt.amount_in
                ),
            ),
            Err(e) => (false, e.to_string()),
        }
    }

    /// Manual sell, independent of the wallet's autonomous loop.
    pub async fn execute_sell(&self, wallet_id: &str, amount_tokens: f64) -> (bool, String) {
        match self.engine.sell(wallet_id, amount_tokens).await {
            Ok(receipt) => (
                true,
                format!(
                    "Successfully sold {:.2} tokens for {:.3} SOL",
                    receipt.amount_in, receipt.amount_out
                ),
            ),
            Err(e) => (false, e.to_string()),
        }
    }

    pub async fn update_market_data(
        &self,
        reserve_sol: f64,
        reserve_token: f64,
        sol_price_usd: f64,
    ) -> TradingResult<()> {
        self.engine.update_market_data(reserve_sol, reserve_token, sol_price_usd).await
    }

    pub async fn current_price(&self) -> PriceQuote {
        self.engine.current_price().await
    }

    pub async fn reserves(&self) -> (f64, f64) {
        self.engine.reserves().await
    }

    /// Stop every agent and wait for all loops to exit.
    pub async fn shutdown(&self) {
        let slots: Vec<(WalletId, Arc<Mutex<AgentState>>)> = self
            .agents
            .lock()
            .await
            .iter()
            .map(|(id, slot)| (id.clone(), slot.clone()))
            .collect();

        for (_, slot) in &slots {
            slot.lock().await.signal_stop();
        }
        for (wallet_id, slot) in slots {
            let mut agent = slot.lock().await;
            self.retire_loop(&wallet_id, &mut agent).await;
        }
        info!("All trading agents stopped");
    }

    async fn slot(&self, wallet_id: &str) -> Arc<Mutex<AgentState>> {
        self.agents
            .lock()
            .await
            .entry(wallet_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(AgentState::new())))
            .clone()
    }

    /// Stop the current loop instance, if any, and wait until it has exited.
    async fn retire_loop(&self, wallet_id: &str, agent: &mut AgentState) {
        let Some(mut handle) = agent.handle.take() else {
            agent.phase = AgentPhase::Disabled;
            return;
        };
        agent.signal_stop();

        if timeout(self.config.shutdown_grace(), &mut handle).await.is_err() {
            warn!(
                "Previous loop for wallet {} did not exit within {:?}, aborting it",
                wallet_id,
                self.config.shutdown_grace()
            );
            handle.abort();
            let _ = handle.await;
        }
        agent.phase = AgentPhase::Disabled;
    }

    fn next_rng(&self) -> StdRng {
        let n = self.spawned.fetch_add(1, Ordering::SeqCst);
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(n)),
            None => StdRng::from_entropy(),
        }
    }
}
