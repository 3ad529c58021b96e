//! Metrics collection for the trading engine.
//!
//! Simple named counters and gauges behind an async RwLock. Recorded by the
//! engine after it leaves its critical section, never while holding it.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::error::TradingError;
use crate::types::TradeAction;

pub const SWAPS_BUY_TOTAL: &str = "swaps_buy_total";
pub const SWAPS_SELL_TOTAL: &str = "swaps_sell_total";
pub const SWAPS_REJECTED_TOTAL: &str = "swaps_rejected_total";
pub const AGENT_FAULTS_TOTAL: &str = "agent_faults_total";
pub const MARKET_UPDATES_TOTAL: &str = "market_updates_total";
pub const SOL_VOLUME: &str = "sol_volume";

/// Trading metrics collector.
#[derive(Clone, Default)]
pub struct TradingMetrics {
    metrics: Arc<RwLock<InternalMetrics>>,
}

#[derive(Debug, Default)]
struct InternalMetrics {
    counters: HashMap<String, u64>,
    gauges: HashMap<String, f64>,
}

/// Point-in-time copy of all metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub counters: HashMap<String, u64>,
    pub gauges: HashMap<String, f64>,
}

impl MetricsSnapshot {
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn gauge(&self, name: &str) -> f64 {
        self.gauges.get(name).copied().unwrap_or(0.0)
    }
}

impl TradingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter metric.
    #[instrument(skip(self), fields(metric = %name))]
    pub async fn increment_counter(&self, name: &str) {
        let mut metrics = self.metrics.write().await;
        *metrics.counters.entry(name.to_string()).or_insert(0) += 1;
        debug!("Incremented counter: {}", name);
    }

    /// Add to an accumulating gauge.
    pub async fn add_to_gauge(&self, name: &str, value: f64) {
        let mut metrics = self.metrics.write().await;
        *metrics.gauges.entry(name.to_string()).or_insert(0.0) += value;
    }

    pub async fn record_swap(&self, action: TradeAction, sol_amount: f64) {
        let counter = match action {
            TradeAction::Buy => SWAPS_BUY_TOTAL,
            TradeAction::Sell => SWAPS_SELL_TOTAL,
        };
        self.increment_counter(counter).await;
        self.add_to_gauge(SOL_VOLUME, sol_amount).await;
    }

    pub async fn record_rejection(&self, error: &TradingError) {
        debug!("Swap rejected: {}", error);
        self.increment_counter(SWAPS_REJECTED_TOTAL).await;
    }

    pub async fn get_metrics_snapshot(&self) -> MetricsSnapshot {
        let metrics = self.metrics.read().await;
        MetricsSnapshot {
            counters: metrics.counters.clone(),
            gauges: metrics.gauges.clone(),
        }
    }
}
