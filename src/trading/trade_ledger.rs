//! Trade ledger - bounded, append-only history of executed trades.
//!
//! Each category keeps at most `capacity` records; the oldest record is
//! evicted first. The ledger itself performs no I/O: the engine turns it into
//! a [`LedgerSnapshot`] and hands that to the storage writer.

use crate::trading::market::MarketMetrics;
use crate::trading::wallet_store::WalletBalance;
use crate::types::TradeRecord;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Ledger record categories, each capped independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordCategory {
    /// Trades made by the per-wallet agents and manual overrides
    SniperActions,
    VolumeBots,
    Signals,
}

impl RecordCategory {
    pub fn all() -> [RecordCategory; 3] {
        [RecordCategory::SniperActions, RecordCategory::VolumeBots, RecordCategory::Signals]
    }

    /// Key used in the persisted file.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordCategory::SniperActions => "sniper_actions",
            RecordCategory::VolumeBots => "volume_bots",
            RecordCategory::Signals => "signals",
        }
    }
}

/// Persisted ledger layout. Keys are stable and shared with the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    #[serde(default)]
    pub sniper_actions: Vec<TradeRecord>,
    #[serde(default)]
    pub volume_bots: Vec<TradeRecord>,
    #[serde(default)]
    pub signals: Vec<TradeRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_metrics: Option<MarketMetrics>,
    #[serde(default)]
    pub wallet_balances: HashMap<String, WalletBalance>,
}

impl LedgerSnapshot {
    pub fn records(&self, category: RecordCategory) -> &[TradeRecord] {
        match category {
            RecordCategory::SniperActions => &self.sniper_actions,
            RecordCategory::VolumeBots => &self.volume_bots,
            RecordCategory::Signals => &self.signals,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TradeLedger {
    capacity: usize,
    sniper_actions: VecDeque<TradeRecord>,
    volume_bots: VecDeque<TradeRecord>,
    signals: VecDeque<TradeRecord>,
}

impl TradeLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            sniper_actions: VecDeque::with_capacity(capacity),
            volume_bots: VecDeque::new(),
            signals: VecDeque::new(),
        }
    }

    /// Rebuild a ledger from a previously persisted snapshot, trimming each
    /// category to the newest `capacity` records.
    pub fn from_snapshot(snapshot: &LedgerSnapshot, capacity: usize) -> Self {
        let mut ledger = Self::new(capacity);
        for category in RecordCategory::all() {
            for record in snapshot.records(category) {
                ledger.append(category, record.clone());
            }
        }
        ledger
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a record, evicting the oldest ones past capacity.
    pub fn append(&mut self, category: RecordCategory, record: TradeRecord) {
        let capacity = self.capacity;
        let queue = self.queue_mut(category);
        queue.push_back(record);
        while queue.len() > capacity {
            queue.pop_front();
        }
    }

    pub fn records(&self, category: RecordCategory) -> impl Iterator<Item = &TradeRecord> {
        self.queue(category).iter()
    }

    pub fn latest(&self, category: RecordCategory) -> Option<&TradeRecord> {
        self.queue(category).back()
    }

    pub fn len(&self, category: RecordCategory) -> usize {
        self.queue(category).len()
    }

    pub fn clear(&mut self) {
        for category in RecordCategory::all() {
            self.queue_mut(category).clear();
        }
    }

    /// Full snapshot embedding market metrics and wallet balances.
    pub fn snapshot(
        &self,
        market_metrics: MarketMetrics,
        wallet_balances: HashMap<String, WalletBalance>,
    ) -> LedgerSnapshot {
        LedgerSnapshot {
            sniper_actions: self.sniper_actions.iter().cloned().collect(),
            volume_bots: self.volume_bots.iter().cloned().collect(),
            signals: self.signals.iter().cloned().collect(),
            market_metrics: Some(market_metrics),
            wallet_balances,
        }
    }

    fn queue(&self, category: RecordCategory) -> &VecDeque<TradeRecord> {
        match category {
            RecordCategory::SniperActions => &self.sniper_actions,
            RecordCategory::VolumeBots => &self.volume_bots,
            RecordCategory::Signals => &self.signals,
        }
    }

    fn queue_mut(&mut self, category: RecordCategory) -> &mut VecDeque<TradeRecord> {
        match category {
            RecordCategory::SniperActions => &mut self.sniper_actions,
            RecordCategory::VolumeBots => &mut self.volume_bots,
            RecordCategory::Signals => &mut self.signals,
        }
    }
}
