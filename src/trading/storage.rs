//! Storage abstraction for ledger snapshots.
//!
//! The engine never performs I/O while holding its lock. It pushes each
//! committed snapshot into a channel, and [`LedgerWriter`] persists them in
//! commit order through a [`LedgerStorage`] backend.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::trading::trade_ledger::LedgerSnapshot;

/// Channel the engine publishes committed snapshots on.
pub type SnapshotSender = mpsc::UnboundedSender<LedgerSnapshot>;
pub type SnapshotReceiver = mpsc::UnboundedReceiver<LedgerSnapshot>;

/// Contract for persisting the trade ledger.
#[async_trait]
pub trait LedgerStorage: Send + Sync {
    /// Replace the persisted ledger with `snapshot` in one step.
    async fn write_snapshot(&self, snapshot: &LedgerSnapshot) -> Result<()>;

    /// Load the persisted ledger. Missing or unreadable data yields an empty ledger.
    async fn load(&self) -> Result<LedgerSnapshot>;
}

/// JSON file backend. Writes go to a sibling temp file which is then renamed
/// over the target, so readers never see a half-written file.
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl LedgerStorage for JsonFileStorage {
    async fn write_snapshot(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        let json = serde_json::to_vec_pretty(snapshot).context("Failed to serialize ledger snapshot")?;
        let temp = self.temp_path();

        tokio::fs::write(&temp, json)
            .await
            .with_context(|| format!("Failed to write {}", temp.display()))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!(
            "Ledger snapshot written to {} ({} sniper actions)",
            self.path.display(),
            snapshot.sniper_actions.len()
        );
        Ok(())
    }

    async fn load(&self) -> Result<LedgerSnapshot> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LedgerSnapshot::default()),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", self.path.display())),
        };

        if content.trim().is_empty() {
            return Ok(LedgerSnapshot::default());
        }

        match serde_json::from_str(&content) {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                warn!("Ledger file {} is corrupt, starting empty: {}", self.path.display(), e);
                Ok(LedgerSnapshot::default())
            }
        }
    }
}

/// In-memory backend that keeps only the latest snapshot.
#[derive(Default)]
pub struct InMemoryStorage {
    latest: Mutex<LedgerSnapshot>,
    writes: AtomicUsize,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerStorage for InMemoryStorage {
    async fn write_snapshot(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        *self.latest.lock().await = snapshot.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self) -> Result<LedgerSnapshot> {
        Ok(self.latest.lock().await.clone())
    }
}

/// Background task persisting published snapshots.
pub struct LedgerWriter {
    storage: Arc<dyn LedgerStorage>,
    receiver: SnapshotReceiver,
}

impl LedgerWriter {
    pub fn new(storage: Arc<dyn LedgerStorage>, receiver: SnapshotReceiver) -> Self {
        Self { storage, receiver }
    }

    /// Persist snapshots until every sender is dropped.
    ///
    /// When several snapshots are queued only the newest is written; each is a
    /// full replacement, so the skipped ones carry no extra information.
    pub async fn run(mut self) {
        info!("LedgerWriter is running...");
        while let Some(mut snapshot) = self.receiver.recv().await {
            while let Ok(newer) = self.receiver.try_recv() {
                snapshot = newer;
            }

            if let Err(e) = self.storage.write_snapshot(&snapshot).await {
                error!("Failed to persist ledger snapshot: {:?}", e);
            }
        }
        info!("LedgerWriter channel closed. Shutting down.");
    }
}
