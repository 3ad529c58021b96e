//! Wallet store - identity to balances, plus the wallet config file format.

use crate::types::{Pubkey, Wallet, WalletId};
use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

const NETWORKS: [&str; 3] = ["mainnet", "devnet", "testnet"];

const BASE58_ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Balance entry of the persisted `wallet_balances` map.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WalletBalance {
    pub sol_balance: f64,
    pub token_balance: f64,
}

/// On-disk wallet configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletConfigFile {
    #[serde(default)]
    pub wallets: HashMap<WalletId, Wallet>,
    #[serde(default)]
    pub active_wallet_id: Option<WalletId>,
    #[serde(default = "default_network")]
    pub current_network: String,
}

fn default_network() -> String {
    "mainnet".to_string()
}

/// All wallets known to the simulator.
#[derive(Debug, Clone)]
pub struct WalletStore {
    wallets: HashMap<WalletId, Wallet>,
    active_wallet_id: Option<WalletId>,
    current_network: String,
}

impl Default for WalletStore {
    fn default() -> Self {
        Self {
            wallets: HashMap::new(),
            active_wallet_id: None,
            current_network: default_network(),
        }
    }
}

impl WalletStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load wallets from a config file. A missing file yields an empty store.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No wallet config at {}, starting with an empty store", path.display());
            return Ok(Self::new());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read wallet config {}", path.display()))?;
        let config: WalletConfigFile = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse wallet config {}", path.display()))?;

        let mut store = Self::new();
        store.current_network = config.current_network;
        for (id, mut wallet) in config.wallets {
            wallet.id = id.clone();
            sanitize_balances(&mut wallet);
            store.wallets.insert(id, wallet);
        }
        store.active_wallet_id = config.active_wallet_id.filter(|id| store.wallets.contains_key(id));

        info!("Loaded {} wallets from {}", store.wallets.len(), path.display());
        Ok(store)
    }

    /// Write wallets back in the config file format.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let config = WalletConfigFile {
            wallets: self.wallets.clone(),
            active_wallet_id: self.active_wallet_id.clone(),
            current_network: self.current_network.clone(),
        };
        let json = serde_json::to_string_pretty(&config)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write wallet config {}", path.display()))
    }

    pub fn get_wallet(&self, id: &str) -> Option<&Wallet> {
        self.wallets.get(id)
    }

    pub(crate) fn get_wallet_mut(&mut self, id: &str) -> Option<&mut Wallet> {
        self.wallets.get_mut(id)
    }

    /// All wallets, ordered by id.
    pub fn all_wallets(&self) -> Vec<Wallet> {
        let mut wallets: Vec<Wallet> = self.wallets.values().cloned().collect();
        wallets.sort_by(|a, b| a.id.cmp(&b.id));
        wallets
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    pub fn active_wallet_id(&self) -> Option<&WalletId> {
        self.active_wallet_id.as_ref()
    }

    /// Returns false for unknown wallets.
    pub fn set_active_wallet(&mut self, id: &str) -> bool {
        if !self.wallets.contains_key(id) {
            return false;
        }
        self.active_wallet_id = Some(id.to_string());
        true
    }

    pub fn current_network(&self) -> &str {
        &self.current_network
    }

    /// Returns false for networks other than mainnet, devnet and testnet.
    pub fn set_network(&mut self, network: &str) -> bool {
        if !NETWORKS.contains(&network) {
            return false;
        }
        self.current_network = network.to_string();
        true
    }

    /// Register a wallet under its own id, replacing any wallet with that id.
    /// The first wallet registered becomes the active one. Balances that are
    /// negative or not finite are reset to zero.
    pub fn insert(&mut self, mut wallet: Wallet) -> WalletId {
        sanitize_balances(&mut wallet);
        let id = wallet.id.clone();
        if self.active_wallet_id.is_none() {
            self.active_wallet_id = Some(id.clone());
        }
        debug!("Registered wallet {} ({})", wallet.name, id);
        self.wallets.insert(id.clone(), wallet);
        id
    }

    /// Create a fresh tradeable wallet with zero balances.
    pub fn create_wallet(&mut self, name: &str) -> WalletId {
        let wallet = Wallet {
            id: self.next_id(),
            name: name.to_string(),
            pubkey: random_pubkey(),
            sol_balance: 0.0,
            token_balance: 0.0,
            watch_only: false,
        };
        self.insert(wallet)
    }

    /// Track an external public key without trading from it.
    pub fn add_watch_wallet(&mut self, name: &str, pubkey: &str) -> WalletId {
        let wallet = Wallet {
            id: self.next_id(),
            name: name.to_string(),
            pubkey: pubkey.to_string(),
            sol_balance: 0.0,
            token_balance: 0.0,
            watch_only: true,
        };
        self.insert(wallet)
    }

    pub fn remove_wallet(&mut self, id: &str) -> Option<Wallet> {
        let removed = self.wallets.remove(id)?;
        if self.active_wallet_id.as_deref() == Some(id) {
            self.active_wallet_id = self.all_wallets().first().map(|w| w.id.clone());
        }
        Some(removed)
    }

    /// Balances keyed by wallet display name, as persisted in the ledger.
    pub fn balances_by_name(&self) -> HashMap<String, WalletBalance> {
        self.wallets
            .values()
            .map(|w| {
                (
                    w.name.clone(),
                    WalletBalance {
                        sol_balance: w.sol_balance,
                        token_balance: w.token_balance,
                    },
                )
            })
            .collect()
    }

    /// Sum of balances across all wallets.
    pub fn totals(&self) -> WalletBalance {
        self.wallets.values().fold(WalletBalance::default(), |acc, w| WalletBalance {
            sol_balance: acc.sol_balance + w.sol_balance,
            token_balance: acc.token_balance + w.token_balance,
        })
    }

    fn next_id(&self) -> WalletId {
        let base = chrono::Utc::now().timestamp_millis().to_string();
        if !self.wallets.contains_key(&base) {
            return base;
        }
        (1..)
            .map(|n| format!("{}-{}", base, n))
            .find(|candidate| !self.wallets.contains_key(candidate))
            .unwrap_or(base)
    }
}

fn sanitize_balances(wallet: &mut Wallet) {
    for (label, balance) in [
        ("SOL", &mut wallet.sol_balance),
        ("token", &mut wallet.token_balance),
    ] {
        if !(balance.is_finite() && *balance >= 0.0) {
            warn!("Wallet {} has invalid {} balance {}, resetting to 0", wallet.id, label, balance);
            *balance = 0.0;
        }
    }
}

fn random_pubkey() -> Pubkey {
    let mut rng = rand::thread_rng();
    (0..44)
        .map(|_| BASE58_ALPHABET[rng.gen_range(0..BASE58_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_watch_wallets() {
        let mut store = WalletStore::new();
        let a = store.create_wallet("alpha");
        let b = store.add_watch_wallet("whale", "WhaleKey111");

        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
        assert_eq!(store.active_wallet_id(), Some(&a));
        assert_eq!(store.get_wallet(&a).unwrap().pubkey.len(), 44);
        assert!(store.get_wallet(&b).unwrap().watch_only);
    }

    #[test]
    fn test_remove_active_wallet_moves_active() {
        let mut store = WalletStore::new();
        store.insert(Wallet::new("1", "one", 1.0, 0.0));
        store.insert(Wallet::new("2", "two", 1.0, 0.0));

        assert!(store.remove_wallet("1").is_some());
        assert_eq!(store.active_wallet_id().map(String::as_str), Some("2"));
        assert!(store.remove_wallet("missing").is_none());
    }

    #[test]
    fn test_balances_and_totals() {
        let mut store = WalletStore::new();
        store.insert(Wallet::new("1", "one", 1.5, 10.0));
        store.insert(Wallet::new("2", "two", 0.5, 5.0));

        let balances = store.balances_by_name();
        assert_eq!(balances["one"].sol_balance, 1.5);
        assert_eq!(balances["two"].token_balance, 5.0);

        let totals = store.totals();
        assert_eq!(totals.sol_balance, 2.0);
        assert_eq!(totals.token_balance, 15.0);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let path = std::env::temp_dir().join(format!(
            "sniper_swarm_missing_wallets_{}.json",
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let store = WalletStore::load_from_file(&path).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_save_and_load_config() {
        let path = std::env::temp_dir().join(format!(
            "sniper_swarm_wallets_{}.json",
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let mut store = WalletStore::new();
        store.insert(Wallet::new("w1", "sniper-1", 2.0, 100.0));
        store.insert(Wallet::new("w2", "watcher", 0.0, 0.0).watch_only());
        assert!(store.set_network("devnet"));
        assert!(store.set_active_wallet("w2"));
        store.save_to_file(&path).unwrap();

        let loaded = WalletStore::load_from_file(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get_wallet("w1").unwrap().token_balance, 100.0);
        assert!(loaded.get_wallet("w2").unwrap().watch_only);
        assert_eq!(loaded.active_wallet_id().map(String::as_str), Some("w2"));
        assert_eq!(loaded.current_network(), "devnet");

        // saving again keeps the network
        loaded.save_to_file(&path).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["current_network"], "devnet");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_network_and_active_wallet_setters() {
        let mut store = WalletStore::new();
        assert_eq!(store.current_network(), "mainnet");
        assert!(!store.set_network("localnet"));
        assert!(store.set_network("testnet"));
        assert_eq!(store.current_network(), "testnet");

        store.insert(Wallet::new("1", "one", 1.0, 0.0));
        assert!(!store.set_active_wallet("missing"));
        assert_eq!(store.active_wallet_id().map(String::as_str), Some("1"));
    }

    #[test]
    fn test_invalid_balances_reset_on_insert() {
        let mut store = WalletStore::new();
        store.insert(Wallet::new("nan", "nan", f64::NAN, f64::INFINITY));
        store.insert(Wallet::new("neg", "neg", -1.0, 5.0));

        let nan = store.get_wallet("nan").unwrap();
        assert_eq!((nan.sol_balance, nan.token_balance), (0.0, 0.0));
        let neg = store.get_wallet("neg").unwrap();
        assert_eq!((neg.sol_balance, neg.token_balance), (0.0, 5.0));
    }

    #[test]
    fn test_invalid_balances_reset_on_load() {
        let path = std::env::temp_dir().join(format!(
            "sniper_swarm_bad_wallets_{}.json",
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        std::fs::write(
            &path,
            r#"{"wallets": {"w1": {"name": "bad", "sol_balance": -3.0, "token_balance": 10.0}}, "current_network": "devnet"}"#,
        )
        .unwrap();

        let loaded = WalletStore::load_from_file(&path).unwrap();
        let wallet = loaded.get_wallet("w1").unwrap();
        assert_eq!(wallet.sol_balance, 0.0);
        assert_eq!(wallet.token_balance, 10.0);
        assert_eq!(loaded.current_network(), "devnet");

        let _ = std::fs::remove_file(&path);
    }
}
