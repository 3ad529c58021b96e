//! Main entry point for the sniper-swarm simulator
//!
//! Loads (or seeds) wallets, starts the ledger writer and the market feed,
//! lets every tradeable wallet trade for a while, then shuts down cleanly.
//!
//! Environment:
//! - `SWARM_CONFIG`: JSON file with `TradingConfig` overrides
//! - `SWARM_WALLETS`: wallet config file (default `wallet_config.json`)
//! - `SWARM_RUN_SECONDS`: how long to run (default 300)
//! - `SWARM_OFFLINE`: use the fallback SOL price instead of CoinGecko

use anyhow::Result;
use sniper_swarm::trading::{
    CoinGeckoRateSource, FixedRateSource, MarketFeed, RecordCategory, ReferenceRateSource, TradingBuilder,
    TradingConfig, WalletStore,
};
use sniper_swarm::Wallet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting sniper-swarm simulator");

    let config = match std::env::var("SWARM_CONFIG") {
        Ok(path) => TradingConfig::from_file(path)?,
        Err(_) => TradingConfig::default(),
    };
    let run_for = Duration::from_secs(
        std::env::var("SWARM_RUN_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300),
    );

    let wallet_path = std::env::var("SWARM_WALLETS").unwrap_or_else(|_| "wallet_config.json".to_string());
    let mut wallets = WalletStore::load_from_file(&wallet_path)?;
    if wallets.is_empty() {
        info!("Seeding demo wallets");
        for i in 1..=3 {
            wallets.insert(Wallet::new(format!("demo-{}", i), format!("Sniper {}", i), 1.0 + i as f64, 0.0));
        }
        wallets.insert(Wallet::new("demo-watch", "Whale watch", 0.0, 0.0).watch_only());
    }

    let (scheduler, ledger_writer) = TradingBuilder::new()
        .with_config(config.clone())
        .with_wallets(wallets)
        .with_initial_market(config.feed_reserve_sol, config.feed_reserve_token, config.fallback_sol_price_usd)
        .build()
        .await?;

    let writer_handle = tokio::spawn(ledger_writer.run());

    let source: Arc<dyn ReferenceRateSource> = if std::env::var("SWARM_OFFLINE").is_ok() {
        Arc::new(FixedRateSource(config.fallback_sol_price_usd))
    } else {
        Arc::new(CoinGeckoRateSource::new()?)
    };
    let (feed_shutdown, feed_shutdown_rx) = watch::channel(false);
    let feed = MarketFeed::new(scheduler.engine().clone(), source, config.clone());
    let feed_handle = tokio::spawn(feed.run(feed_shutdown_rx));

    for wallet in scheduler.engine().all_wallets().await {
        if wallet.watch_only {
            continue;
        }
        if !scheduler.enable_trading(&wallet.id).await {
            warn!("Could not enable trading for {}", wallet.name);
        }
    }

    info!(
        "{} agents trading on {} for {:?}",
        scheduler.active_agents().await,
        scheduler.engine().current_network().await,
        run_for
    );
    tokio::select! {
        _ = tokio::time::sleep(run_for) => info!("Run time elapsed"),
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    scheduler.shutdown().await;
    let _ = feed_shutdown.send(true);
    let _ = feed_handle.await;

    let price = scheduler.current_price().await;
    let (reserve_sol, reserve_token) = scheduler.reserves().await;
    let trades = scheduler.engine().recent_trades(RecordCategory::SniperActions, 5).await;
    let metrics = scheduler.engine().metrics().get_metrics_snapshot().await;
    info!(
        "Final pool: {:.4} SOL / {:.2} tokens, price {:.8} SOL (${:.6})",
        reserve_sol, reserve_token, price.sol, price.usd
    );
    info!("Swap counters: {:?}", metrics.counters);
    for trade in trades {
        info!("  {} {} {:.2} @ {:.8}", trade.bot, trade.action, trade.quantity, trade.price_sol);
    }

    if let Err(e) = scheduler.engine().save_wallets(&wallet_path).await {
        warn!("Failed to save wallet config: {:#}", e);
    }

    // Dropping the scheduler releases the last engine handle, letting the
    // writer flush and exit.
    drop(scheduler);
    let _ = writer_handle.await;

    info!("Simulation finished. Ledger written to {}", config.ledger_path);
    Ok(())
}
