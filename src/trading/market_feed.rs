//! Market-data feed - periodically pushes pool reserves and the SOL/USD
//! reference rate into the engine.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_retry::{strategy::ExponentialBackoff, Retry};
use tracing::{debug, error, info, instrument, warn};

use crate::trading::engine::SwapEngine;
use crate::trading::types::TradingConfig;

const COINGECKO_SOL_PRICE_URL: &str = "https://api.coingecko.com/api/v3/simple/price?ids=solana&vs_currencies=usd";

/// Source of the SOL/USD reference rate.
#[async_trait]
pub trait ReferenceRateSource: Send + Sync {
    async fn fetch_sol_price_usd(&self) -> Result<f64>;
}

/// CoinGecko simple-price endpoint with retries.
pub struct CoinGeckoRateSource {
    http_client: Client,
}

impl CoinGeckoRateSource {
    pub fn new() -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl ReferenceRateSource for CoinGeckoRateSource {
    #[instrument(skip(self))]
    async fn fetch_sol_price_usd(&self) -> Result<f64> {
        let retry_strategy = ExponentialBackoff::from_millis(500)
            .max_delay(Duration::from_secs(3))
            .take(3);

        Retry::spawn(retry_strategy, || async {
            let response = self
                .http_client
                .get(COINGECKO_SOL_PRICE_URL)
                .send()
                .await?
                .json::<serde_json::Value>()
                .await?;

            let price = response["solana"]["usd"]
                .as_f64()
                .context("Failed to parse SOL price from CoinGecko")?;

            debug!("Fetched SOL price: ${:.2}", price);
            Ok::<f64, anyhow::Error>(price)
        })
        .await
    }
}

/// Constant rate, for offline runs and tests.
pub struct FixedRateSource(pub f64);

#[async_trait]
impl ReferenceRateSource for FixedRateSource {
    async fn fetch_sol_price_usd(&self) -> Result<f64> {
        Ok(self.0)
    }
}

pub struct MarketFeed {
    engine: SwapEngine,
    source: Arc<dyn ReferenceRateSource>,
    config: TradingConfig,
}

impl MarketFeed {
    pub fn new(engine: SwapEngine, source: Arc<dyn ReferenceRateSource>, config: TradingConfig) -> Self {
        Self { engine, source, config }
    }

    /// Push one update. Falls back to the configured rate if the source fails.
    pub async fn tick(&self) -> f64 {
        let sol_price_usd = match self.source.fetch_sol_price_usd().await {
            Ok(price) if price.is_finite() && price > 0.0 => price,
            Ok(price) => {
                warn!("Reference rate source returned {}, using fallback", price);
                self.config.fallback_sol_price_usd
            }
            Err(e) => {
                warn!("Failed to fetch SOL price, using fallback: {:#}", e);
                self.config.fallback_sol_price_usd
            }
        };

        if let Err(e) = self
            .engine
            .update_market_data(self.config.feed_reserve_sol, self.config.feed_reserve_token, sol_price_usd)
            .await
        {
            error!("Error updating market data: {}", e);
        }
        sol_price_usd
    }

    /// Tick every `market_update_interval` until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "MarketFeed started. Update interval: {} seconds",
            self.config.market_update_interval_seconds
        );
        let mut interval = tokio::time::interval(self.config.market_update_interval());

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("MarketFeed stopped");
    }
}
