//! BTC price feeds.
//!
//! A ranked provider list: each provider is tried in order until one
//! returns a price. Used only when a batch's implied conversion rate looks
//! implausible; complete feed failure degrades settlement accuracy but
//! never blocks status resolution.

use std::time::Duration;

use log::warn;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum PriceError {
    #[error("{provider} failed: {reason}")]
    Provider {
        provider: &'static str,
        reason: String,
    },
    #[error("all price providers failed")]
    AllProvidersFailed,
}

/// Single capability the reconciler needs: the current BTC/USD price
pub trait PriceFeed: Send + Sync {
    fn fetch_btc_usd(&self) -> impl Future<Output = Result<f64, PriceError>> + Send;
}

/// HTTP providers, ranked by preference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceProvider {
    CoinGecko,
    Coinbase,
}

impl PriceProvider {
    fn name(&self) -> &'static str {
        match self {
            Self::CoinGecko => "coingecko",
            Self::Coinbase => "coinbase",
        }
    }
}

#[derive(Deserialize)]
struct CoinGeckoResponse {
    bitcoin: CoinGeckoPrice,
}

#[derive(Deserialize)]
struct CoinGeckoPrice {
    usd: f64,
}

#[derive(Deserialize)]
struct CoinbaseResponse {
    data: CoinbaseAmount,
}

#[derive(Deserialize)]
struct CoinbaseAmount {
    amount: String,
}

/// Ranked HTTP price feed with a bounded per-request timeout
pub struct RankedPriceFeed {
    client: reqwest::Client,
    providers: Vec<(PriceProvider, String)>,
    timeout: Duration,
}

impl RankedPriceFeed {
    pub fn new(primary_url: String, fallback_url: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            providers: vec![
                (PriceProvider::CoinGecko, primary_url),
                (PriceProvider::Coinbase, fallback_url),
            ],
            timeout,
        }
    }

    pub fn from_config(config: &veilswap_config::VeilswapConfig) -> Self {
        Self::new(
            config.price.primary_url.clone(),
            config.price.fallback_url.clone(),
            Duration::from_secs(config.price.timeout_secs),
        )
    }

    async fn fetch_one(&self, provider: PriceProvider, url: &str) -> Result<f64, PriceError> {
        let fail = |reason: String| PriceError::Provider {
            provider: provider.name(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        let price = match provider {
            PriceProvider::CoinGecko => {
                let body: CoinGeckoResponse =
                    response.json().await.map_err(|e| fail(e.to_string()))?;
                body.bitcoin.usd
            }
            PriceProvider::Coinbase => {
                let body: CoinbaseResponse =
                    response.json().await.map_err(|e| fail(e.to_string()))?;
                body.data
                    .amount
                    .parse::<f64>()
                    .map_err(|e| fail(e.to_string()))?
            }
        };

        if price.is_finite() && price > 0.0 {
            Ok(price)
        } else {
            Err(fail(format!("implausible price {price}")))
        }
    }
}

impl PriceFeed for RankedPriceFeed {
    async fn fetch_btc_usd(&self) -> Result<f64, PriceError> {
        for (provider, url) in &self.providers {
            match self.fetch_one(*provider, url).await {
                Ok(price) => return Ok(price),
                Err(e) => warn!("price provider failed, trying next: {e}"),
            }
        }
        Err(PriceError::AllProvidersFailed)
    }
}
