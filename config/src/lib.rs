//! VeilSwap Configuration
//!
//! Shared configuration crate for all VeilSwap components.
//!
//! Handles loading configuration from:
//! 1. VS_CONFIG env var (explicit path)
//! 2. ./veilswap.toml (current directory)
//! 3. Built-in defaults
//!
//! Environment variables take precedence over TOML config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::{env, fs};

/// Global config instance for convenience access
pub static GLOBAL_CONFIG: OnceLock<VeilswapConfig> = OnceLock::new();

const CONFIG_FILE_NAME: &str = "veilswap.toml";

// ============================================================================
// Default Constants
// ============================================================================

const DEFAULT_PRICE_PRIMARY_URL: &str =
    "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin&vs_currencies=usd";
const DEFAULT_PRICE_FALLBACK_URL: &str = "https://api.coinbase.com/v2/prices/BTC-USD/spot";
const DEFAULT_PRICE_TIMEOUT_SECS: u64 = 5;

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_BASE_MS: u64 = 500;

const DEFAULT_STORE_NAMESPACE: &str = "veilswap";

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VeilswapConfig {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub price: PriceConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Ledger gateway configuration
///
/// Both fields are optional: a client without a configured ledger still
/// works, it just resolves every note as pending.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub rpc_url: Option<String>,
    #[serde(default)]
    pub pool_address: Option<String>,
}

/// Price feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceConfig {
    #[serde(default = "default_price_primary")]
    pub primary_url: String,
    #[serde(default = "default_price_fallback")]
    pub fallback_url: String,
    #[serde(default = "default_price_timeout")]
    pub timeout_secs: u64,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            primary_url: DEFAULT_PRICE_PRIMARY_URL.into(),
            fallback_url: DEFAULT_PRICE_FALLBACK_URL.into(),
            timeout_secs: DEFAULT_PRICE_TIMEOUT_SECS,
        }
    }
}

fn default_price_primary() -> String {
    DEFAULT_PRICE_PRIMARY_URL.into()
}

fn default_price_fallback() -> String {
    DEFAULT_PRICE_FALLBACK_URL.into()
}

fn default_price_timeout() -> u64 {
    DEFAULT_PRICE_TIMEOUT_SECS
}

/// Retry policy for ledger reads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_RETRY_BASE_MS,
        }
    }
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_base_ms() -> u64 {
    DEFAULT_RETRY_BASE_MS
}

/// Note store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_namespace")]
    pub namespace: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_STORE_NAMESPACE.into(),
        }
    }
}

fn default_store_namespace() -> String {
    DEFAULT_STORE_NAMESPACE.into()
}

// ============================================================================
// Loading
// ============================================================================

impl VeilswapConfig {
    /// Load config: VS_CONFIG path, then ./veilswap.toml, then defaults.
    /// Env vars override file values.
    pub fn load() -> Result<Self> {
        let mut config = if let Ok(path) = env::var("VS_CONFIG") {
            Self::load_from(std::path::Path::new(&path))
                .with_context(|| format!("loading config from VS_CONFIG={path}"))?
        } else if std::path::Path::new(CONFIG_FILE_NAME).exists() {
            Self::load_from(std::path::Path::new(CONFIG_FILE_NAME))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("VS_LEDGER_RPC_URL") {
            self.ledger.rpc_url = Some(v);
        }
        if let Ok(v) = env::var("VS_POOL_ADDRESS") {
            self.ledger.pool_address = Some(v);
        }
        if let Ok(v) = env::var("VS_RETRY_MAX_ATTEMPTS") {
            if let Ok(n) = v.parse() {
                self.retry.max_attempts = n;
            }
        }
        if let Ok(v) = env::var("VS_RETRY_BASE_MS") {
            if let Ok(n) = v.parse() {
                self.retry.base_delay_ms = n;
            }
        }
    }

    /// Global accessor; loads once, falling back to defaults on error
    pub fn global() -> &'static Self {
        GLOBAL_CONFIG.get_or_init(|| Self::load().unwrap_or_default())
    }

    /// True when both the gateway URL and pool address are configured
    pub fn ledger_configured(&self) -> bool {
        self.ledger.rpc_url.is_some() && self.ledger.pool_address.is_some()
    }
}
