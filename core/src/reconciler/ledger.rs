//! Ledger read interface.
//!
//! Everything the reconciler learns about on-chain state arrives through
//! [`LedgerReader`], so the real gateway client and the deterministic test
//! double are interchangeable; note logic never touches the network
//! directly.

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use veilswap_privacy::Commitment;

/// Result of a batch's pooled conversion, read-only from our side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub is_finalized: bool,
    /// Total USDC deposited into the batch (6 decimals)
    pub total_usdc_in: u128,
    /// Total WBTC the batch converted into (8 decimals)
    pub total_wbtc_out: u128,
    /// Finalization time, unix seconds
    pub timestamp: u64,
}

#[derive(Debug, Error, Clone)]
pub enum LedgerError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("method not supported by this deployment: {0}")]
    Unsupported(&'static str),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Read access to the pool contract's state
pub trait LedgerReader: Send + Sync {
    /// Whether this commitment exists on the currently configured
    /// deployment
    fn is_commitment_valid(
        &self,
        commitment: &Commitment,
    ) -> impl Future<Output = Result<bool, LedgerError>> + Send;

    /// Conversion result for a deposit batch
    fn get_batch_result(
        &self,
        batch_id: u64,
    ) -> impl Future<Output = Result<BatchResult, LedgerError>> + Send;

    /// Optional secondary identity binding; older deployments fail with
    /// [`LedgerError::Unsupported`]
    fn get_btc_identity(
        &self,
        commitment: &Commitment,
    ) -> impl Future<Output = Result<Option<String>, LedgerError>> + Send;
}

/// JSON-RPC client against the pool gateway
pub struct RpcLedgerReader {
    client: reqwest::Client,
    url: String,
    pool_address: String,
}

const RPC_METHOD_NOT_FOUND: i64 = -32601;

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

impl RpcLedgerReader {
    pub fn new(url: String, pool_address: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            pool_address,
        }
    }

    /// Build from config; None when the ledger section is incomplete, in
    /// which case every note resolves as pending.
    pub fn from_config(config: &veilswap_config::VeilswapConfig) -> Option<Self> {
        let url = config.ledger.rpc_url.clone()?;
        let pool = config.ledger.pool_address.clone()?;
        Some(Self::new(url, pool))
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &'static str,
        params: serde_json::Value,
    ) -> Result<T, LedgerError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        let parsed: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| LedgerError::Malformed(e.to_string()))?;

        if let Some(err) = parsed.error {
            if err.code == RPC_METHOD_NOT_FOUND {
                return Err(LedgerError::Unsupported(method));
            }
            return Err(LedgerError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        parsed
            .result
            .ok_or_else(|| LedgerError::Malformed("missing result".into()))
    }
}

impl LedgerReader for RpcLedgerReader {
    async fn is_commitment_valid(&self, commitment: &Commitment) -> Result<bool, LedgerError> {
        self.call(
            "pool_isCommitmentValid",
            json!([self.pool_address, commitment.to_hex()]),
        )
        .await
    }

    async fn get_batch_result(&self, batch_id: u64) -> Result<BatchResult, LedgerError> {
        self.call("pool_getBatchResult", json!([self.pool_address, batch_id]))
            .await
    }

    async fn get_btc_identity(
        &self,
        commitment: &Commitment,
    ) -> Result<Option<String>, LedgerError> {
        self.call(
            "pool_getBtcIdentity",
            json!([self.pool_address, commitment.to_hex()]),
        )
        .await
    }
}
