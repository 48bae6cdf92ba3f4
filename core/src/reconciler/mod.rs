//! Note Reconciliation
//!
//! Maps locally held secret notes onto the externally observed,
//! eventually-consistent ledger state.
//!
//! ```text
//! PENDING ──▶ READY          (batch finalized, cooldown computed)
//! PENDING ──▶ STALE          (commitment unknown to this deployment;
//!                             terminal, hidden from results)
//! any     ──▶ CLAIMED        (local claimed flag, terminal)
//! ```
//!
//! `READY` is recomputed on every call, never persisted. Every failure
//! path fails closed toward `PENDING`: the caller sees "not yet ready",
//! never an error.

pub mod ledger;
pub mod pricefeed;
pub mod retry;

use log::{debug, warn};
use serde::Serialize;
use thiserror::Error;

use veilswap_privacy::Note;

use crate::store::{KeyValueStore, NoteStore};
pub use ledger::{BatchResult, LedgerError, LedgerReader, RpcLedgerReader};
pub use pricefeed::{PriceError, PriceFeed, RankedPriceFeed};
pub use retry::RetryPolicy;

/// Minimum delay between batch finalization and withdrawal eligibility.
/// Blunts deposit-to-withdrawal timing correlation.
pub const WITHDRAW_COOLDOWN_SECS: u64 = 60;

/// Implied batch prices below this are treated as a misconfigured or mock
/// exchange rate rather than a real conversion.
const MIN_PLAUSIBLE_BTC_USD: u128 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NoteStatus {
    Pending,
    Ready,
    Stale,
    Claimed,
}

/// A note plus its derived status and settlement fields. Recomputed on
/// every query, never written back to storage.
#[derive(Debug, Clone, Serialize)]
pub struct NoteWithStatus {
    pub note: Note,
    pub status: NoteStatus,
    /// Proportional WBTC settlement share (8 decimals), once finalized
    pub wbtc_share: Option<u64>,
    pub has_btc_identity: bool,
    /// Batch finalization time, unix seconds
    pub batch_timestamp: Option<u64>,
    /// Earliest withdrawal time: finalization plus the fixed cooldown
    pub withdrawable_at: Option<u64>,
}

impl NoteWithStatus {
    fn bare(note: &Note, status: NoteStatus) -> Self {
        Self {
            note: note.clone(),
            status,
            wbtc_share: None,
            has_btc_identity: false,
            batch_timestamp: None,
            withdrawable_at: None,
        }
    }
}

#[derive(Debug, Error)]
enum ReconcileError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Derives a display status for each locally held note from ledger reads
/// and the price feeds.
pub struct NoteReconciler<S, L, P> {
    store: NoteStore<S>,
    /// None when the ledger is unconfigured; every unclaimed note then
    /// resolves as pending
    ledger: Option<L>,
    price_feed: P,
    retry: RetryPolicy,
}

impl<S, L, P> NoteReconciler<S, L, P>
where
    S: KeyValueStore,
    L: LedgerReader,
    P: PriceFeed,
{
    pub fn new(store: NoteStore<S>, ledger: Option<L>, price_feed: P) -> Self {
        Self {
            store,
            ledger,
            price_feed,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &NoteStore<S> {
        &self.store
    }

    /// Resolve one note's status.
    ///
    /// A locally claimed note short-circuits to `CLAIMED` with no ledger
    /// round-trip; the local flag is authoritative. Everything else walks
    /// the ledger, and any failure resolves to `PENDING`.
    pub async fn check_note_status(&self, note: &Note) -> NoteWithStatus {
        if note.claimed {
            return NoteWithStatus::bare(note, NoteStatus::Claimed);
        }

        let Some(ledger) = &self.ledger else {
            debug!("no ledger configured; note {} stays pending", note.commitment);
            return NoteWithStatus::bare(note, NoteStatus::Pending);
        };

        match self.resolve_unclaimed(ledger, note).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(
                    "status check failed for note {}: {e}; treating as pending",
                    note.commitment
                );
                NoteWithStatus::bare(note, NoteStatus::Pending)
            }
        }
    }

    /// Resolve every stored note concurrently and drop `STALE` entries
    /// from the result. The persisted store is left untouched; stale notes
    /// are hidden, not deleted.
    pub async fn check_all_note_statuses(
        &self,
        wallet_address: Option<&str>,
    ) -> Vec<NoteWithStatus> {
        let notes = match wallet_address {
            Some(address) => self.store.load_notes_encrypted(address),
            None => self.store.load_notes(),
        };

        let checks = notes.iter().map(|note| self.check_note_status(note));
        futures::future::join_all(checks)
            .await
            .into_iter()
            .filter(|resolved| resolved.status != NoteStatus::Stale)
            .collect()
    }

    async fn resolve_unclaimed(
        &self,
        ledger: &L,
        note: &Note,
    ) -> Result<NoteWithStatus, ReconcileError> {
        let valid = self
            .retry
            .run(|| ledger.is_commitment_valid(&note.commitment))
            .await?;
        if !valid {
            // Typically a leftover note from a prior contract deployment.
            return Ok(NoteWithStatus::bare(note, NoteStatus::Stale));
        }

        let batch = self
            .retry
            .run(|| ledger.get_batch_result(note.batch_id))
            .await?;
        if !batch.is_finalized {
            return Ok(NoteWithStatus::bare(note, NoteStatus::Pending));
        }

        let wbtc_share = self.settlement_share(note.amount, &batch).await;

        // Older deployments don't expose identity lookups; that never
        // affects the overall status.
        let has_btc_identity = match self
            .retry
            .run(|| ledger.get_btc_identity(&note.commitment))
            .await
        {
            Ok(identity) => identity.is_some(),
            Err(e) => {
                debug!("btc identity lookup unavailable: {e}");
                false
            }
        };

        Ok(NoteWithStatus {
            note: note.clone(),
            status: NoteStatus::Ready,
            wbtc_share: Some(wbtc_share),
            has_btc_identity,
            batch_timestamp: Some(batch.timestamp),
            withdrawable_at: Some(batch.timestamp + WITHDRAW_COOLDOWN_SECS),
        })
    }

    /// Proportional share of the batch conversion, with a sanity check on
    /// the implied unit price.
    ///
    /// USDC has 6 decimals and WBTC 8, so `usdc_in * 100 / wbtc_out`
    /// approximates USD per BTC. An implausibly low figure means the
    /// on-chain ratio can't be trusted; recompute from a live price if any
    /// feed answers, otherwise fall back to the ratio as a last resort.
    async fn settlement_share(&self, amount: u64, batch: &BatchResult) -> u64 {
        let onchain_share = if batch.total_usdc_in == 0 {
            0
        } else {
            (amount as u128 * batch.total_wbtc_out / batch.total_usdc_in) as u64
        };

        let implied_price = if batch.total_wbtc_out == 0 {
            0
        } else {
            batch.total_usdc_in * 100 / batch.total_wbtc_out
        };
        if implied_price >= MIN_PLAUSIBLE_BTC_USD {
            return onchain_share;
        }

        match self.price_feed.fetch_btc_usd().await {
            Ok(price) => {
                debug!("implied price {implied_price} implausible; using live price {price}");
                ((amount as f64) * 100.0 / price).floor() as u64
            }
            Err(e) => {
                warn!("implied price {implied_price} implausible and price feeds failed ({e}); keeping on-chain ratio");
                onchain_share
            }
        }
    }
}

impl<S: KeyValueStore> NoteReconciler<S, RpcLedgerReader, RankedPriceFeed> {
    /// Wire up the real gateway client and HTTP price feeds from config
    pub fn from_config(kv: S, config: &veilswap_config::VeilswapConfig) -> Self {
        Self {
            store: NoteStore::with_namespace(kv, &config.store.namespace),
            ledger: RpcLedgerReader::from_config(config),
            price_feed: RankedPriceFeed::from_config(config),
            retry: RetryPolicy::from_config(&config.retry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use rand::rngs::OsRng;
    use veilswap_privacy::Commitment;

    use crate::store::MemoryStore;

    /// Deterministic ledger double. Commitments not in `valid` are
    /// unknown to the deployment.
    #[derive(Default)]
    struct MockLedger {
        valid: Vec<Commitment>,
        batches: HashMap<u64, BatchResult>,
        identities: Vec<Commitment>,
        identity_supported: bool,
        transport_down: bool,
        validity_calls: AtomicU32,
    }

    impl LedgerReader for MockLedger {
        async fn is_commitment_valid(&self, commitment: &Commitment) -> Result<bool, LedgerError> {
            self.validity_calls.fetch_add(1, Ordering::SeqCst);
            if self.transport_down {
                return Err(LedgerError::Transport("connection refused".into()));
            }
            Ok(self.valid.contains(commitment))
        }

        async fn get_batch_result(&self, batch_id: u64) -> Result<BatchResult, LedgerError> {
            if self.transport_down {
                return Err(LedgerError::Transport("connection refused".into()));
            }
            self.batches
                .get(&batch_id)
                .cloned()
                .ok_or_else(|| LedgerError::Rpc {
                    code: -32000,
                    message: format!("unknown batch {batch_id}"),
                })
        }

        async fn get_btc_identity(
            &self,
            commitment: &Commitment,
        ) -> Result<Option<String>, LedgerError> {
            if !self.identity_supported {
                return Err(LedgerError::Unsupported("pool_getBtcIdentity"));
            }
            Ok(self
                .identities
                .contains(commitment)
                .then(|| "btc-id".to_string()))
        }
    }

    struct MockFeed {
        price: Option<f64>,
        calls: AtomicU32,
    }

    impl MockFeed {
        fn fixed(price: f64) -> Self {
            Self {
                price: Some(price),
                calls: AtomicU32::new(0),
            }
        }

        fn unreachable() -> Self {
            Self {
                price: None,
                calls: AtomicU32::new(0),
            }
        }
    }

    impl PriceFeed for MockFeed {
        async fn fetch_btc_usd(&self) -> Result<f64, PriceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.price.ok_or(PriceError::AllProvidersFailed)
        }
    }

    fn note(tier: u8, batch_id: u64) -> Note {
        Note::generate(tier, batch_id, &mut OsRng).unwrap()
    }

    fn finalized_batch(total_usdc_in: u128, total_wbtc_out: u128) -> BatchResult {
        BatchResult {
            is_finalized: true,
            total_usdc_in,
            total_wbtc_out,
            timestamp: 1_700_000_000,
        }
    }

    fn reconciler(
        ledger: Option<MockLedger>,
        feed: MockFeed,
    ) -> NoteReconciler<MemoryStore, MockLedger, MockFeed> {
        let _ = env_logger::builder().is_test(true).try_init();
        let store = NoteStore::with_namespace(MemoryStore::new(), "test");
        NoteReconciler::new(store, ledger, feed)
            .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn test_claimed_short_circuits_without_ledger_calls() {
        let mut n = note(0, 0);
        n.claimed = true;

        let ledger = MockLedger::default();
        let r = reconciler(Some(ledger), MockFeed::unreachable());
        let resolved = r.check_note_status(&n).await;

        assert_eq!(resolved.status, NoteStatus::Claimed);
        assert_eq!(
            r.ledger.as_ref().unwrap().validity_calls.load(Ordering::SeqCst),
            0,
            "local claimed flag must not trigger a ledger round-trip"
        );
    }

    #[tokio::test]
    async fn test_unknown_commitment_is_stale() {
        let n = note(0, 0);
        let r = reconciler(Some(MockLedger::default()), MockFeed::unreachable());

        assert_eq!(r.check_note_status(&n).await.status, NoteStatus::Stale);
    }

    #[tokio::test]
    async fn test_unfinalized_batch_is_pending() {
        let n = note(0, 5);
        let mut ledger = MockLedger::default();
        ledger.valid.push(n.commitment);
        ledger.batches.insert(
            5,
            BatchResult {
                is_finalized: false,
                total_usdc_in: 0,
                total_wbtc_out: 0,
                timestamp: 0,
            },
        );

        let r = reconciler(Some(ledger), MockFeed::unreachable());
        assert_eq!(r.check_note_status(&n).await.status, NoteStatus::Pending);
    }

    #[tokio::test]
    async fn test_ready_with_plausible_onchain_ratio() {
        // amount 10_000_000, 100 USDC -> 0.001 WBTC: implied price
        // 100_000_000 * 100 / 100_000 = 100_000 USD, plausible.
        let n = note(0, 1);
        let mut ledger = MockLedger::default();
        ledger.valid.push(n.commitment);
        ledger.batches.insert(1, finalized_batch(100_000_000, 100_000));

        let feed = MockFeed::fixed(50_000.0);
        let r = reconciler(Some(ledger), feed);
        let resolved = r.check_note_status(&n).await;

        assert_eq!(resolved.status, NoteStatus::Ready);
        assert_eq!(resolved.wbtc_share, Some(10_000));
        assert_eq!(resolved.batch_timestamp, Some(1_700_000_000));
        assert_eq!(
            resolved.withdrawable_at,
            Some(1_700_000_000 + WITHDRAW_COOLDOWN_SECS)
        );
        assert_eq!(
            r.price_feed.calls.load(Ordering::SeqCst),
            0,
            "plausible on-chain ratio must not consult price feeds"
        );
    }

    #[tokio::test]
    async fn test_implausible_ratio_uses_live_price() {
        // Implied price 100_000_000 * 100 / 1_000_000_000_000 = 0.01 USD.
        let n = note(0, 2);
        let mut ledger = MockLedger::default();
        ledger.valid.push(n.commitment);
        ledger
            .batches
            .insert(2, finalized_batch(100_000_000, 1_000_000_000_000));

        let r = reconciler(Some(ledger), MockFeed::fixed(50_000.0));
        let resolved = r.check_note_status(&n).await;

        assert_eq!(resolved.status, NoteStatus::Ready);
        // 10_000_000 * 100 / 50_000 = 20_000 sats.
        assert_eq!(resolved.wbtc_share, Some(20_000));
    }

    #[tokio::test]
    async fn test_all_feeds_down_falls_back_to_onchain_ratio() {
        let n = note(0, 2);
        let mut ledger = MockLedger::default();
        ledger.valid.push(n.commitment);
        ledger
            .batches
            .insert(2, finalized_batch(100_000_000, 1_000_000_000_000));

        let r = reconciler(Some(ledger), MockFeed::unreachable());
        let resolved = r.check_note_status(&n).await;

        assert_eq!(resolved.status, NoteStatus::Ready);
        // Raw ratio: 10_000_000 * 1_000_000_000_000 / 100_000_000.
        assert_eq!(resolved.wbtc_share, Some(100_000_000_000));
        assert_eq!(r.price_feed.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_identity_lookup_degrades_gracefully() {
        let n = note(0, 1);
        let mut ledger = MockLedger::default();
        ledger.valid.push(n.commitment);
        ledger.batches.insert(1, finalized_batch(100_000_000, 100_000));
        ledger.identity_supported = false;

        let r = reconciler(Some(ledger), MockFeed::unreachable());
        let resolved = r.check_note_status(&n).await;

        assert_eq!(resolved.status, NoteStatus::Ready);
        assert!(!resolved.has_btc_identity);
    }

    #[tokio::test]
    async fn test_identity_lookup_populates_flag() {
        let n = note(0, 1);
        let mut ledger = MockLedger::default();
        ledger.valid.push(n.commitment);
        ledger.batches.insert(1, finalized_batch(100_000_000, 100_000));
        ledger.identity_supported = true;
        ledger.identities.push(n.commitment);

        let r = reconciler(Some(ledger), MockFeed::unreachable());
        assert!(r.check_note_status(&n).await.has_btc_identity);
    }

    #[tokio::test]
    async fn test_transport_failure_resolves_pending() {
        let n = note(0, 0);
        let ledger = MockLedger {
            transport_down: true,
            ..Default::default()
        };

        let r = reconciler(Some(ledger), MockFeed::unreachable());
        let resolved = r.check_note_status(&n).await;

        assert_eq!(resolved.status, NoteStatus::Pending);
        // Retried to exhaustion before failing closed.
        assert_eq!(
            r.ledger.as_ref().unwrap().validity_calls.load(Ordering::SeqCst),
            3
        );
    }

    #[tokio::test]
    async fn test_missing_ledger_config_is_pending() {
        let n = note(0, 0);
        let r = reconciler(None, MockFeed::unreachable());
        assert_eq!(r.check_note_status(&n).await.status, NoteStatus::Pending);
    }

    #[tokio::test]
    async fn test_stale_filtered_store_untouched() {
        let stale = note(0, 0);
        let mut claimed = note(1, 0);
        claimed.claimed = true;

        let mut ledger = MockLedger::default();
        ledger.valid.push(claimed.commitment);

        let r = reconciler(Some(ledger), MockFeed::unreachable());
        r.store.save_note(&stale, None).unwrap();
        r.store.save_note(&claimed, None).unwrap();

        let resolved = r.check_all_note_statuses(None).await;
        assert_eq!(resolved.len(), 1, "stale note should be hidden");
        assert_eq!(resolved[0].status, NoteStatus::Claimed);
        assert_eq!(resolved[0].note.commitment, claimed.commitment);

        // Hidden, not deleted: the persisted list still has both.
        assert_eq!(r.store.load_notes().len(), 2);
    }

    #[tokio::test]
    async fn test_check_all_reads_encrypted_store() {
        let n = note(0, 1);
        let mut ledger = MockLedger::default();
        ledger.valid.push(n.commitment);
        ledger.batches.insert(1, finalized_batch(100_000_000, 100_000));

        let r = reconciler(Some(ledger), MockFeed::unreachable());
        r.store.save_note(&n, Some("0xwallet")).unwrap();

        let resolved = r.check_all_note_statuses(Some("0xwallet")).await;
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].status, NoteStatus::Ready);
    }
}
