//! VeilSwap Client Core
//!
//! The client side of the VeilSwap anonymity pool: deposits are recorded
//! as locally held secret notes, and withdrawal eligibility is derived by
//! reconciling those notes against the eventually-consistent on-chain
//! ledger. There is no server-side database; the encrypted local note
//! store is the only persistence layer.
//!
//! ```text
//! ┌────────────┐   save/load    ┌────────────┐   status per note   ┌──────────┐
//! │     UI     │ ─────────────▶ │  NoteStore │ ──────────────────▶ │  Ledger  │
//! │            │ ◀───────────── │ (encrypted)│ ◀── NoteReconciler ─│  reader  │
//! └────────────┘  NoteWithStatus└────────────┘     + price feeds   └──────────┘
//! ```

pub mod reconciler;
pub mod store;

pub use reconciler::{
    BatchResult, LedgerError, LedgerReader, NoteReconciler, NoteStatus, NoteWithStatus,
    PriceError, PriceFeed, RankedPriceFeed, RetryPolicy, RpcLedgerReader, WITHDRAW_COOLDOWN_SECS,
};
pub use store::{
    FallbackReason, KeyValueStore, LoadSource, MemoryStore, NoteStore, StoreError,
};
