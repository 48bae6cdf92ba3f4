//! VeilSwap Privacy SDK
//!
//! Note-based privacy primitives for the VeilSwap anonymity pool.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Deposit Note                             │
//! │  ┌──────────────┐  ┌──────────────┐  ┌───────────────────────┐  │
//! │  │  Commitment  │  │  Nullifier   │  │   zk Commitment /     │  │
//! │  │  (on-chain)  │  │  (withdraw)  │  │   Nullifier (circuit) │  │
//! │  └──────────────┘  └──────────────┘  └───────────────────────┘  │
//! │         │                 │                     │               │
//! │         ▼                 ▼                     ▼               │
//! │  ┌──────────────────────────────────────────────────────────┐   │
//! │  │           chain_hash(a, b) = H(H(Z, a), b)               │   │
//! │  │  • Commitment = chain(amount_hash, secret_hash)          │   │
//! │  │  • Merkle tree nodes and zero-padding ladder             │   │
//! │  │  • zk domain reduced into the ledger field               │   │
//! │  └──────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod commitment;
pub mod merkle;
pub mod note;
pub mod nullifier;

pub use commitment::{Commitment, CommitmentScheme, PoseidonHasher};
pub use merkle::{MerkleError, MerkleProof, MerkleProofBuilder, POOL_TREE_DEPTH};
pub use note::{DENOMINATIONS, Note, NoteError};
pub use nullifier::Nullifier;
