//! Nullifiers
//!
//! Implements nullifier derivation for double-spend prevention.
//!
//! ```text
//! Nullifier = chain_hash(chain_hash(Z, secret), 1)
//! ```
//!
//! Once a nullifier is published at withdrawal, the corresponding
//! commitment cannot be spent again. The constant `1` is the spend marker
//! appended after hashing the secret once.

use ark_bls12_381::Fr;
use ark_ff::{One, PrimeField, Zero};
use serde::{Deserialize, Serialize};

use crate::commitment::{CommitmentScheme, field_to_bytes, reduce_to_ledger_field};

/// A nullifier (32 bytes) - unique spend tag for a note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Nullifier(#[serde(with = "hex::serde")] pub [u8; 32]);

impl Nullifier {
    /// Create from field element
    pub fn from_field(f: Fr) -> Self {
        Self(field_to_bytes(f))
    }

    /// Convert to field element
    pub fn to_field(&self) -> Fr {
        Fr::from_le_bytes_mod_order(&self.0)
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl AsRef<[u8]> for Nullifier {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl CommitmentScheme {
    /// Verifier-domain nullifier: `chain(chain(Z, secret), 1)`
    pub fn compute_nullifier(&self, secret: &[u8; 32]) -> Nullifier {
        let inner = self
            .hasher()
            .chain_hash(Fr::zero(), Fr::from_le_bytes_mod_order(secret));
        Nullifier::from_field(self.hasher().chain_hash(inner, Fr::one()))
    }

    /// Circuit-domain nullifier in the native field, unreduced:
    /// `Poseidon(secret, 1)`
    pub fn compute_zk_nullifier_raw(&self, secret: &[u8; 32]) -> Fr {
        self.hasher()
            .hash_many(&[Fr::from_le_bytes_mod_order(secret), Fr::one()])
    }

    /// Circuit-domain nullifier reduced into the ledger field
    pub fn compute_zk_nullifier(&self, secret: &[u8; 32]) -> [u8; 32] {
        reduce_to_ledger_field(self.compute_zk_nullifier_raw(secret))
    }
}
