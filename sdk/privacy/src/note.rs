//! Deposit Notes
//!
//! A Note is the private record a depositor holds: the secret material
//! behind a pool commitment, plus its position in the deposit sequence.
//! The on-chain ledger never sees the unhashed secret; it validates
//! entirely by commitment equality, so every derived hash must recompute
//! identically from the stored fields.

use rand::{CryptoRng, Rng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::commitment::{Commitment, CommitmentScheme};
use crate::nullifier::Nullifier;

/// Allowed deposit amounts, USDC base units (6 decimals), indexed by tier.
/// Uniform sizes keep deposits indistinguishable within a tier.
pub const DENOMINATIONS: [u64; 4] = [10_000_000, 100_000_000, 1_000_000_000, 10_000_000_000];

/// Secrets are constrained to 31 bytes so they always fit in the field.
const SECRET_BYTES: usize = 31;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NoteError {
    #[error("invalid denomination tier: {0}")]
    InvalidDenomination(u8),
}

/// A deposit note. `secret` and `blinder` leave the client only inside a
/// withdrawal proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    #[serde(with = "hex::serde")]
    pub secret: [u8; 32],
    #[serde(with = "hex::serde")]
    pub blinder: [u8; 32],
    /// One of the four fixed denomination amounts
    pub amount: u64,
    /// Tier index into `DENOMINATIONS`
    pub denomination: u8,
    pub commitment: Commitment,
    /// Circuit-domain commitment, reduced into the ledger field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zk_commitment: Option<Commitment>,
    /// Circuit-domain nullifier, reduced into the ledger field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zk_nullifier: Option<Nullifier>,
    /// Batch of the pooled conversion this deposit joined
    pub batch_id: u64,
    /// Position in the deposit sequence; provisional 0 until confirmed
    pub leaf_index: u64,
    /// Locally authoritative, set exactly once by a successful withdrawal
    pub claimed: bool,
    /// Creation time, unix seconds
    pub timestamp: i64,
    /// Secondary identity binding, opaque to this crate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub btc_identity_hash: Option<String>,
}

impl Note {
    /// Generate a fresh note for a denomination tier.
    ///
    /// Fails hard on an unknown tier: that is a programming error, not a
    /// runtime condition.
    pub fn generate<R: Rng + CryptoRng>(
        tier: u8,
        batch_id: u64,
        rng: &mut R,
    ) -> Result<Self, NoteError> {
        let amount = *DENOMINATIONS
            .get(tier as usize)
            .ok_or(NoteError::InvalidDenomination(tier))?;

        let secret = random_field_bytes(rng);
        let blinder = random_field_bytes(rng);
        let scheme = CommitmentScheme::new();
        let commitment = scheme.compute_commitment(amount as u128, &secret, &blinder);

        Ok(Self {
            secret,
            blinder,
            amount,
            denomination: tier,
            commitment,
            zk_commitment: None,
            zk_nullifier: None,
            batch_id,
            leaf_index: 0,
            claimed: false,
            timestamp: chrono::Utc::now().timestamp(),
            btc_identity_hash: None,
        })
    }

    /// Generate a note carrying the circuit-domain pair alongside the
    /// verifier-domain commitment.
    pub fn generate_private<R: Rng + CryptoRng>(
        tier: u8,
        batch_id: u64,
        rng: &mut R,
    ) -> Result<Self, NoteError> {
        let mut note = Self::generate(tier, batch_id, rng)?;
        let scheme = CommitmentScheme::new();
        note.zk_commitment = Some(Commitment(scheme.compute_zk_commitment(
            &note.secret,
            &note.blinder,
            tier,
        )));
        note.zk_nullifier = Some(Nullifier(scheme.compute_zk_nullifier(&note.secret)));
        Ok(note)
    }

    /// Verifier-domain nullifier for this note
    pub fn nullifier(&self) -> Nullifier {
        CommitmentScheme::new().compute_nullifier(&self.secret)
    }

    /// Recompute the commitment from the stored secret material
    pub fn recompute_commitment(&self) -> Commitment {
        CommitmentScheme::new().compute_commitment(self.amount as u128, &self.secret, &self.blinder)
    }
}

/// 31 random bytes, left-padded to 32: always below 2^248, so well inside
/// the field.
fn random_field_bytes<R: Rng + CryptoRng>(rng: &mut R) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    rng.fill_bytes(&mut bytes[..SECRET_BYTES]);
    bytes
}
