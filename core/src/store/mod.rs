//! Local Note Store
//!
//! The only persistence layer in the system: the user's deposit notes,
//! saved as a JSON list either in plaintext or encrypted under a key
//! derived from the wallet address. Reads fall back from the encrypted
//! blob to the plaintext list so notes created before encryption existed
//! (or under a different address) stay visible.
//!
//! Load-modify-save is not guarded by any lock: two concurrent writers
//! can race and the later full-list rewrite drops the other's change.
//! That matches the deployed behavior and is deliberately left as-is.

pub mod encryption;
pub mod keyvalue;

use log::{debug, warn};
use rand::rngs::OsRng;
use thiserror::Error;

use veilswap_privacy::{Commitment, Note};

use encryption::EncryptedBlob;
pub use keyvalue::{KeyValueStore, MemoryStore};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("key-value store error: {0}")]
    Backend(String),
    #[error("encryption failed")]
    Encryption,
    #[error("decryption failed")]
    Decryption,
    #[error("malformed note blob: {0}")]
    Malformed(String),
    #[error("no stored note with commitment {0}")]
    NoteNotFound(String),
}

/// Which path a read actually took; lets callers (and tests) distinguish
/// a decrypted blob from the plaintext migration fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Encrypted,
    PlaintextFallback(FallbackReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// No encrypted blob exists for this address yet
    MissingBlob,
    /// Blob exists but the derived key does not open it
    DecryptFailed,
    /// Blob or plaintext inside it failed to parse
    Malformed,
}

/// Note persistence over a key-value blob store
pub struct NoteStore<S> {
    kv: S,
    namespace: String,
}

impl<S: KeyValueStore> NoteStore<S> {
    pub fn new(kv: S) -> Self {
        Self::with_namespace(kv, &veilswap_config::VeilswapConfig::global().store.namespace)
    }

    pub fn with_namespace(kv: S, namespace: &str) -> Self {
        Self {
            kv,
            namespace: namespace.to_string(),
        }
    }

    fn plain_key(&self) -> String {
        format!("{}_notes", self.namespace)
    }

    fn encrypted_key(&self, wallet_address: &str) -> String {
        format!("{}_notes_enc_{}", self.namespace, wallet_address)
    }

    /// Append a note to the stored list.
    ///
    /// With a wallet address, the existing encrypted list is decrypted,
    /// appended to and re-encrypted under a fresh nonce; the read goes
    /// through the plaintext fallback, which migrates pre-encryption notes
    /// into the encrypted blob on first save. Without an address the note
    /// lands in the plaintext list.
    pub fn save_note(&self, note: &Note, wallet_address: Option<&str>) -> Result<(), StoreError> {
        match wallet_address {
            Some(address) => {
                let (mut notes, source) = self.load_notes_traced(address);
                debug!("saving note to encrypted store (existing read: {source:?})");
                notes.push(note.clone());
                self.write_encrypted(address, &notes)
            }
            None => {
                let mut notes = self.load_notes();
                notes.push(note.clone());
                self.write_plaintext(&notes)
            }
        }
    }

    /// Read the plaintext list. Absent or unparsable data yields an empty
    /// list; this read never fails.
    pub fn load_notes(&self) -> Vec<Note> {
        match self.try_load_plaintext() {
            Ok(notes) => notes,
            Err(e) => {
                warn!("plaintext note list unreadable: {e}; treating as empty");
                Vec::new()
            }
        }
    }

    /// Read the encrypted list for an address, falling back to the
    /// plaintext store on any failure. Never fails.
    pub fn load_notes_encrypted(&self, wallet_address: &str) -> Vec<Note> {
        self.load_notes_traced(wallet_address).0
    }

    /// As [`load_notes_encrypted`](Self::load_notes_encrypted), but
    /// reporting which path actually produced the result.
    pub fn load_notes_traced(&self, wallet_address: &str) -> (Vec<Note>, LoadSource) {
        match self.try_load_encrypted(wallet_address) {
            Ok(notes) => (notes, LoadSource::Encrypted),
            Err(e) => {
                let reason = match e {
                    StoreError::Decryption => FallbackReason::DecryptFailed,
                    StoreError::Malformed(_) => FallbackReason::Malformed,
                    _ => FallbackReason::MissingBlob,
                };
                debug!("encrypted note read fell back to plaintext: {e}");
                (self.load_notes(), LoadSource::PlaintextFallback(reason))
            }
        }
    }

    /// Flip `claimed` on the note with this exact commitment and persist
    /// the rewritten list. One-way: a claimed note never becomes
    /// unclaimed.
    pub fn mark_note_claimed(
        &self,
        commitment: &Commitment,
        wallet_address: Option<&str>,
    ) -> Result<(), StoreError> {
        match wallet_address {
            Some(address) => {
                let mut notes = self.load_notes_encrypted(address);
                claim_in_list(&mut notes, commitment)?;
                self.write_encrypted(address, &notes)
            }
            None => {
                let mut notes = self.load_notes();
                claim_in_list(&mut notes, commitment)?;
                self.write_plaintext(&notes)
            }
        }
    }

    /// Project stored notes to their commitments, for the Merkle proof
    /// builder's leaf list.
    pub fn get_all_commitments(&self, wallet_address: Option<&str>) -> Vec<Commitment> {
        let notes = match wallet_address {
            Some(address) => self.load_notes_encrypted(address),
            None => self.load_notes(),
        };
        notes.iter().map(|n| n.commitment).collect()
    }

    // ------------------------------------------------------------------
    // Internal tagged helpers
    // ------------------------------------------------------------------

    fn try_load_plaintext(&self) -> Result<Vec<Note>, StoreError> {
        let Some(raw) = self.kv.get(&self.plain_key())? else {
            return Ok(Vec::new());
        };
        serde_json::from_slice(&raw).map_err(|e| StoreError::Malformed(e.to_string()))
    }

    fn try_load_encrypted(&self, wallet_address: &str) -> Result<Vec<Note>, StoreError> {
        let Some(raw) = self.kv.get(&self.encrypted_key(wallet_address))? else {
            return Err(StoreError::Backend("no encrypted blob".into()));
        };
        let blob: EncryptedBlob =
            serde_json::from_slice(&raw).map_err(|e| StoreError::Malformed(e.to_string()))?;
        let key = encryption::derive_key(wallet_address);
        let plaintext = encryption::decrypt(&key, &blob)?;
        serde_json::from_slice(&plaintext).map_err(|e| StoreError::Malformed(e.to_string()))
    }

    fn write_plaintext(&self, notes: &[Note]) -> Result<(), StoreError> {
        let raw = serde_json::to_vec(notes).map_err(|e| StoreError::Malformed(e.to_string()))?;
        self.kv.set(&self.plain_key(), raw)
    }

    fn write_encrypted(&self, wallet_address: &str, notes: &[Note]) -> Result<(), StoreError> {
        let plaintext =
            serde_json::to_vec(notes).map_err(|e| StoreError::Malformed(e.to_string()))?;
        let key = encryption::derive_key(wallet_address);
        let blob = encryption::encrypt(&key, &plaintext, &mut OsRng)?;
        let raw = serde_json::to_vec(&blob).map_err(|e| StoreError::Malformed(e.to_string()))?;
        self.kv.set(&self.encrypted_key(wallet_address), raw)
    }
}

fn claim_in_list(notes: &mut [Note], commitment: &Commitment) -> Result<(), StoreError> {
    let note = notes
        .iter_mut()
        .find(|n| n.commitment == *commitment)
        .ok_or_else(|| StoreError::NoteNotFound(commitment.to_hex()))?;
    note.claimed = true;
    Ok(())
}
