//! Note Blob Encryption
//!
//! Encrypts the stored note list with a key derived from the wallet
//! address.
//!
//! ```text
//! key        = PBKDF2-SHA256(address, salt = "veilswap-notes-v1", 100_000)
//! blob       = AES-256-GCM(key, nonce, json(notes))
//! persisted  = { nonce, ciphertext }   (fresh 96-bit nonce per save)
//! ```
//!
//! The address is public information, so this is obfuscation against
//! casual local-storage access, not confidentiality against an informed
//! attacker. The derivation is kept as-is for compatibility with existing
//! stored blobs.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use pbkdf2::pbkdf2_hmac;
use rand::{CryptoRng, Rng};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::StoreError;

/// Fixed app-domain salt; changing it orphans every existing blob
pub const KDF_SALT: &[u8] = b"veilswap-notes-v1";
pub const KDF_ITERATIONS: u32 = 100_000;

/// Persisted envelope: nonce beside ciphertext
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedBlob {
    #[serde(with = "hex::serde")]
    pub nonce: [u8; 12],
    #[serde(with = "hex::serde")]
    pub ciphertext: Vec<u8>,
}

/// Derive the AES-256-GCM key for a wallet address
pub fn derive_key(wallet_address: &str) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(
        wallet_address.as_bytes(),
        KDF_SALT,
        KDF_ITERATIONS,
        &mut key,
    );
    key
}

pub fn encrypt<R: Rng + CryptoRng>(
    key: &[u8; 32],
    plaintext: &[u8],
    rng: &mut R,
) -> Result<EncryptedBlob, StoreError> {
    let mut nonce = [0u8; 12];
    rng.fill_bytes(&mut nonce);

    let cipher = Aes256Gcm::new_from_slice(key).expect("32-byte key");
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| StoreError::Encryption)?;

    Ok(EncryptedBlob { nonce, ciphertext })
}

pub fn decrypt(key: &[u8; 32], blob: &EncryptedBlob) -> Result<Vec<u8>, StoreError> {
    let cipher = Aes256Gcm::new_from_slice(key).expect("32-byte key");
    cipher
        .decrypt(Nonce::from_slice(&blob.nonce), blob.ciphertext.as_slice())
        .map_err(|_| StoreError::Decryption)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let key = derive_key("0xabc123");
        let blob = encrypt(&key, b"note list", &mut OsRng).unwrap();
        assert_eq!(decrypt(&key, &blob).unwrap(), b"note list");
    }

    #[test]
    fn test_wrong_key_fails() {
        let blob = encrypt(&derive_key("0xabc"), b"secret", &mut OsRng).unwrap();
        assert_eq!(
            decrypt(&derive_key("0xdef"), &blob).unwrap_err(),
            StoreError::Decryption
        );
    }

    #[test]
    fn test_fresh_nonce_per_save() {
        let key = derive_key("0xabc");
        let a = encrypt(&key, b"same", &mut OsRng).unwrap();
        let b = encrypt(&key, b"same", &mut OsRng).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_key_derivation_deterministic() {
        assert_eq!(derive_key("0xabc"), derive_key("0xabc"));
        assert_ne!(derive_key("0xabc"), derive_key("0xabd"));
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let key = derive_key("0xabc");
        let mut blob = encrypt(&key, b"payload", &mut OsRng).unwrap();
        blob.ciphertext[0] ^= 1;
        assert!(decrypt(&key, &blob).is_err());
    }
}
