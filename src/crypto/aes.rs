//! AES-256-CBC encryption for message content.
//!
//! Every message is encrypted with the session key and a fresh random IV.
//! The IV is prepended to the ciphertext so the receiving side can split it
//! off before decrypting.

use crate::utils::{CryptoError, Result};
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;
use rand::RngCore;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES key size in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// CBC initialization vector size in bytes
pub const IV_SIZE: usize = 16;

/// Symmetric cipher bound to one session key
#[derive(Clone)]
pub struct SessionCipher {
    key: [u8; KEY_SIZE],
}

impl SessionCipher {
    /// Generate a new random 256-bit session key
    pub fn generate_key() -> [u8; KEY_SIZE] {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        key
    }

    /// Create a cipher from raw key bytes
    pub fn new(key: &[u8]) -> Result<Self> {
        let key: [u8; KEY_SIZE] = key.try_into().map_err(|_| CryptoError::InvalidKey {
            reason: format!("expected {KEY_SIZE}-byte AES key, got {}", key.len()),
        })?;
        Ok(Self { key })
    }

    /// Encrypt a plaintext, returning `IV || ciphertext`
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut iv = [0u8; IV_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut out = Vec::with_capacity(IV_SIZE + ciphertext.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        out
    }

    /// Decrypt an `IV || ciphertext` payload
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < IV_SIZE {
            return Err(CryptoError::Decryption {
                reason: format!("payload too short for IV: {} bytes", data.len()),
            }
            .into());
        }

        let (iv, ciphertext) = data.split_at(IV_SIZE);
        let iv: [u8; IV_SIZE] = iv.try_into().expect("split_at guarantees IV length");

        Aes256CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| {
                CryptoError::Decryption {
                    reason: "invalid padding".to_string(),
                }
                .into()
            })
    }

    /// Raw key bytes
    pub fn key_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl std::fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log key material
        f.debug_struct("SessionCipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> SessionCipher {
        SessionCipher::new(&SessionCipher::generate_key()).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let cipher = cipher();
        let plaintext = b"hello secure world";

        let encrypted = cipher.encrypt(plaintext);
        let decrypted = cipher.decrypt(&encrypted).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_round_trip_empty_and_multi_block() {
        let cipher = cipher();

        for len in [0usize, 1, 15, 16, 17, 64, 4096] {
            let plaintext = vec![0xA5u8; len];
            let decrypted = cipher.decrypt(&cipher.encrypt(&plaintext)).unwrap();
            assert_eq!(decrypted, plaintext, "length {len}");
        }
    }

    #[test]
    fn test_fresh_iv_per_message() {
        let cipher = cipher();
        let a = cipher.encrypt(b"same message");
        let b = cipher.encrypt(b"same message");

        assert_ne!(a[..IV_SIZE], b[..IV_SIZE]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let a = cipher();
        let b = cipher();

        let encrypted = a.encrypt(b"secret");
        // A wrong key either trips the padding check or yields garbage;
        // it must never reproduce the plaintext.
        match b.decrypt(&encrypted) {
            Ok(plaintext) => assert_ne!(plaintext, b"secret"),
            Err(_) => {}
        }
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let cipher = cipher();
        assert!(cipher.decrypt(&[0u8; 4]).is_err());
    }

    #[test]
    fn test_invalid_key_length() {
        assert!(SessionCipher::new(&[0u8; 16]).is_err());
    }
}
