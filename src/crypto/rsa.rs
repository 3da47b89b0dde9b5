//! RSA key management for the session handshake.
//!
//! Each connection generates a fresh 2048-bit RSA keypair. The public half is
//! exchanged during the handshake and serves two purposes: the connector
//! encrypts the AES session key under it (RSA-OAEP with SHA-256), and every
//! application message is signed with the private half (PKCS#1 v1.5 with
//! SHA-256) so the peer can verify the sender.

use crate::utils::{CryptoError, Result};
use rsa::pkcs1::{DecodeRsaPublicKey, EncodeRsaPublicKey};
use rsa::{Oaep, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

/// RSA modulus size in bits
pub const RSA_KEY_BITS: usize = 2048;

/// An RSA keypair bound to one connection attempt.
///
/// Keys are never persisted; a reconnect generates a new pair.
pub struct RsaKeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl RsaKeyPair {
    /// Generate a fresh 2048-bit keypair
    pub fn generate() -> Result<Self> {
        let mut rng = rand::thread_rng();
        let private =
            RsaPrivateKey::new(&mut rng, RSA_KEY_BITS).map_err(|e| CryptoError::KeyGeneration {
                reason: e.to_string(),
            })?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// Export the public key as PKCS#1 DER bytes for transmission to a peer
    pub fn export_public_key(&self) -> Result<Vec<u8>> {
        let der = self
            .public
            .to_pkcs1_der()
            .map_err(|e| CryptoError::InvalidKey {
                reason: e.to_string(),
            })?;
        Ok(der.as_bytes().to_vec())
    }

    /// Encrypt an AES session key under a peer's exported public key
    pub fn encrypt_session_key(peer_public_key: &[u8], session_key: &[u8]) -> Result<Vec<u8>> {
        let peer_key = import_public_key(peer_public_key)?;
        let mut rng = rand::thread_rng();
        peer_key
            .encrypt(&mut rng, Oaep::new::<Sha256>(), session_key)
            .map_err(|e| {
                CryptoError::Encryption {
                    reason: e.to_string(),
                }
                .into()
            })
    }

    /// Decrypt a session key that was encrypted under our public key
    pub fn decrypt_session_key(&self, encrypted_key: &[u8]) -> Result<Vec<u8>> {
        self.private
            .decrypt(Oaep::new::<Sha256>(), encrypted_key)
            .map_err(|e| {
                CryptoError::Decryption {
                    reason: e.to_string(),
                }
                .into()
            })
    }

    /// Sign data with our private key (PKCS#1 v1.5, SHA-256)
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let digest = Sha256::digest(data);
        self.private
            .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
            .map_err(|e| {
                CryptoError::Encryption {
                    reason: e.to_string(),
                }
                .into()
            })
    }
}

impl std::fmt::Debug for RsaKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaKeyPair").finish_non_exhaustive()
    }
}

/// Verify a signature against a peer's exported public key.
///
/// Returns `Err(CryptoError::SignatureVerification)` for a tampered or
/// mismatched signature; callers drop the message rather than propagate.
pub fn verify_signature(peer_public_key: &[u8], data: &[u8], signature: &[u8]) -> Result<()> {
    let peer_key = import_public_key(peer_public_key)?;
    let digest = Sha256::digest(data);
    peer_key
        .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
        .map_err(|_| CryptoError::SignatureVerification.into())
}

/// Check that a peer-supplied key parses as PKCS#1 DER
pub fn validate_public_key(der: &[u8]) -> Result<()> {
    import_public_key(der).map(|_| ())
}

fn import_public_key(der: &[u8]) -> Result<RsaPublicKey> {
    RsaPublicKey::from_pkcs1_der(der).map_err(|e| {
        CryptoError::InvalidKey {
            reason: e.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_round_trip() {
        let keypair = RsaKeyPair::generate().unwrap();
        let exported = keypair.export_public_key().unwrap();
        assert!(import_public_key(&exported).is_ok());
    }

    #[test]
    fn test_session_key_round_trip() {
        let keypair = RsaKeyPair::generate().unwrap();
        let exported = keypair.export_public_key().unwrap();

        let session_key = [0x42u8; 32];
        let encrypted = RsaKeyPair::encrypt_session_key(&exported, &session_key).unwrap();
        let decrypted = keypair.decrypt_session_key(&encrypted).unwrap();

        assert_eq!(decrypted, session_key);
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let keypair = RsaKeyPair::generate().unwrap();
        let exported = keypair.export_public_key().unwrap();

        let session_key = [0x42u8; 32];
        let mut encrypted = RsaKeyPair::encrypt_session_key(&exported, &session_key).unwrap();
        encrypted[0] ^= 0x01;

        // OAEP padding check must fail rather than yield a corrupted key
        assert!(keypair.decrypt_session_key(&encrypted).is_err());
    }

    #[test]
    fn test_sign_and_verify() {
        let keypair = RsaKeyPair::generate().unwrap();
        let exported = keypair.export_public_key().unwrap();

        let data = b"hello signed world";
        let signature = keypair.sign(data).unwrap();

        assert!(verify_signature(&exported, data, &signature).is_ok());
        assert!(verify_signature(&exported, b"tampered data", &signature).is_err());
    }

    #[test]
    fn test_wrong_key_rejects_signature() {
        let signer = RsaKeyPair::generate().unwrap();
        let other = RsaKeyPair::generate().unwrap();
        let other_public = other.export_public_key().unwrap();

        let data = b"payload";
        let signature = signer.sign(data).unwrap();

        assert!(verify_signature(&other_public, data, &signature).is_err());
    }
}
