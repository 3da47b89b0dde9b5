//! Signed and encrypted message processing for an established session.
//!
//! Outbound: serialize → sign with our RSA key → encrypt under the session
//! key (fresh IV per message, IV prepended) → ready for framing. Inbound:
//! decrypt → parse → verify the signature against the peer's handshake
//! public key. A message that fails verification is dropped by the caller,
//! never delivered to the application.

use crate::crypto::{verify_signature, RsaKeyPair, SessionCipher};
use crate::transport::Message;
use crate::utils::{CryptoError, Result};

/// Crypto context for one established session
pub struct SessionCrypto {
    keypair: RsaKeyPair,
    cipher: SessionCipher,
    peer_public_key: Vec<u8>,
}

impl SessionCrypto {
    /// Bundle the handshake outputs into a session context
    pub(crate) fn new(keypair: RsaKeyPair, cipher: SessionCipher, peer_public_key: Vec<u8>) -> Self {
        Self {
            keypair,
            cipher,
            peer_public_key,
        }
    }

    /// Sign and encrypt an outbound message, returning the frame payload
    pub fn seal(&self, message: &Message) -> Result<Vec<u8>> {
        let mut signed = message.clone();
        let signature = self.keypair.sign(&signed.signing_bytes()?)?;
        signed.signature = Some(signature);

        let plaintext = signed.to_bytes()?;
        Ok(self.cipher.encrypt(&plaintext))
    }

    /// Decrypt and verify an inbound frame payload.
    ///
    /// # Errors
    ///
    /// [`CryptoError::Decryption`] for a payload that does not decrypt under
    /// the session key; [`CryptoError::SignatureVerification`] for a missing
    /// or invalid signature. Both mean the message must be dropped.
    pub fn open(&self, payload: &[u8]) -> Result<Message> {
        let plaintext = self.cipher.decrypt(payload)?;
        let message = Message::from_bytes(&plaintext)?;

        let signature = message
            .signature
            .as_deref()
            .ok_or(CryptoError::SignatureVerification)?;
        verify_signature(&self.peer_public_key, &message.signing_bytes()?, signature)?;

        Ok(message)
    }

    /// The peer's handshake public key, used as its identity fingerprint
    pub fn peer_public_key(&self) -> &[u8] {
        &self.peer_public_key
    }

    /// Short hex fingerprint of the peer's public key for logs and UI
    pub fn peer_fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(&self.peer_public_key);
        hex::encode(&digest[..8])
    }
}

impl std::fmt::Debug for SessionCrypto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCrypto")
            .field("peer_fingerprint", &self.peer_fingerprint())
            .finish_non_exhaustive()
    }
}
