//! Key-exchange handshake state machine.
//!
//! One [`HandshakeEngine`] exists per connection attempt. Both sides generate
//! a fresh RSA-2048 keypair and exchange public keys; the connector then
//! generates a random AES-256 session key, encrypts it under the acceptor's
//! public key with RSA-OAEP(SHA-256), and sends the ciphertext. The acceptor
//! decrypts it with its private key. Once both sides hold the session key the
//! handshake is Established and application messages may flow.
//!
//! Forward progress is monotonic; a reconnect creates a new engine. Any
//! cryptographic failure during the exchange fails the whole session as a
//! protocol error, so a handshake is never partially trusted.

use crate::crypto::{RsaKeyPair, SessionCipher};
use crate::session::SessionCrypto;
use crate::transport::{FrameReader, FrameWriter};
use crate::utils::{ProtocolError, Result};
use tokio::io::{AsyncRead, AsyncWrite};

/// Handshake progress for one connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// No handshake traffic yet
    Disconnected,
    /// Local public key exported for transmission
    SendingPublicKey,
    /// Peer's public key received and stored
    ReceivingPublicKey,
    /// Connector only: encrypted session key exported for transmission
    SendingSessionKey,
    /// Acceptor only: encrypted session key being decrypted
    ReceivingSessionKey,
    /// Session key agreed on both sides; terminal
    Established,
}

/// Which side of the connection this engine drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeRole {
    /// The side that opened the TCP connection; generates the session key
    Connector,
    /// The side that accepted the TCP connection; receives the session key
    Acceptor,
}

/// Per-connection key-exchange state machine
pub struct HandshakeEngine {
    role: HandshakeRole,
    state: HandshakeState,
    keypair: RsaKeyPair,
    peer_public_key: Option<Vec<u8>>,
    cipher: Option<SessionCipher>,
}

impl HandshakeEngine {
    /// Create a new engine with a fresh RSA keypair
    pub fn new(role: HandshakeRole) -> Result<Self> {
        Ok(Self {
            role,
            state: HandshakeState::Disconnected,
            keypair: RsaKeyPair::generate().map_err(handshake_failed)?,
            peer_public_key: None,
            cipher: None,
        })
    }

    /// Current handshake state
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// This engine's role
    pub fn role(&self) -> HandshakeRole {
        self.role
    }

    /// Export our public key for transmission to the peer
    pub fn public_key_bytes(&mut self) -> Result<Vec<u8>> {
        self.expect_state(HandshakeState::Disconnected, "public key export")?;
        let key = self.keypair.export_public_key().map_err(handshake_failed)?;
        self.state = HandshakeState::SendingPublicKey;
        Ok(key)
    }

    /// Accept and store the peer's public key
    pub fn receive_public_key(&mut self, peer_public_key: &[u8]) -> Result<()> {
        self.expect_state(HandshakeState::SendingPublicKey, "peer public key")?;
        // Validate the key now so a garbage key fails the handshake here
        // rather than surfacing later during the session-key exchange.
        crate::crypto::validate_public_key(peer_public_key).map_err(handshake_failed)?;
        self.peer_public_key = Some(peer_public_key.to_vec());
        self.state = HandshakeState::ReceivingPublicKey;
        Ok(())
    }

    /// Connector side: generate the session key and encrypt it for the peer
    pub fn create_encrypted_session_key(&mut self) -> Result<Vec<u8>> {
        self.expect_role(HandshakeRole::Connector, "session key creation")?;
        self.expect_state(HandshakeState::ReceivingPublicKey, "session key creation")?;

        let peer_key = self
            .peer_public_key
            .as_deref()
            .ok_or_else(|| desync("no peer public key stored"))?;

        let session_key = SessionCipher::generate_key();
        let encrypted =
            RsaKeyPair::encrypt_session_key(peer_key, &session_key).map_err(handshake_failed)?;

        self.cipher = Some(SessionCipher::new(&session_key).map_err(handshake_failed)?);
        self.state = HandshakeState::SendingSessionKey;
        Ok(encrypted)
    }

    /// Connector side: mark the handshake complete once the key was sent
    pub fn complete(&mut self) -> Result<()> {
        self.expect_role(HandshakeRole::Connector, "handshake completion")?;
        self.expect_state(HandshakeState::SendingSessionKey, "handshake completion")?;
        self.state = HandshakeState::Established;
        Ok(())
    }

    /// Acceptor side: decrypt the received session key with our private key
    pub fn receive_encrypted_session_key(&mut self, encrypted_key: &[u8]) -> Result<()> {
        self.expect_role(HandshakeRole::Acceptor, "session key receipt")?;
        self.expect_state(HandshakeState::ReceivingPublicKey, "session key receipt")?;
        self.state = HandshakeState::ReceivingSessionKey;

        let session_key = self
            .keypair
            .decrypt_session_key(encrypted_key)
            .map_err(handshake_failed)?;
        self.cipher = Some(SessionCipher::new(&session_key).map_err(handshake_failed)?);
        self.state = HandshakeState::Established;
        Ok(())
    }

    /// Whether the handshake has reached its terminal state
    pub fn is_established(&self) -> bool {
        self.state == HandshakeState::Established && self.cipher.is_some()
    }

    /// Consume the engine, yielding the crypto context for the session
    pub fn into_session(self) -> Result<SessionCrypto> {
        if !self.is_established() {
            return Err(desync("session requested before handshake completed"));
        }
        let cipher = self.cipher.ok_or_else(|| desync("no session key"))?;
        let peer_public_key = self
            .peer_public_key
            .ok_or_else(|| desync("no peer public key"))?;
        Ok(SessionCrypto::new(self.keypair, cipher, peer_public_key))
    }

    fn expect_state(&self, expected: HandshakeState, step: &str) -> Result<()> {
        if self.state != expected {
            return Err(desync(&format!(
                "{step} in state {:?} (expected {expected:?})",
                self.state
            )));
        }
        Ok(())
    }

    fn expect_role(&self, expected: HandshakeRole, step: &str) -> Result<()> {
        if self.role != expected {
            return Err(desync(&format!("{step} attempted by {:?} side", self.role)));
        }
        Ok(())
    }
}

fn desync(reason: &str) -> crate::utils::MessengerError {
    ProtocolError::HandshakeDesync {
        reason: reason.to_string(),
    }
    .into()
}

fn handshake_failed(err: crate::utils::MessengerError) -> crate::utils::MessengerError {
    ProtocolError::HandshakeFailed {
        reason: err.to_string(),
    }
    .into()
}

/// Drive the connector side of the handshake over a framed stream
pub async fn run_connector<R, W>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
) -> Result<SessionCrypto>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut engine = HandshakeEngine::new(HandshakeRole::Connector)?;

    let public_key = engine.public_key_bytes()?;
    writer.send_frame(&public_key).await?;

    let peer_public_key = reader.receive_frame().await?;
    engine.receive_public_key(&peer_public_key)?;

    let encrypted_key = engine.create_encrypted_session_key()?;
    writer.send_frame(&encrypted_key).await?;
    engine.complete()?;

    engine.into_session()
}

/// Drive the acceptor side of the handshake over a framed stream
pub async fn run_acceptor<R, W>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
) -> Result<SessionCrypto>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut engine = HandshakeEngine::new(HandshakeRole::Acceptor)?;

    let public_key = engine.public_key_bytes()?;
    let peer_public_key = reader.receive_frame().await?;
    writer.send_frame(&public_key).await?;
    engine.receive_public_key(&peer_public_key)?;

    let encrypted_key = reader.receive_frame().await?;
    engine.receive_encrypted_session_key(&encrypted_key)?;

    engine.into_session()
}
