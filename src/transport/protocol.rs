//! Message and peer definitions for the wire protocol.
//!
//! This module defines the value objects exchanged between peers. A
//! [`Message`] is serialized to JSON, signed, encrypted, and framed before it
//! touches the wire; a [`Peer`] describes one socket-level connection.

use crate::utils::{ProtocolError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum serialized message size (1MB)
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// A single chat or heartbeat message.
///
/// Immutable once constructed; a message flows through exactly one queue
/// direction and is discarded after consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier, generated at creation
    pub id: Uuid,
    /// Sender's peer id
    pub sender: String,
    /// Plaintext content
    pub content: String,
    /// Creation timestamp (UTC)
    pub timestamp: DateTime<Utc>,
    /// Message kind; heartbeats ride the same signed/encrypted path as chat
    #[serde(default)]
    pub kind: MessageKind,
    /// PKCS#1 v1.5 / SHA-256 signature over the serialized plaintext
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<Vec<u8>>,
}

/// Kinds of messages carried over a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MessageKind {
    /// User-visible chat text
    #[default]
    Chat,
    /// Liveness ping; recorded by the heartbeat monitor, never delivered
    Heartbeat,
}

/// A peer on the other end of one socket-level connection.
///
/// A peer that reconnects gets a fresh `Peer` value but keeps the same `id`
/// where known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    /// Stable identity for the lifetime of the logical relationship
    pub id: String,
    /// Remote host (IP address or name)
    pub address: String,
    /// Remote TCP port
    pub port: u16,
    /// Display name, if announced
    pub name: String,
    /// Whether the session is currently live
    pub is_connected: bool,
    /// When this connection was established
    pub connected_at: DateTime<Utc>,
}

impl Message {
    /// Create a new chat message
    pub fn new_chat(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: sender.into(),
            content: content.into(),
            timestamp: Utc::now(),
            kind: MessageKind::Chat,
            signature: None,
        }
    }

    /// Create a heartbeat ping
    pub fn new_heartbeat(sender: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: sender.into(),
            content: String::new(),
            timestamp: Utc::now(),
            kind: MessageKind::Heartbeat,
            signature: None,
        }
    }

    /// Serialize the message for signing, with the signature field cleared
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        let mut unsigned = self.clone();
        unsigned.signature = None;
        Ok(serde_json::to_vec(&unsigned)?)
    }

    /// Serialize the message to its JSON wire form
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let serialized = serde_json::to_vec(self)?;

        if serialized.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: serialized.len(),
                max: MAX_PAYLOAD_SIZE,
            }
            .into());
        }

        Ok(serialized)
    }

    /// Deserialize a message from its JSON wire form
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            ProtocolError::InvalidMessage {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// True for liveness pings
    pub fn is_heartbeat(&self) -> bool {
        self.kind == MessageKind::Heartbeat
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.timestamp.format("%H:%M:%S"),
            self.sender,
            self.content
        )
    }
}

impl Peer {
    /// Create a peer record for a freshly established connection
    pub fn new(id: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            address: address.into(),
            port,
            is_connected: true,
            connected_at: Utc::now(),
        }
    }

    /// `host:port` form used for connect calls and logs
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl std::fmt::Display for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.endpoint())
    }
}
