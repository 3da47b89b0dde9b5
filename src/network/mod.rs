//! Network layer: connection management, liveness, reconnection, discovery.
//!
//! All components in this module report to collaborators through a single
//! typed event channel rather than bare callbacks; the application owns the
//! receiving end and fans events out to the UI, history, and the
//! reconnection policy.

pub mod discovery;
pub mod heartbeat;
pub mod manager;
pub mod reconnect;

pub use discovery::*;
pub use heartbeat::*;
pub use manager::*;
pub use reconnect::*;

use crate::transport::{Message, Peer};

/// Events emitted by the network core to its collaborators
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    /// A session completed its handshake and entered the active set
    PeerConnected { peer: Peer },
    /// A session was torn down; fired exactly once per session
    PeerDisconnected { peer: Peer },
    /// A verified application message arrived on a session
    MessageReceived { peer_id: String, message: Message },
    /// A liveness ping arrived from a peer
    HeartbeatReceived { peer_id: String },
    /// A tracked peer exceeded the heartbeat timeout
    ConnectionFailed { peer_id: String },
    /// UDP discovery found a peer candidate
    PeerDiscovered {
        peer_id: String,
        address: String,
        port: u16,
    },
    /// A discovered peer went stale and was forgotten
    PeerLost { peer_id: String },
    /// A reconnection attempt is starting
    ReconnectAttempt { peer_id: String, attempt: u32 },
    /// Reconnection succeeded; the attempt counter was reset
    ReconnectSucceeded { peer_id: String },
    /// All reconnection attempts were exhausted
    ReconnectGaveUp { peer_id: String },
}
