//! # Secure Messenger
//!
//! A peer-to-peer secure messaging library built on a simple framed TCP
//! protocol with end-to-end encryption.
//!
//! ## Features
//!
//! - **End-to-End Encryption**: RSA-2048 key exchange establishing a shared
//!   AES-256 session key, with per-message signatures
//! - **Bidirectional Sessions**: either side may listen or connect; every
//!   session carries traffic both ways
//! - **Resilience**: heartbeat liveness detection and bounded
//!   exponential-backoff reconnection
//! - **Decoupled Queues**: thread-safe incoming/outgoing queues separating
//!   network I/O from application logic
//! - **LAN Discovery**: optional UDP broadcast peer discovery
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use secure_messenger::{App, MessengerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MessengerConfig::default();
//!     let app = App::new(config)?;
//!     app.run(true).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`crypto`]: RSA key exchange, AES session encryption, signatures
//! - [`session`]: handshake state machine and per-session crypto context
//! - [`transport`]: wire framing, message types, and the message queues
//! - [`network`]: connection management, heartbeat, reconnection, discovery
//! - [`history`]: local message persistence
//! - [`utils`]: configuration and error handling

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod app;
pub mod crypto;
pub mod history;
pub mod network;
pub mod session;
pub mod transport;
pub mod utils;

// Re-export commonly used types for convenience
pub use app::App;
pub use history::MessageHistory;
pub use network::{ConnectionManager, NetworkEvent};
pub use session::SessionCrypto;
pub use transport::{Message, MessageQueue, Peer};
pub use utils::{MessengerConfig, MessengerError, Result};

/// Default configuration values
pub mod defaults {
    /// Default TCP port for peer connections
    pub const DEFAULT_PORT: u16 = 4040;

    /// Default UDP port for broadcast peer discovery
    pub const DEFAULT_DISCOVERY_PORT: u16 = 5001;

    /// Default interval between outbound heartbeats in seconds
    pub const DEFAULT_HEARTBEAT_INTERVAL: u64 = 5;

    /// Default silence window before a peer is declared dead in seconds
    pub const DEFAULT_HEARTBEAT_TIMEOUT: u64 = 15;

    /// Default number of reconnection attempts before giving up
    pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
}
