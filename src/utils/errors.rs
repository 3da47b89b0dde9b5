//! Error types and handling for the secure messenger.
//!
//! This module provides a unified error handling system across all components
//! of the messenger, implementing proper error propagation and user-friendly
//! error messages.

use thiserror::Error;

/// Result type alias for the messenger library
pub type Result<T> = std::result::Result<T, MessengerError>;

/// Comprehensive error type for all messenger operations
#[derive(Error, Debug, Clone)]
pub enum MessengerError {
    /// Cryptographic operation errors
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),

    /// Network and transport layer errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Protocol-level errors (framing, handshake, signatures)
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Configuration and I/O errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The remote peer closed the stream
    #[error("Stream closed by peer")]
    StreamClosed,

    /// Dequeue after the message queues were shut down
    #[error("Message queue closed")]
    QueueClosed,

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// UTF-8 conversion errors
    #[error("UTF-8 error: {0}")]
    Utf8(String),
}

/// Cryptographic operation errors
#[derive(Error, Debug, Clone)]
pub enum CryptoError {
    /// Invalid key format or size
    #[error("Invalid key: {reason}")]
    InvalidKey { reason: String },

    /// Key generation failure
    #[error("Key generation failed: {reason}")]
    KeyGeneration { reason: String },

    /// Signature verification failure
    #[error("Signature verification failed")]
    SignatureVerification,

    /// Encryption operation failure
    #[error("Encryption failed: {reason}")]
    Encryption { reason: String },

    /// Decryption operation failure
    #[error("Decryption failed: {reason}")]
    Decryption { reason: String },
}

/// Network and transport layer errors
#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    /// Connection establishment failure
    #[error("Connection failed to {peer}: {reason}")]
    ConnectionFailed { peer: String, reason: String },

    /// Listener could not bind to the requested port
    #[error("Failed to listen on port {port}: {reason}")]
    ListenFailed { port: u16, reason: String },

    /// Peer not found in the active session set
    #[error("Peer not found: {peer_id}")]
    PeerNotFound { peer_id: String },

    /// Peer is known but the handshake has not completed
    #[error("Session with {peer_id} not established")]
    NotEstablished { peer_id: String },

    /// Peer discovery failure
    #[error("Peer discovery failed: {reason}")]
    DiscoveryFailed { reason: String },

    /// Timeout during network operation
    #[error("Network timeout: {operation}")]
    Timeout { operation: String },
}

/// Protocol-level errors; all of these are fatal to the session they occur on
#[derive(Error, Debug, Clone)]
pub enum ProtocolError {
    /// Malformed length prefix on a frame
    #[error("Invalid frame length: {reason}")]
    InvalidLength { reason: String },

    /// Frame payload larger than the allowed maximum
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Invalid message format
    #[error("Invalid message format: {reason}")]
    InvalidMessage { reason: String },

    /// Handshake message arrived in the wrong state
    #[error("Handshake desync: {reason}")]
    HandshakeDesync { reason: String },

    /// Handshake cryptographic step failed
    #[error("Handshake failed: {reason}")]
    HandshakeFailed { reason: String },
}

/// Configuration and setup errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Configuration parsing error
    #[error("Configuration parse error: {reason}")]
    ParseError { reason: String },

    /// Directory creation failure
    #[error("Failed to create directory: {path}")]
    DirectoryCreation { path: String },
}

impl MessengerError {
    /// Returns true if this error is fatal to the session it occurred on
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::StreamClosed)
    }

    /// Returns true if the peer is eligible for reconnection after this error
    pub fn is_reconnect_eligible(&self) -> bool {
        matches!(
            self,
            Self::StreamClosed
                | Self::Network(NetworkError::ConnectionFailed { .. })
                | Self::Network(NetworkError::Timeout { .. })
        )
    }

    /// Returns true if this error indicates a security violation
    pub fn is_security_violation(&self) -> bool {
        matches!(
            self,
            Self::Crypto(CryptoError::SignatureVerification)
                | Self::Crypto(CryptoError::Decryption { .. })
        )
    }
}

impl From<std::io::Error> for MessengerError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe => Self::StreamClosed,
            _ => Self::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for MessengerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::str::Utf8Error> for MessengerError {
    fn from(err: std::str::Utf8Error) -> Self {
        Self::Utf8(err.to_string())
    }
}

impl From<toml::de::Error> for MessengerError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(ConfigError::ParseError {
            reason: err.to_string(),
        })
    }
}
