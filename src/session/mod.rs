//! Session layer: key-exchange handshake and per-session crypto.
//!
//! A session binds one peer connection to its handshake state and, once the
//! handshake completes, to the crypto context used to seal and open every
//! message on that connection.

pub mod handshake;
pub mod secure;

pub use handshake::*;
pub use secure::*;
