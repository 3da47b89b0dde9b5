//! Transport layer for peer-to-peer messaging.
//!
//! This module provides the pieces between raw TCP streams and application
//! logic: length-prefixed framing, the message/peer data model, and the
//! thread-safe queues that decouple network I/O from the rest of the system.

pub mod framing;
pub mod protocol;
pub mod queue;

pub use framing::*;
pub use protocol::*;
pub use queue::*;
