//! Cryptographic primitives for the secure messenger.
//!
//! This module provides the building blocks used by the session handshake:
//! per-connection RSA keypairs for key exchange and message signing, and
//! AES-256-CBC for symmetric message encryption.

pub mod aes;
pub mod rsa;

pub use aes::*;
pub use rsa::*;
