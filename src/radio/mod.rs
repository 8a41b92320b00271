//! # Radio Module
//!
//! One-time configuration of the radio transceiver.
//!
//! This module handles:
//! - Command opcodes and acknowledgment bytes (`protocol`)
//! - The ordered command/acknowledge handshake (`handshake`)
//! - Verifying the resulting configuration snapshot

pub mod handshake;
pub mod protocol;

pub use handshake::{connect_and_configure, HandshakeClient, HandshakeState};
pub use protocol::{ConfigurationSnapshot, HandshakeCommand, HandshakeStep};
