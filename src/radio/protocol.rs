//! # Radio Configuration Protocol
//!
//! Opcodes and acknowledgment bytes understood by the transceiver module.
//!
//! Every configuration command is answered with a single `0xAA`. The
//! verify command is answered with `0xA6` followed by a 6-byte snapshot of
//! the active configuration.

use std::time::Duration;

/// Acknowledgment byte for configuration commands
pub const ACK_BYTE: u8 = 0xAA;

/// Set baud rate
pub const OPCODE_SET_BAUD: &[u8] = &[0xA3, 0x3A, 0x02];

/// Set radio channel
pub const OPCODE_SET_CHANNEL: &[u8] = &[0xA7, 0x7A, 0x01];

/// Set device ID
pub const OPCODE_SET_ID: &[u8] = &[0xA9, 0x9A, 0x01, 0x01];

/// Set transmit power
pub const OPCODE_SET_POWER: &[u8] = &[0xAB, 0xBA, 0x0A];

/// Read back the active configuration
pub const OPCODE_VERIFY: &[u8] = &[0xA6, 0x6A];

/// First byte of the verify response
pub const VERIFY_RESPONSE_HEADER: u8 = 0xA6;

/// Snapshot bytes following the verify response header
pub const SNAPSHOT_LEN: usize = 6;

/// One exchange of the configuration handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeStep {
    SetBaudRate,
    SetChannel,
    SetDeviceId,
    SetTxPower,
    Verify,
}

impl HandshakeStep {
    pub fn name(&self) -> &'static str {
        match self {
            HandshakeStep::SetBaudRate => "set-baud-rate",
            HandshakeStep::SetChannel => "set-channel",
            HandshakeStep::SetDeviceId => "set-device-id",
            HandshakeStep::SetTxPower => "set-tx-power",
            HandshakeStep::Verify => "verify",
        }
    }
}

impl std::fmt::Display for HandshakeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A configuration command and the acknowledgment it expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeCommand {
    pub step: HandshakeStep,
    pub opcode: &'static [u8],
    pub expected_ack: u8,
    pub timeout: Duration,
}

impl HandshakeCommand {
    /// The fixed configuration sequence, in the order it must be sent
    pub fn configuration_sequence(timeout: Duration) -> Vec<HandshakeCommand> {
        [
            (HandshakeStep::SetBaudRate, OPCODE_SET_BAUD),
            (HandshakeStep::SetChannel, OPCODE_SET_CHANNEL),
            (HandshakeStep::SetDeviceId, OPCODE_SET_ID),
            (HandshakeStep::SetTxPower, OPCODE_SET_POWER),
        ]
        .into_iter()
        .map(|(step, opcode)| HandshakeCommand {
            step,
            opcode,
            expected_ack: ACK_BYTE,
            timeout,
        })
        .collect()
    }
}

/// Raw configuration reported by the transceiver after verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigurationSnapshot([u8; SNAPSHOT_LEN]);

impl ConfigurationSnapshot {
    pub fn new(bytes: [u8; SNAPSHOT_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for ConfigurationSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}
