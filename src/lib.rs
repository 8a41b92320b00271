//! # Teensy Bridge Library
//!
//! Read binary telemetry from a Teensy over USB serial and configure the
//! radio transceiver that relays it.
//!
//! This library provides the core functionality: header-synchronized
//! decoding of fixed-size telemetry frames, and the ordered
//! command/acknowledge handshake that sets up the transceiver.

pub mod config;
pub mod error;
pub mod radio;
pub mod serial;
pub mod telemetry;
