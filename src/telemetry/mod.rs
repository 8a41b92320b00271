//! # Telemetry Module
//!
//! Binary telemetry from the Teensy.
//!
//! This module handles:
//! - Frame layout and sample types (`protocol`)
//! - Header synchronization and decoding (`decoder`)
//! - Collecting samples until cancelled
//! - Exporting samples as JSONL (`writer`)

pub mod decoder;
pub mod protocol;
pub mod writer;

pub use decoder::{SyncPolicy, TelemetryDecoder};
pub use protocol::{TelemetrySample, COLUMN_HEADERS};
