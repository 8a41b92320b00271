//! # Telemetry Wire Format
//!
//! Frame layout sent by the Teensy:
//!
//! ```text
//! AA 55 | i32 boom_encoder | f32 height_mm | f32 accel[3] | f32 gyro[3] | f32 mag[3]
//! ```
//!
//! All values are little-endian. The payload is always 44 bytes.

use bytes::{Buf, BufMut};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{BridgeError, Result};

/// Frame header marker
pub const HEADER: [u8; 2] = [0xAA, 0x55];

/// Payload size: one i32 plus ten f32 values
pub const PAYLOAD_SIZE: usize = 4 + 10 * 4;

/// Header plus payload
pub const FRAME_SIZE: usize = HEADER.len() + PAYLOAD_SIZE;

/// Height arrives in millimeters
pub const MM_PER_M: f64 = 1000.0;

/// Column names, with physical units, in `TelemetrySample::row` order
pub const COLUMN_HEADERS: [&str; 12] = [
    "time",
    "height [m]",
    "boom pos [encoder val]",
    "accel x [m/s^2]",
    "accel y [m/s^2]",
    "accel z [m/s^2]",
    "gyro x [rad/s]",
    "gyro y [rad/s]",
    "gyro z [rad/s]",
    "mag x [uT]",
    "mag y [uT]",
    "mag z [uT]",
];

/// Payload values exactly as they appear on the wire
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawFrame {
    pub boom_encoder: i32,
    pub height_mm: f32,
    pub accel: [f32; 3],
    pub gyro: [f32; 3],
    pub mag: [f32; 3],
}

/// One decoded sensor record
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetrySample {
    /// Wall-clock time at which decoding completed
    pub capture_time: DateTime<Utc>,

    /// Height in meters
    pub height_m: f64,

    /// Boom encoder count
    pub boom_encoder: i32,

    /// Acceleration in m/s^2 (x, y, z)
    pub accel: [f32; 3],

    /// Angular rate in rad/s (x, y, z)
    pub gyro: [f32; 3],

    /// Magnetic field in uT (x, y, z)
    pub mag: [f32; 3],
}

impl TelemetrySample {
    /// Convert a raw frame into a sample stamped with `capture_time`
    pub fn from_raw(raw: RawFrame, capture_time: DateTime<Utc>) -> Self {
        Self {
            capture_time,
            height_m: raw.height_mm as f64 / MM_PER_M,
            boom_encoder: raw.boom_encoder,
            accel: raw.accel,
            gyro: raw.gyro,
            mag: raw.mag,
        }
    }

    /// Values in `COLUMN_HEADERS` order; time is seconds since the Unix epoch
    pub fn row(&self) -> [f64; 12] {
        let time = self.capture_time.timestamp_micros() as f64 / 1_000_000.0;
        [
            time,
            self.height_m,
            self.boom_encoder as f64,
            self.accel[0] as f64,
            self.accel[1] as f64,
            self.accel[2] as f64,
            self.gyro[0] as f64,
            self.gyro[1] as f64,
            self.gyro[2] as f64,
            self.mag[0] as f64,
            self.mag[1] as f64,
            self.mag[2] as f64,
        ]
    }
}

impl std::fmt::Display for TelemetrySample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "height = {:3.0} mm, boom pos = {:4}, imu acceleration = {:3.1} {:3.1} {:3.1}",
            self.height_m * MM_PER_M,
            self.boom_encoder,
            self.accel[0],
            self.accel[1],
            self.accel[2]
        )
    }
}

/// Decode a 44-byte payload (header already stripped)
///
/// # Errors
///
/// Returns `IncompleteFrame` if fewer than `PAYLOAD_SIZE` bytes are given
pub fn parse_payload(payload: &[u8]) -> Result<RawFrame> {
    if payload.len() < PAYLOAD_SIZE {
        return Err(BridgeError::IncompleteFrame {
            expected: PAYLOAD_SIZE,
            received: payload.len(),
        });
    }

    let mut buf = &payload[..PAYLOAD_SIZE];
    let boom_encoder = buf.get_i32_le();
    let height_mm = buf.get_f32_le();

    let mut axes = [0f32; 9];
    for axis in axes.iter_mut() {
        *axis = buf.get_f32_le();
    }

    Ok(RawFrame {
        boom_encoder,
        height_mm,
        accel: [axes[0], axes[1], axes[2]],
        gyro: [axes[3], axes[4], axes[5]],
        mag: [axes[6], axes[7], axes[8]],
    })
}

/// Encode a payload in wire order (without header)
pub fn encode_payload(raw: &RawFrame) -> Vec<u8> {
    let mut buf = Vec::with_capacity(PAYLOAD_SIZE);
    buf.put_i32_le(raw.boom_encoder);
    buf.put_f32_le(raw.height_mm);
    for &v in raw.accel.iter().chain(raw.gyro.iter()).chain(raw.mag.iter()) {
        buf.put_f32_le(v);
    }
    buf
}

/// Encode a complete frame, header included
pub fn encode_frame(raw: &RawFrame) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_SIZE);
    frame.extend_from_slice(&HEADER);
    frame.extend_from_slice(&encode_payload(raw));
    frame
}
