//! # Serial Communication Module
//!
//! Handles serial communication with the Teensy and the radio transceiver.
//!
//! This module handles:
//! - Opening serial ports (8N1, no flow control) with a read timeout
//! - Blocking read/write operations through the `SerialLink` trait
//! - Device discovery by USB description string

pub mod discovery;
pub mod port_trait;

use std::io;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{BridgeError, Result};
pub use port_trait::{ReadOutcome, SerialLink};

/// Teensy telemetry link rate
pub const TEENSY_BAUD_RATE: u32 = 250_000;

/// Default Teensy device path (USB CDC)
pub const DEFAULT_TEENSY_PATH: &str = "/dev/ttyACM0";

/// Serial port opened in blocking mode
pub struct PortLink {
    /// Serial port handle
    port: Box<dyn tokio_serial::SerialPort>,
    /// Device path (e.g., /dev/ttyACM0)
    device_path: String,
}

impl std::fmt::Debug for PortLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortLink")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl PortLink {
    /// Open a serial port
    ///
    /// # Arguments
    ///
    /// * `path` - Device path (e.g., "/dev/ttyACM0")
    /// * `baud_rate` - Line rate
    /// * `timeout` - Timeout applied to each blocking read
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Serial` if the port cannot be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::time::Duration;
    /// use teensy_bridge::serial::PortLink;
    ///
    /// let link = PortLink::open("/dev/ttyACM0", 250_000, Duration::from_millis(100))?;
    /// println!("Connected to: {}", link.device_path());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
        debug!("Opening serial port {} at {} baud", path, baud_rate);

        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(|e| BridgeError::Serial(format!("Failed to open {}: {}", path, e)))?;

        info!("Opened serial device at {}", path);
        Ok(Self {
            port,
            device_path: path.to_string(),
        })
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

impl SerialLink for PortLink {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut self.port, buf)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        io::Write::write_all(&mut self.port, data)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(&mut self.port)
    }

    fn reset_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(tokio_serial::ClearBuffer::Input)
            .map_err(io::Error::from)
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port.set_timeout(timeout).map_err(io::Error::from)
    }
}

/// Factory for serial connections
///
/// Separates "which port" from "how to open it" so the handshake path can
/// be tested without hardware.
#[cfg_attr(test, mockall::automock)]
pub trait PortOpener {
    /// Open `port_name` at `baud_rate` with the given read timeout
    fn open(
        &self,
        port_name: &str,
        baud_rate: u32,
        timeout: Duration,
    ) -> Result<Box<dyn SerialLink + Send>>;
}

/// Opens real serial ports through `tokio_serial`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemOpener;

impl PortOpener for SystemOpener {
    fn open(
        &self,
        port_name: &str,
        baud_rate: u32,
        timeout: Duration,
    ) -> Result<Box<dyn SerialLink + Send>> {
        Ok(Box::new(PortLink::open(port_name, baud_rate, timeout)?))
    }
}
