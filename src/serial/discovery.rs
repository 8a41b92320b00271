//! # Device Discovery
//!
//! Finds the serial port of a device by its USB description string.
//! Exactly one match is required: the bridge never guesses between
//! candidates.

use tracing::{debug, info};

use crate::error::{BridgeError, Result};

/// An enumerated serial device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Port identifier (e.g., /dev/ttyUSB0)
    pub port_name: String,
    /// Human-readable description (USB product string)
    pub description: String,
}

/// Source of connected serial devices
#[cfg_attr(test, mockall::automock)]
pub trait DeviceEnumerator {
    /// List the currently connected devices
    fn enumerate(&self) -> Result<Vec<DeviceInfo>>;
}

/// Enumerates the system's serial ports through `tokio_serial`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPorts;

impl DeviceEnumerator for SystemPorts {
    fn enumerate(&self) -> Result<Vec<DeviceInfo>> {
        let ports = tokio_serial::available_ports()
            .map_err(|e| BridgeError::Serial(format!("Failed to enumerate serial ports: {}", e)))?;

        Ok(ports
            .into_iter()
            .map(|p| {
                let description = match p.port_type {
                    tokio_serial::SerialPortType::UsbPort(info) => info.product.unwrap_or_default(),
                    tokio_serial::SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                    tokio_serial::SerialPortType::PciPort => "PCI".to_string(),
                    tokio_serial::SerialPortType::Unknown => String::new(),
                };
                DeviceInfo {
                    port_name: p.port_name,
                    description,
                }
            })
            .collect())
    }
}

/// Find the single device whose description equals `description`
///
/// # Errors
///
/// - `DeviceNotFound` if nothing matches
/// - `MultipleDevicesFound` if more than one device matches
pub fn find_unique_device<E>(enumerator: &E, description: &str) -> Result<DeviceInfo>
where
    E: DeviceEnumerator + ?Sized,
{
    let devices = enumerator.enumerate()?;
    debug!("Enumerated {} serial devices", devices.len());

    let mut matches: Vec<DeviceInfo> = devices
        .into_iter()
        .filter(|d| d.description == description)
        .collect();

    match matches.len() {
        0 => Err(BridgeError::DeviceNotFound(description.to_string())),
        1 => {
            let device = matches.remove(0);
            info!("Found \"{}\" at {}", description, device.port_name);
            Ok(device)
        }
        _ => Err(BridgeError::MultipleDevicesFound {
            description: description.to_string(),
            ports: matches.into_iter().map(|d| d.port_name).collect(),
        }),
    }
}

/// Pick the port to open: an explicitly configured port wins, otherwise
/// the device is discovered by description.
pub fn resolve_port<E>(configured_port: &str, description: &str, enumerator: &E) -> Result<String>
where
    E: DeviceEnumerator + ?Sized,
{
    if !configured_port.is_empty() {
        debug!("Using configured port {}", configured_port);
        return Ok(configured_port.to_string());
    }

    Ok(find_unique_device(enumerator, description)?.port_name)
}
