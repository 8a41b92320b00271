//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{BridgeError, Result};
use crate::serial::{DEFAULT_TEENSY_PATH, TEENSY_BAUD_RATE};
use crate::telemetry::SyncPolicy;

/// Standard UART line rates accepted for either link
const SUPPORTED_BAUD_RATES: &[u32] = &[
    1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200, 230400, 250000, 460800, 500000, 921600,
    1000000, 2000000,
];

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub radio: RadioConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Teensy telemetry link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    /// Device path; empty means discover by `device_description`
    #[serde(default = "default_telemetry_port")]
    pub port: String,

    #[serde(default = "default_telemetry_description")]
    pub device_description: String,

    #[serde(default = "default_telemetry_baud_rate")]
    pub baud_rate: u32,

    /// Read timeout; also how often cancellation is checked
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub sync_policy: SyncPolicy,

    #[serde(default = "default_display")]
    pub display: bool,

    /// JSONL output file, if any
    #[serde(default)]
    pub output: Option<String>,
}

/// Radio transceiver configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RadioConfig {
    /// Device path; empty means discover by `device_description`
    #[serde(default)]
    pub port: String,

    #[serde(default = "default_radio_description")]
    pub device_description: String,

    #[serde(default = "default_radio_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily-rolling log files; stderr only when unset
    #[serde(default)]
    pub directory: Option<String>,
}

// Default value functions
fn default_telemetry_port() -> String { DEFAULT_TEENSY_PATH.to_string() }
fn default_telemetry_description() -> String { "USB Serial".to_string() }
fn default_telemetry_baud_rate() -> u32 { TEENSY_BAUD_RATE }
fn default_timeout_ms() -> u64 { 100 }
fn default_display() -> bool { true }

fn default_radio_description() -> String { "CP2102 USB to UART Bridge Controller".to_string() }
fn default_radio_baud_rate() -> u32 { 9600 }
fn default_ack_timeout_ms() -> u64 { 1000 }

fn default_log_level() -> String { "info".to_string() }

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            port: default_telemetry_port(),
            device_description: default_telemetry_description(),
            baud_rate: default_telemetry_baud_rate(),
            timeout_ms: default_timeout_ms(),
            sync_policy: SyncPolicy::default(),
            display: default_display(),
            output: None,
        }
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            device_description: default_radio_description(),
            baud_rate: default_radio_baud_rate(),
            ack_timeout_ms: default_ack_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

fn invalid(msg: impl std::fmt::Display) -> BridgeError {
    BridgeError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use teensy_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // A port or a description is needed to find each device
        if self.telemetry.port.is_empty() && self.telemetry.device_description.is_empty() {
            return Err(invalid("telemetry needs a port or a device_description"));
        }

        if self.radio.port.is_empty() && self.radio.device_description.is_empty() {
            return Err(invalid("radio needs a port or a device_description"));
        }

        // Validate timing fields
        if self.telemetry.timeout_ms == 0 || self.telemetry.timeout_ms > 10000 {
            return Err(invalid("timeout_ms must be between 1 and 10000"));
        }

        if self.radio.ack_timeout_ms == 0 || self.radio.ack_timeout_ms > 60000 {
            return Err(invalid("ack_timeout_ms must be between 1 and 60000"));
        }

        // Validate baud rates
        for (name, baud) in [
            ("telemetry baud_rate", self.telemetry.baud_rate),
            ("radio baud_rate", self.radio.baud_rate),
        ] {
            if !SUPPORTED_BAUD_RATES.contains(&baud) {
                return Err(invalid(format!(
                    "{} {} is not a supported baud rate",
                    name, baud
                )));
            }
        }

        if let Some(output) = &self.telemetry.output {
            if output.is_empty() {
                return Err(invalid("telemetry output cannot be empty when set"));
            }
        }

        // Validate log level
        if !["error", "warn", "info", "debug", "trace"].contains(&self.logging.level.as_str()) {
            return Err(invalid(
                "log level must be one of: error, warn, info, debug, trace",
            ));
        }

        Ok(())
    }
}
