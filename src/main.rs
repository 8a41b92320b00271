//! # Teensy Bridge
//!
//! Command-line entry point.
//!
//! - `log`: record telemetry from the Teensy until Ctrl+C, then print a
//!   summary and optionally export the samples as JSONL
//! - `configure`: run the radio configuration handshake and print the
//!   snapshot the transceiver reports back
//! - `ports`: list the serial devices the bridge can see
//!
//! # Examples
//!
//! ```bash
//! cargo run --release -- log --output sensor-data.jsonl
//! ```
//!
//! Expected output:
//! ```text
//! INFO teensy_bridge: Teensy Bridge v0.1.0 starting...
//! INFO teensy_bridge::serial: Opened serial device at /dev/ttyACM0
//! height = 512 mm, boom pos =  118, imu acceleration = 0.1 -9.8 0.3
//! ...
//! INFO teensy_bridge: 1834 packets in 9.21 seconds. Avg sample time = 5.02 ms/sample
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use teensy_bridge::config::{Config, TelemetryConfig};
use teensy_bridge::error::BridgeError;
use teensy_bridge::radio::connect_and_configure;
use teensy_bridge::serial::discovery::{resolve_port, DeviceEnumerator, SystemPorts};
use teensy_bridge::serial::{PortLink, SystemOpener};
use teensy_bridge::telemetry::decoder::{ObserverError, SampleObserver};
use teensy_bridge::telemetry::writer::{summarize, write_jsonl_file};
use teensy_bridge::telemetry::{SyncPolicy, TelemetryDecoder, TelemetrySample};

#[derive(Parser, Debug)]
#[command(name = "teensy-bridge", version, about = "Teensy telemetry logger and radio configurator")]
struct Cli {
    /// Configuration file (TOML). Defaults apply when omitted.
    #[arg(long, short, value_name = "FILE", global = true, env = "TEENSY_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Minimum log level (overrides the configuration file).
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record telemetry until Ctrl+C
    Log {
        /// Teensy device path (skips discovery)
        #[arg(long)]
        port: Option<String>,

        /// Write samples to this JSONL file
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Do not print each sample
        #[arg(long)]
        no_display: bool,

        /// Decode frames back to back instead of flushing stale input
        #[arg(long)]
        continuous: bool,
    },

    /// Configure the radio transceiver
    Configure {
        /// Radio device path (skips discovery)
        #[arg(long)]
        port: Option<String>,
    },

    /// List connected serial devices
    Ports,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Install the tracing subscriber
///
/// `RUST_LOG` takes precedence over `level`. The returned guard must be
/// held for the file writer to keep flushing.
fn init_logging(level: &str, directory: Option<&str>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_layer, guard) = match directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "teensy-bridge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(level) = cli.log_level {
        config.logging.level = level.as_str().to_string();
    }

    let _guard = init_logging(&config.logging.level, config.logging.directory.as_deref());
    info!("Teensy Bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Log {
            port,
            output,
            no_display,
            continuous,
        } => {
            if let Some(port) = port {
                config.telemetry.port = port;
            }
            if let Some(output) = output {
                config.telemetry.output = Some(output.to_string_lossy().into_owned());
            }
            if no_display {
                config.telemetry.display = false;
            }
            if continuous {
                config.telemetry.sync_policy = SyncPolicy::Continuous;
            }
            config.validate()?;
            run_log(config.telemetry).await
        }
        Command::Configure { port } => {
            if let Some(port) = port {
                config.radio.port = port;
            }
            config.validate()?;

            let radio = config.radio;
            let snapshot = tokio::task::spawn_blocking(move || {
                connect_and_configure(&radio, &SystemPorts, &SystemOpener)
            })
            .await
            .context("radio configuration task failed")?
            .context("radio configuration failed")?;

            println!("{}", snapshot);
            Ok(())
        }
        Command::Ports => {
            for device in SystemPorts.enumerate()? {
                println!("{}\t{}", device.port_name, device.description);
            }
            Ok(())
        }
    }
}

/// Collect telemetry on a blocking task until Ctrl+C or the stream ends
async fn run_log(config: TelemetryConfig) -> Result<()> {
    let port = resolve_port(&config.port, &config.device_description, &SystemPorts)?;
    let link = PortLink::open(&port, config.baud_rate, Duration::from_millis(config.timeout_ms))?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, stopping collection...");
                signal_token.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    info!("Logging telemetry from {} ({:?} sync)", port, config.sync_policy);
    info!("Press Ctrl+C to stop");

    let display = config.display;
    let mut decoder = TelemetryDecoder::new(link, config.sync_policy).with_cancellation(cancel);

    let collected = tokio::task::spawn_blocking(move || {
        let mut show = |sample: &TelemetrySample| -> std::result::Result<(), ObserverError> {
            writeln!(std::io::stdout().lock(), "{}", sample)?;
            Ok(())
        };
        let observer: Option<SampleObserver<'_>> = if display { Some(&mut show) } else { None };
        decoder.collect_until_cancelled(observer)
    })
    .await
    .context("telemetry task failed")?;

    let samples = match collected {
        Ok(samples) => samples,
        Err(BridgeError::NoTelemetry) => anyhow::bail!("Got no data!"),
        Err(e) => return Err(e.into()),
    };

    if let Some(summary) = summarize(&samples) {
        info!("{}", summary);
    }

    if let Some(output) = &config.output {
        write_jsonl_file(output, &samples)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_log_subcommand() {
        let cli = Cli::try_parse_from([
            "teensy-bridge",
            "log",
            "--port",
            "/dev/ttyACM1",
            "--output",
            "out.jsonl",
            "--continuous",
        ])
        .unwrap();

        match cli.command {
            Command::Log {
                port,
                output,
                no_display,
                continuous,
            } => {
                assert_eq!(port.as_deref(), Some("/dev/ttyACM1"));
                assert_eq!(output, Some(PathBuf::from("out.jsonl")));
                assert!(!no_display);
                assert!(continuous);
            }
            other => panic!("Expected Log command, got: {:?}", other),
        }
    }

    #[test]
    fn test_parse_configure_with_global_options() {
        let cli = Cli::try_parse_from([
            "teensy-bridge",
            "configure",
            "--config",
            "bridge.toml",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert!(matches!(cli.command, Command::Configure { port: None }));
        assert_eq!(cli.config, Some(PathBuf::from("bridge.toml")));
        assert_eq!(cli.log_level.map(LogLevel::as_str), Some("debug"));
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let err = Cli::try_parse_from(["teensy-bridge", "ports", "--log-level", "loud"])
            .expect_err("unknown level should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }
}
