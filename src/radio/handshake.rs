//! # Radio Handshake Client
//!
//! Runs the configuration sequence against the transceiver, one command at
//! a time. Each command is written, then the client blocks until the
//! expected acknowledgment byte arrives or the step's timeout expires.
//! The timeout covers the whole step, so a line that keeps sending noise
//! still fails with `HandshakeTimeout`.
//! Any failure aborts the whole sequence; nothing is retried or rolled back.
//!
//! ```text
//! Connected -> BaudSet -> ChannelSet -> IdSet -> PowerSet -> Verified
//!      \__________\___________\__________\__________\-----> Failed { step }
//! ```

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::protocol::{
    ConfigurationSnapshot, HandshakeCommand, HandshakeStep, OPCODE_VERIFY, SNAPSHOT_LEN,
    VERIFY_RESPONSE_HEADER,
};
use crate::config::RadioConfig;
use crate::error::{BridgeError, Result};
use crate::serial::discovery::{resolve_port, DeviceEnumerator};
use crate::serial::{PortOpener, ReadOutcome, SerialLink};

/// Progress through the handshake
///
/// There is no disconnected state: a client only exists once its link is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Connected,
    BaudSet,
    ChannelSet,
    IdSet,
    PowerSet,
    Verified,
    Failed { step: HandshakeStep },
}

impl HandshakeState {
    /// State reached once `step` has been acknowledged
    pub fn after(step: HandshakeStep) -> Self {
        match step {
            HandshakeStep::SetBaudRate => HandshakeState::BaudSet,
            HandshakeStep::SetChannel => HandshakeState::ChannelSet,
            HandshakeStep::SetDeviceId => HandshakeState::IdSet,
            HandshakeStep::SetTxPower => HandshakeState::PowerSet,
            HandshakeStep::Verify => HandshakeState::Verified,
        }
    }
}

/// Drives the configuration handshake over an exclusively owned link
pub struct HandshakeClient<L> {
    link: L,
    sequence: Vec<HandshakeCommand>,
    verify_timeout: Duration,
    state: HandshakeState,
}

impl<L: SerialLink> HandshakeClient<L> {
    /// Client for the standard configuration sequence
    pub fn new(link: L, ack_timeout: Duration) -> Self {
        Self::with_sequence(
            link,
            HandshakeCommand::configuration_sequence(ack_timeout),
            ack_timeout,
        )
    }

    /// Client for an explicit command table
    pub fn with_sequence(
        link: L,
        sequence: Vec<HandshakeCommand>,
        verify_timeout: Duration,
    ) -> Self {
        Self {
            link,
            sequence,
            verify_timeout,
            state: HandshakeState::Connected,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn into_inner(self) -> L {
        self.link
    }

    /// Send every command in order, then read back the configuration
    ///
    /// # Errors
    ///
    /// - `HandshakeTimeout { step }` if an acknowledgment never arrives
    /// - `TransportClosed { step }` if the link closes mid-step
    /// - `Io` for any other transport failure
    pub fn configure(&mut self) -> Result<ConfigurationSnapshot> {
        self.state = HandshakeState::Connected;
        info!("Configuring radio ({} commands)", self.sequence.len());

        for i in 0..self.sequence.len() {
            let command = self.sequence[i];
            if let Err(e) = self.run_step(&command) {
                return Err(self.fail(command.step, e));
            }
            self.state = HandshakeState::after(command.step);
            debug!("{} acknowledged", command.step);
        }

        match self.verify() {
            Ok(snapshot) => {
                self.state = HandshakeState::Verified;
                info!("Radio configuration verified: {}", snapshot);
                Ok(snapshot)
            }
            Err(e) => Err(self.fail(HandshakeStep::Verify, e)),
        }
    }

    fn run_step(&mut self, command: &HandshakeCommand) -> Result<()> {
        let deadline = self.send(command.opcode, command.timeout)?;
        self.await_byte(command.step, command.expected_ack, deadline)
    }

    fn verify(&mut self) -> Result<ConfigurationSnapshot> {
        let step = HandshakeStep::Verify;
        let deadline = self.send(OPCODE_VERIFY, self.verify_timeout)?;
        self.await_byte(step, VERIFY_RESPONSE_HEADER, deadline)?;

        match self.link.read_exact_before(SNAPSHOT_LEN, deadline)? {
            ReadOutcome::Complete(bytes) => {
                let mut snapshot = [0u8; SNAPSHOT_LEN];
                snapshot.copy_from_slice(&bytes);
                Ok(ConfigurationSnapshot::new(snapshot))
            }
            ReadOutcome::TimedOut(_) => Err(BridgeError::HandshakeTimeout { step }),
            ReadOutcome::Closed(_) => Err(BridgeError::TransportClosed { step }),
        }
    }

    // Returns the deadline for the reply
    fn send(&mut self, opcode: &[u8], timeout: Duration) -> Result<Instant> {
        self.link.set_timeout(timeout)?;
        self.link.write_all(opcode)?;
        self.link.flush()?;
        debug!("Sent {:02X?}", opcode);
        Ok(Instant::now() + timeout)
    }

    // Anything before `byte` is line noise
    fn await_byte(&mut self, step: HandshakeStep, byte: u8, deadline: Instant) -> Result<()> {
        match self.link.read_until_before(&[byte], deadline)? {
            ReadOutcome::Complete(bytes) => {
                if bytes.len() > 1 {
                    debug!("Discarded {} bytes before 0x{:02X}", bytes.len() - 1, byte);
                }
                Ok(())
            }
            ReadOutcome::TimedOut(_) => Err(BridgeError::HandshakeTimeout { step }),
            ReadOutcome::Closed(_) => Err(BridgeError::TransportClosed { step }),
        }
    }

    fn fail(&mut self, step: HandshakeStep, err: BridgeError) -> BridgeError {
        warn!("Radio handshake failed at {}: {}", step, err);
        self.state = HandshakeState::Failed { step };
        err
    }
}

/// Locate the transceiver, open it, and run the handshake
///
/// Discovery happens first; if it fails no port is opened and nothing is
/// written anywhere.
pub fn connect_and_configure<E, O>(
    config: &RadioConfig,
    enumerator: &E,
    opener: &O,
) -> Result<ConfigurationSnapshot>
where
    E: DeviceEnumerator + ?Sized,
    O: PortOpener + ?Sized,
{
    let port = resolve_port(&config.port, &config.device_description, enumerator)?;
    let timeout = Duration::from_millis(config.ack_timeout_ms);

    let link = opener.open(&port, config.baud_rate, timeout)?;
    info!("Connected to radio at {}", port);

    HandshakeClient::new(link, timeout).configure()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::protocol::{
        ACK_BYTE, OPCODE_SET_BAUD, OPCODE_SET_CHANNEL, OPCODE_SET_ID, OPCODE_SET_POWER,
    };
    use crate::serial::discovery::{DeviceInfo, MockDeviceEnumerator};
    use crate::serial::port_trait::mocks::{LinkEnd, ScriptedLink};
    use crate::serial::MockPortOpener;

    const TIMEOUT: Duration = Duration::from_millis(200);
    const SNAPSHOT: [u8; 6] = [0x02, 0x01, 0x01, 0x01, 0x0A, 0x00];

    fn verify_response() -> Vec<u8> {
        let mut response = vec![VERIFY_RESPONSE_HEADER];
        response.extend_from_slice(&SNAPSHOT);
        response
    }

    fn cooperative_peer() -> ScriptedLink {
        ScriptedLink::new(LinkEnd::TimedOut)
            .with_response(&[ACK_BYTE])
            .with_response(&[ACK_BYTE])
            .with_response(&[ACK_BYTE])
            .with_response(&[ACK_BYTE])
            .with_response(&verify_response())
    }

    fn radio_config(port: &str) -> RadioConfig {
        RadioConfig {
            port: port.to_string(),
            device_description: "USB Radio".to_string(),
            baud_rate: 9600,
            ack_timeout_ms: 200,
        }
    }

    fn device(port: &str, description: &str) -> DeviceInfo {
        DeviceInfo {
            port_name: port.to_string(),
            description: description.to_string(),
        }
    }

    #[test]
    fn test_full_handshake() {
        let link = cooperative_peer();
        let probe = link.clone();
        let mut client = HandshakeClient::new(link, TIMEOUT);

        let snapshot = client.configure().unwrap();

        assert_eq!(snapshot.as_bytes(), &SNAPSHOT);
        assert_eq!(client.state(), HandshakeState::Verified);
        assert_eq!(
            probe.get_written_data(),
            vec![
                OPCODE_SET_BAUD.to_vec(),
                OPCODE_SET_CHANNEL.to_vec(),
                OPCODE_SET_ID.to_vec(),
                OPCODE_SET_POWER.to_vec(),
                OPCODE_VERIFY.to_vec(),
            ]
        );
    }

    #[test]
    fn test_missing_power_ack_times_out() {
        let link = ScriptedLink::new(LinkEnd::TimedOut)
            .with_response(&[ACK_BYTE])
            .with_response(&[ACK_BYTE])
            .with_response(&[ACK_BYTE]);
        let probe = link.clone();
        let mut client = HandshakeClient::new(link, TIMEOUT);

        match client.configure() {
            Err(BridgeError::HandshakeTimeout { step }) => {
                assert_eq!(step, HandshakeStep::SetTxPower)
            }
            other => panic!("Expected HandshakeTimeout, got: {:?}", other),
        }

        assert_eq!(
            client.state(),
            HandshakeState::Failed {
                step: HandshakeStep::SetTxPower
            }
        );

        // No verify request after the failed step
        let written = probe.get_written_data();
        assert_eq!(written.len(), 4);
        assert!(!written.contains(&OPCODE_VERIFY.to_vec()));
    }

    #[test]
    fn test_noise_before_ack_is_discarded() {
        let link = ScriptedLink::new(LinkEnd::TimedOut)
            .with_response(&[0x00, 0x13, 0x37, ACK_BYTE])
            .with_response(&[ACK_BYTE])
            .with_response(&[0xFF, ACK_BYTE])
            .with_response(&[ACK_BYTE])
            .with_response(&[0x01, 0xA6, 9, 8, 7, 6, 5, 4]);
        let mut client = HandshakeClient::new(link, TIMEOUT);

        let snapshot = client.configure().unwrap();
        assert_eq!(snapshot.as_bytes(), &[9, 8, 7, 6, 5, 4]);
    }

    #[test]
    fn test_link_closed_mid_sequence() {
        let link = ScriptedLink::new(LinkEnd::Closed).with_response(&[ACK_BYTE]);
        let mut client = HandshakeClient::new(link, TIMEOUT);

        assert!(matches!(
            client.configure(),
            Err(BridgeError::TransportClosed {
                step: HandshakeStep::SetChannel
            })
        ));
        assert_eq!(
            client.state(),
            HandshakeState::Failed {
                step: HandshakeStep::SetChannel
            }
        );
    }

    #[test]
    fn test_truncated_snapshot_times_out() {
        let link = ScriptedLink::new(LinkEnd::TimedOut)
            .with_response(&[ACK_BYTE])
            .with_response(&[ACK_BYTE])
            .with_response(&[ACK_BYTE])
            .with_response(&[ACK_BYTE])
            .with_response(&[VERIFY_RESPONSE_HEADER, 0x02, 0x01]);
        let mut client = HandshakeClient::new(link, TIMEOUT);

        assert!(matches!(
            client.configure(),
            Err(BridgeError::HandshakeTimeout {
                step: HandshakeStep::Verify
            })
        ));
    }

    #[test]
    fn test_endless_noise_times_out() {
        let link = ScriptedLink::new(LinkEnd::Noise(0x00));
        let probe = link.clone();
        let mut client = HandshakeClient::new(link, Duration::from_millis(30));

        let start = Instant::now();
        let result = client.configure();

        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(matches!(
            result,
            Err(BridgeError::HandshakeTimeout {
                step: HandshakeStep::SetBaudRate
            })
        ));
        assert_eq!(
            client.state(),
            HandshakeState::Failed {
                step: HandshakeStep::SetBaudRate
            }
        );
        assert_eq!(probe.get_written_data().len(), 1);
    }

    #[test]
    fn test_noisy_snapshot_times_out() {
        let link = ScriptedLink::new(LinkEnd::Noise(0x00))
            .with_response(&[ACK_BYTE])
            .with_response(&[ACK_BYTE])
            .with_response(&[ACK_BYTE])
            .with_response(&[ACK_BYTE]);
        let mut client = HandshakeClient::new(link, Duration::from_millis(30));

        // Noise never contains the verify header
        assert!(matches!(
            client.configure(),
            Err(BridgeError::HandshakeTimeout {
                step: HandshakeStep::Verify
            })
        ));
    }

    #[test]
    fn test_link_closed_during_verify() {
        let link = ScriptedLink::new(LinkEnd::Closed)
            .with_response(&[ACK_BYTE])
            .with_response(&[ACK_BYTE])
            .with_response(&[ACK_BYTE])
            .with_response(&[ACK_BYTE])
            .with_response(&[VERIFY_RESPONSE_HEADER, 0x02]);
        let mut client = HandshakeClient::new(link, TIMEOUT);

        assert!(matches!(
            client.configure(),
            Err(BridgeError::TransportClosed {
                step: HandshakeStep::Verify
            })
        ));
        assert_eq!(
            client.state(),
            HandshakeState::Failed {
                step: HandshakeStep::Verify
            }
        );
    }

    #[test]
    fn test_step_timeouts_applied() {
        let link = cooperative_peer();
        let probe = link.clone();
        let mut client = HandshakeClient::new(link, TIMEOUT);
        client.configure().unwrap();

        let timeouts = probe.timeouts.lock().unwrap().clone();
        assert_eq!(timeouts, vec![TIMEOUT; 5]);
    }

    #[test]
    fn test_custom_sequence() {
        let command = HandshakeCommand {
            step: HandshakeStep::SetChannel,
            opcode: &[0x01, 0x02],
            expected_ack: 0x55,
            timeout: Duration::from_millis(50),
        };
        let link = ScriptedLink::new(LinkEnd::TimedOut)
            .with_response(&[0xAA, 0x55])
            .with_response(&verify_response());
        let probe = link.clone();
        let mut client = HandshakeClient::with_sequence(link, vec![command], TIMEOUT);

        client.configure().unwrap();
        assert_eq!(probe.get_written_data()[0], vec![0x01, 0x02]);
    }

    #[test]
    fn test_state_transitions() {
        assert_eq!(
            HandshakeState::after(HandshakeStep::SetBaudRate),
            HandshakeState::BaudSet
        );
        assert_eq!(
            HandshakeState::after(HandshakeStep::SetChannel),
            HandshakeState::ChannelSet
        );
        assert_eq!(
            HandshakeState::after(HandshakeStep::SetDeviceId),
            HandshakeState::IdSet
        );
        assert_eq!(
            HandshakeState::after(HandshakeStep::SetTxPower),
            HandshakeState::PowerSet
        );
        assert_eq!(
            HandshakeState::after(HandshakeStep::Verify),
            HandshakeState::Verified
        );
    }

    #[test]
    fn test_connect_without_device_writes_nothing() {
        let mut enumerator = MockDeviceEnumerator::new();
        enumerator
            .expect_enumerate()
            .returning(|| Ok(vec![device("/dev/ttyACM0", "Teensy")]));
        let mut opener = MockPortOpener::new();
        opener.expect_open().times(0);

        let result = connect_and_configure(&radio_config(""), &enumerator, &opener);
        assert!(matches!(result, Err(BridgeError::DeviceNotFound(_))));
    }

    #[test]
    fn test_connect_with_ambiguous_devices_writes_nothing() {
        let mut enumerator = MockDeviceEnumerator::new();
        enumerator.expect_enumerate().returning(|| {
            Ok(vec![
                device("/dev/ttyUSB0", "USB Radio"),
                device("/dev/ttyUSB1", "USB Radio"),
            ])
        });
        let mut opener = MockPortOpener::new();
        opener.expect_open().times(0);

        let result = connect_and_configure(&radio_config(""), &enumerator, &opener);
        assert!(matches!(
            result,
            Err(BridgeError::MultipleDevicesFound { .. })
        ));
    }

    #[test]
    fn test_connect_and_configure_discovered_device() {
        let mut enumerator = MockDeviceEnumerator::new();
        enumerator.expect_enumerate().returning(|| {
            Ok(vec![
                device("/dev/ttyACM0", "Teensy"),
                device("/dev/ttyUSB0", "USB Radio"),
            ])
        });

        let link = cooperative_peer();
        let probe = link.clone();
        let mut opener = MockPortOpener::new();
        opener
            .expect_open()
            .withf(|port, baud, timeout| {
                port.to_string() == "/dev/ttyUSB0" && *baud == 9600 && *timeout == TIMEOUT
            })
            .times(1)
            .returning(move |_, _, _| Ok(Box::new(link.clone()) as Box<dyn SerialLink + Send>));

        let snapshot = connect_and_configure(&radio_config(""), &enumerator, &opener).unwrap();
        assert_eq!(snapshot.as_bytes(), &SNAPSHOT);
        assert_eq!(probe.get_written_data().len(), 5);
    }

    #[test]
    fn test_connect_with_configured_port() {
        let mut enumerator = MockDeviceEnumerator::new();
        enumerator.expect_enumerate().times(0);

        let link = cooperative_peer();
        let mut opener = MockPortOpener::new();
        opener
            .expect_open()
            .withf(|port, _, _| port.to_string() == "/dev/ttyUSB7")
            .times(1)
            .returning(move |_, _, _| Ok(Box::new(link.clone()) as Box<dyn SerialLink + Send>));

        assert!(connect_and_configure(&radio_config("/dev/ttyUSB7"), &enumerator, &opener).is_ok());
    }
}
