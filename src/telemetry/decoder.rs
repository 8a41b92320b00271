//! # Telemetry Decoder
//!
//! Turns the Teensy byte stream into `TelemetrySample`s.
//!
//! Each decode is "flush-then-seek": depending on the `SyncPolicy`, stale
//! input is dropped first, then bytes are discarded until the `AA 55`
//! header, then exactly one payload is read. Flushing trades completeness
//! for freshness: anything that arrived before the call is lost.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::protocol::{parse_payload, TelemetrySample, HEADER, PAYLOAD_SIZE};
use crate::error::{BridgeError, Result};
use crate::serial::{ReadOutcome, SerialLink};

/// What to do with already-buffered input before each decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPolicy {
    /// Drop buffered input, then seek the next header (freshest sample)
    #[default]
    Flush,
    /// Keep buffered input and decode frames back to back (no loss)
    Continuous,
}

/// Error returned by a per-sample observer
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// Callback invoked after each decoded sample
pub type SampleObserver<'a> =
    &'a mut dyn FnMut(&TelemetrySample) -> std::result::Result<(), ObserverError>;

/// Header-synchronized decoder over a serial link
pub struct TelemetryDecoder<L> {
    link: L,
    policy: SyncPolicy,
    cancel: Option<CancellationToken>,
    last_capture: Option<DateTime<Utc>>,
}

impl<L: SerialLink> TelemetryDecoder<L> {
    /// Create a decoder that owns `link`
    pub fn new(link: L, policy: SyncPolicy) -> Self {
        Self {
            link,
            policy,
            cancel: None,
            last_capture: None,
        }
    }

    /// Observe `token` whenever a blocking read times out
    ///
    /// Without a token the header seek blocks until the marker arrives or
    /// the stream closes.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Current sync policy
    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    /// Give back the underlying link
    pub fn into_inner(self) -> L {
        self.link
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }

    /// Decode the next complete frame
    ///
    /// # Errors
    ///
    /// - `SyncNotFound`: the stream closed before a header was seen
    /// - `IncompleteFrame`: the payload was cut short
    /// - `Cancelled`: the cancellation token fired while waiting
    pub fn decode_next(&mut self) -> Result<TelemetrySample> {
        if self.policy == SyncPolicy::Flush {
            self.link.reset_input_buffer()?;
        }

        let discarded = self.seek_header()?;
        if discarded > 0 {
            debug!("Discarded {} bytes before telemetry header", discarded);
        }

        let payload = match self.link.read_exact_bytes(PAYLOAD_SIZE)? {
            ReadOutcome::Complete(bytes) => bytes,
            short => {
                return Err(BridgeError::IncompleteFrame {
                    expected: PAYLOAD_SIZE,
                    received: short.bytes().len(),
                })
            }
        };

        let raw = parse_payload(&payload)?;
        Ok(TelemetrySample::from_raw(raw, self.stamp()))
    }

    /// Consume bytes up to and including the header; returns the number of
    /// bytes skipped before it.
    fn seek_header(&mut self) -> Result<usize> {
        let mut matched = 0;
        let mut consumed = 0;

        loop {
            match self.link.read_exact_bytes(1)? {
                ReadOutcome::Complete(byte) => {
                    consumed += 1;
                    matched = if byte[0] == HEADER[matched] {
                        matched + 1
                    } else if byte[0] == HEADER[0] {
                        1
                    } else {
                        0
                    };

                    if matched == HEADER.len() {
                        return Ok(consumed - HEADER.len());
                    }
                }
                ReadOutcome::TimedOut(_) => {
                    if self.is_cancelled() {
                        return Err(BridgeError::Cancelled);
                    }
                }
                ReadOutcome::Closed(_) => {
                    return Err(BridgeError::SyncNotFound {
                        discarded: consumed,
                    })
                }
            }
        }
    }

    // Wall clock, clamped so capture times never go backwards
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_capture {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        self.last_capture = Some(stamp);
        stamp
    }

    /// Decode samples until the cancellation token fires or the stream ends
    ///
    /// Truncated frames are logged and skipped. Observer errors are logged
    /// and never stop collection. A closed or failing link ends collection
    /// and the samples decoded so far are returned.
    ///
    /// # Errors
    ///
    /// Returns `NoTelemetry` if collection ended without a single sample.
    pub fn collect_until_cancelled(
        &mut self,
        mut on_sample: Option<SampleObserver<'_>>,
    ) -> Result<Vec<TelemetrySample>> {
        let mut samples = Vec::new();

        loop {
            if self.is_cancelled() {
                info!("Telemetry collection cancelled");
                break;
            }

            match self.decode_next() {
                Ok(sample) => {
                    if let Some(observer) = on_sample.as_mut() {
                        if let Err(e) = (*observer)(&sample) {
                            warn!("Sample observer failed: {}", e);
                        }
                    }
                    samples.push(sample);
                }
                Err(BridgeError::Cancelled) => {
                    info!("Telemetry collection cancelled");
                    break;
                }
                Err(BridgeError::IncompleteFrame { expected, received }) => {
                    warn!(
                        "Dropped truncated frame ({} of {} payload bytes)",
                        received, expected
                    );
                }
                Err(BridgeError::SyncNotFound { discarded }) => {
                    warn!(
                        "Telemetry stream closed ({} trailing bytes discarded)",
                        discarded
                    );
                    break;
                }
                Err(e) => {
                    warn!("Telemetry stream failed: {}", e);
                    break;
                }
            }
        }

        info!("Collected {} telemetry samples", samples.len());

        if samples.is_empty() {
            return Err(BridgeError::NoTelemetry);
        }

        Ok(samples)
    }
}
