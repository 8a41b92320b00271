//! Trait abstraction for serial port operations to enable testing

use std::io;
use std::time::{Duration, Instant};

/// How a bounded read ended
///
/// Every variant carries the bytes that were actually received, so callers
/// can tell a truncated read apart from a complete one without losing data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The requested length (or delimiter) was reached
    Complete(Vec<u8>),
    /// The transport timeout elapsed first
    TimedOut(Vec<u8>),
    /// The stream ended first
    Closed(Vec<u8>),
}

impl ReadOutcome {
    /// Bytes received, regardless of how the read ended
    pub fn bytes(&self) -> &[u8] {
        match self {
            ReadOutcome::Complete(b) | ReadOutcome::TimedOut(b) | ReadOutcome::Closed(b) => b,
        }
    }

    /// Returns true if the read reached its length or delimiter
    pub fn is_complete(&self) -> bool {
        matches!(self, ReadOutcome::Complete(_))
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

/// Blocking byte-stream connection to a serial device
///
/// Implementors provide the raw primitives; `read_exact_bytes` and
/// `read_until` are built on top of `read_chunk`.
pub trait SerialLink {
    /// Read whatever is available into `buf`.
    ///
    /// `Ok(0)` means the stream is closed. A timeout is reported as an
    /// `io::ErrorKind::TimedOut` (or `WouldBlock`) error.
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all data to the port
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer
    fn flush(&mut self) -> io::Result<()>;

    /// Discard bytes received but not yet read
    fn reset_input_buffer(&mut self) -> io::Result<()>;

    /// Set the timeout applied to each blocking read
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Read exactly `len` bytes, or report how far the read got
    fn read_exact_bytes(&mut self, len: usize) -> io::Result<ReadOutcome> {
        read_exact_inner(self, len, None)
    }

    /// Like `read_exact_bytes`, but gives up with `TimedOut` once
    /// `deadline` has passed, even while bytes keep arriving.
    fn read_exact_before(&mut self, len: usize, deadline: Instant) -> io::Result<ReadOutcome> {
        read_exact_inner(self, len, Some(deadline))
    }

    /// Read until `delimiter` has been received, including it.
    ///
    /// Bytes are pulled one at a time so nothing past the delimiter is
    /// consumed.
    fn read_until(&mut self, delimiter: &[u8]) -> io::Result<ReadOutcome> {
        read_until_inner(self, delimiter, None)
    }

    /// Like `read_until`, but gives up with `TimedOut` once `deadline` has
    /// passed, even while non-delimiter bytes keep arriving.
    ///
    /// The total wait is bounded by the deadline plus one read timeout.
    fn read_until_before(
        &mut self,
        delimiter: &[u8],
        deadline: Instant,
    ) -> io::Result<ReadOutcome> {
        read_until_inner(self, delimiter, Some(deadline))
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

fn read_exact_inner<L: SerialLink + ?Sized>(
    link: &mut L,
    len: usize,
    deadline: Option<Instant>,
) -> io::Result<ReadOutcome> {
    let mut buf = vec![0u8; len];
    let mut filled = 0;

    while filled < len {
        if expired(deadline) {
            buf.truncate(filled);
            return Ok(ReadOutcome::TimedOut(buf));
        }

        match link.read_chunk(&mut buf[filled..]) {
            Ok(0) => {
                buf.truncate(filled);
                return Ok(ReadOutcome::Closed(buf));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_timeout(&e) => {
                buf.truncate(filled);
                return Ok(ReadOutcome::TimedOut(buf));
            }
            Err(e) => return Err(e),
        }
    }

    Ok(ReadOutcome::Complete(buf))
}

fn read_until_inner<L: SerialLink + ?Sized>(
    link: &mut L,
    delimiter: &[u8],
    deadline: Option<Instant>,
) -> io::Result<ReadOutcome> {
    let mut out = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        if out.ends_with(delimiter) {
            return Ok(ReadOutcome::Complete(out));
        }
        if expired(deadline) {
            return Ok(ReadOutcome::TimedOut(out));
        }

        match link.read_chunk(&mut byte) {
            Ok(0) => return Ok(ReadOutcome::Closed(out)),
            Ok(_) => out.push(byte[0]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_timeout(&e) => return Ok(ReadOutcome::TimedOut(out)),
            Err(e) => return Err(e),
        }
    }
}

impl<L: SerialLink + ?Sized> SerialLink for Box<L> {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_chunk(buf)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        (**self).write_all(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }

    fn reset_input_buffer(&mut self) -> io::Result<()> {
        (**self).reset_input_buffer()
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        (**self).set_timeout(timeout)
    }
}
