//! Byte-level serial transport for packet-radio modules.
//!
//! This crate is the hardware-abstraction layer between a radio protocol
//! stack and the UART it talks over. It defines one transport contract,
//! [`SerialPort`], and implements it for host environments with very
//! different native I/O models:
//!
//! * [`posix`], a user-space backend driving a TTY device file through
//!   termios (Unix only).
//! * [`ldisc`], a kernel-resident backend driving an externally attached
//!   tty line discipline.
//!
//! Code written against [`SerialPort`] never learns which backend is
//! active. The backend is chosen when the crate is built: the POSIX backend
//! is compiled in on Unix targets, and the line-discipline backend is
//! monomorphized over the glue type that attaches it.
//!
//! All operations are non-blocking with respect to buffered data: `read`
//! returns `Ok(0)` when nothing has arrived and `write` returns the number
//! of bytes the native layer accepted, possibly zero. Callers that need
//! timeouts poll the buffer-status operations against an injected
//! [`Clock`](clock::Clock); the one exception is `tx_flush`, which may
//! block until the transmit queue drains.
//!
//! ## Example
//!
//! Round-trip a frame through an in-process line discipline:
//!
//! ```
//! use std::collections::VecDeque;
//! use std::io;
//!
//! use radio_serial::ldisc::{LdiscPort, LineDiscipline};
//! use radio_serial::prelude::*;
//!
//! struct Echo(VecDeque<u8>);
//!
//! impl LineDiscipline for Echo {
//!     fn name(&self) -> &str {
//!         "ttyECHO0"
//!     }
//!
//!     fn driver_write(&mut self, buffer: &[u8]) -> io::Result<usize> {
//!         self.0.extend(buffer.iter().copied());
//!         Ok(buffer.len())
//!     }
//!
//!     fn read(&mut self, buffer: &mut [u8]) -> Option<io::Result<usize>> {
//!         let count = buffer.len().min(self.0.len());
//!         for slot in &mut buffer[..count] {
//!             *slot = self.0.pop_front().unwrap();
//!         }
//!         Some(Ok(count))
//!     }
//! }
//!
//! let mut port = LdiscPort::attached(Echo(VecDeque::new()), 9600);
//!
//! port.write(b"+++").unwrap();
//!
//! let mut reply = [0u8; 3];
//! assert_eq!(port.read(&mut reply).unwrap(), 3);
//! assert_eq!(&reply, b"+++");
//! ```

#[cfg(unix)]
use std::ffi::OsStr;

pub use crate::error::{Error, ErrorKind, Result};

/// A module that exports traits that are useful to have in scope.
///
/// It is intended to be glob imported:
///
/// ```no_run
/// use radio_serial::prelude::*;
/// ```
pub mod prelude {
    pub use crate::clock::Clock;
    pub use crate::SerialPort;
}

pub mod clock;
pub mod ldisc;

#[cfg(unix)]
pub mod posix;

mod error;

/// A convenience function for opening the native serial port of the build
/// platform.
///
/// The argument must be one that's understood by the target operating
/// system to identify a serial port. On Unix systems, it should be a path
/// to a TTY device file.
///
/// ## Examples
///
/// ```no_run
/// use radio_serial::prelude::*;
///
/// let mut port = radio_serial::open("/dev/ttyUSB0", 9600).unwrap();
/// port.write(b"+++").unwrap();
/// ```
#[cfg(unix)]
pub fn open<T: AsRef<OsStr> + ?Sized>(port: &T, baudrate: u32) -> Result<posix::TTYPort> {
    use std::path::Path;

    let mut port = posix::TTYPort::new(Path::new(port));
    SerialPort::open(&mut port, baudrate)?;
    Ok(port)
}

/// A trait for byte-level serial transports.
///
/// One handle represents one serial connection to a radio module. A handle
/// is either *open* (all native resources bound and usable) or *invalid*,
/// in which case every operation other than `open` fails immediately with
/// [`ErrorKind::InvalidHandle`] and touches nothing native. Validity is
/// re-derived from the handle's fields on every call; it is never cached.
///
/// A backend is allowed to implement only part of the contract: an
/// operation whose native primitive is not wired on the current backend
/// fails with [`ErrorKind::Unimplemented`], deterministically, so callers
/// can probe for missing capabilities.
///
/// ## Error detail policy
///
/// Transmit-side native failures are collapsed to a bare
/// [`ErrorKind::Io`] with the native error code discarded; receive-side and
/// control-request failures keep the code, retrievable through
/// [`Error::raw_os_error`]. Callers that discriminate device faults must do
/// so on the receive path.
pub trait SerialPort {
    /// Returns true if the handle currently has native resources bound.
    fn is_open(&self) -> bool;

    /// Returns a printable name for the underlying device, or a placeholder
    /// if the handle is invalid.
    fn port_name(&self) -> &str;

    /// Returns the baud rate the handle was last configured with.
    fn baudrate(&self) -> u32;

    /// Binds native resources to the handle and configures the line for
    /// `baudrate`.
    ///
    /// ## Errors
    ///
    /// * `Unimplemented` on backends whose connection lifecycle is managed
    ///   by surrounding machinery.
    /// * `InvalidArgument` if the baud rate is not supported.
    /// * `Io` if the native open or configuration calls fail; the native
    ///   detail is preserved.
    fn open(&mut self, baudrate: u32) -> Result<()>;

    /// Releases the handle's native resources. The handle is invalid after
    /// this call returns, even if a native release step failed.
    fn close(&mut self) -> Result<()>;

    /// Reconfigures the line speed of an open handle.
    fn set_baudrate(&mut self, baudrate: u32) -> Result<()>;

    /// Hands `buffer` to the native transmit path and returns the number of
    /// bytes it accepted, which may be less than `buffer.len()`, including
    /// zero when the outbound buffer is full. The caller re-issues the
    /// remainder; this layer never retries.
    ///
    /// ## Errors
    ///
    /// * `InvalidHandle` if the handle is invalid.
    /// * `Io` if the native transmit primitive failed; the native detail is
    ///   discarded (see the error detail policy).
    fn write(&mut self, buffer: &[u8]) -> Result<usize>;

    /// Copies up to `buffer.len()` already-received bytes into `buffer` and
    /// returns the count. `Ok(0)` means nothing is buffered right now; it
    /// is not an error and not end-of-stream.
    ///
    /// ## Errors
    ///
    /// * `InvalidHandle` if the handle is invalid.
    /// * `Unimplemented` if the backend has no receive primitive wired.
    /// * `Io` if the native receive primitive failed; the native detail is
    ///   preserved (see the error detail policy).
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Transmits a single byte.
    ///
    /// ## Errors
    ///
    /// * `NoSpace` if the outbound buffer accepted nothing.
    /// * Anything `write` reports, unchanged.
    fn put_char(&mut self, ch: u8) -> Result<()> {
        match self.write(&[ch])? {
            1 => Ok(()),
            _ => Err(Error::new(ErrorKind::NoSpace, "transmit buffer is full")),
        }
    }

    /// Receives a single byte.
    ///
    /// ## Errors
    ///
    /// * `NoData` if no byte is buffered (not a fault).
    /// * Anything `read` reports, unchanged.
    fn get_char(&mut self) -> Result<u8> {
        let mut ch = [0u8; 1];

        match self.read(&mut ch)? {
            1 => Ok(ch[0]),
            _ => Err(Error::new(ErrorKind::NoData, "receive buffer is empty")),
        }
    }

    /// Returns the free space in the outbound buffer. A backend that cannot
    /// bound the native queue returns `usize::MAX`, meaning capacity is not
    /// a concern and writes should simply be issued.
    fn tx_free(&mut self) -> Result<usize>;

    /// Returns the number of bytes queued for transmission but not yet
    /// sent. A backend that cannot observe the native queue reports `0`;
    /// the value is then not authoritative.
    fn tx_used(&mut self) -> Result<usize>;

    /// Blocks until every queued outbound byte has been physically sent.
    /// This is the only operation of the contract allowed to wait.
    fn tx_flush(&mut self) -> Result<()>;

    /// Returns the free space in the inbound buffer, with the same
    /// unbounded-queue convention as [`tx_free`](SerialPort::tx_free).
    fn rx_free(&mut self) -> Result<usize>;

    /// Returns the number of received bytes buffered and not yet read.
    fn rx_used(&mut self) -> Result<usize>;

    /// Discards every received byte currently buffered.
    fn rx_flush(&mut self) -> Result<()>;

    /// Asserts or clears a break condition on the line.
    fn set_break(&mut self, enabled: bool) -> Result<()>;

    /// Enables or disables hardware (RTS/CTS) flow control.
    fn set_flow_control(&mut self, enabled: bool) -> Result<()>;

    /// Drives the RTS line.
    fn set_rts(&mut self, asserted: bool) -> Result<()>;

    /// Samples the CTS line.
    fn get_cts(&mut self) -> Result<bool>;
}
