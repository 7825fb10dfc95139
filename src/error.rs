use std::error;
use std::fmt;
use std::io;

/// A type for results generated by serial transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of errors that can occur while driving a serial port.
///
/// The contract distinguishes faults from ordinary non-blocking outcomes:
/// [`NoData`](ErrorKind::NoData) and [`NoSpace`](ErrorKind::NoSpace) report an
/// empty inbound buffer or a full outbound buffer, not a broken device.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The handle has no native resources bound to it. No native call was
    /// attempted.
    InvalidHandle,

    /// A call parameter was malformed, e.g. an unsupported baud rate.
    InvalidArgument,

    /// The backend does not wire the native primitive this operation needs.
    /// Retrying on the same backend will fail the same way.
    Unimplemented,

    /// A native transmit, receive, or control primitive reported failure.
    Io(io::ErrorKind),

    /// A single-byte read found no bytes buffered.
    NoData,

    /// A single-byte write could not be accepted by the outbound buffer.
    NoSpace,
}

/// An error type for serial transport operations.
///
/// Whether an `Error` retains the native error code follows the crate's error
/// detail policy: failures from the read side and from control requests keep
/// the raw OS error ([`raw_os_error()`](Error::raw_os_error) returns
/// `Some(..)`), failures from the write side discard it.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    description: String,
    errno: Option<i32>,
}

impl Error {
    /// Creates a new serial transport error with no native error detail.
    pub fn new<T: Into<String>>(kind: ErrorKind, description: T) -> Self {
        Error {
            kind: kind,
            description: description.into(),
            errno: None,
        }
    }

    /// Creates an error from a raw OS error number, preserving it.
    pub fn from_raw_os_error(errno: i32) -> Self {
        let io_error = io::Error::from_raw_os_error(errno);

        let kind = match io_error.kind() {
            io::ErrorKind::InvalidInput => ErrorKind::InvalidArgument,
            io::ErrorKind::Unsupported => ErrorKind::Unimplemented,
            other => ErrorKind::Io(other),
        };

        Error {
            kind: kind,
            description: io_error.to_string(),
            errno: Some(errno),
        }
    }

    /// Returns the corresponding `ErrorKind` for this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the native error code this error was constructed from, if it
    /// was preserved.
    pub fn raw_os_error(&self) -> Option<i32> {
        self.errno
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(&self.description)
    }
}

impl error::Error for Error {}

impl From<io::Error> for Error {
    fn from(io_error: io::Error) -> Error {
        match io_error.raw_os_error() {
            Some(errno) => Error::from_raw_os_error(errno),
            None => Error::new(ErrorKind::Io(io_error.kind()), io_error.to_string()),
        }
    }
}

impl From<Error> for io::Error {
    fn from(error: Error) -> io::Error {
        if let Some(errno) = error.errno {
            return io::Error::from_raw_os_error(errno);
        }

        let kind = match error.kind {
            ErrorKind::InvalidHandle => io::ErrorKind::NotConnected,
            ErrorKind::InvalidArgument => io::ErrorKind::InvalidInput,
            ErrorKind::Unimplemented => io::ErrorKind::Unsupported,
            ErrorKind::NoData | ErrorKind::NoSpace => io::ErrorKind::WouldBlock,
            ErrorKind::Io(kind) => kind,
        };

        io::Error::new(kind, error.description)
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn new_carries_no_native_detail() {
        let error = Error::new(ErrorKind::Io(io::ErrorKind::Other), "device write failed");

        assert_eq!(error.kind(), ErrorKind::Io(io::ErrorKind::Other));
        assert_eq!(error.raw_os_error(), None);
        assert_eq!(error.to_string(), "device write failed");
    }

    #[test]
    fn raw_os_error_is_preserved() {
        let error = Error::from_raw_os_error(5);

        assert_eq!(error.raw_os_error(), Some(5));
        assert!(matches!(error.kind(), ErrorKind::Io(_)));
    }

    #[test]
    fn io_error_with_code_round_trips() {
        let error = Error::from(io::Error::from_raw_os_error(5));
        assert_eq!(error.raw_os_error(), Some(5));

        let io_error = io::Error::from(error);
        assert_eq!(io_error.raw_os_error(), Some(5));
    }

    #[test]
    fn io_error_without_code_keeps_kind() {
        let error = Error::from(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));

        assert_eq!(error.kind(), ErrorKind::Io(io::ErrorKind::BrokenPipe));
        assert_eq!(error.raw_os_error(), None);
    }

    #[test]
    fn unimplemented_maps_to_unsupported() {
        let io_error = io::Error::from(Error::new(ErrorKind::Unimplemented, "not wired"));
        assert_eq!(io_error.kind(), io::ErrorKind::Unsupported);
    }
}
