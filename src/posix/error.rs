use std::io;

use crate::error::{Error, ErrorKind};

pub fn last_os_error() -> Error {
    match io::Error::last_os_error().raw_os_error() {
        Some(errno) => from_raw_os_error(errno),
        None => Error::new(ErrorKind::Io(io::ErrorKind::Other), "unknown I/O error"),
    }
}

pub fn from_raw_os_error(errno: i32) -> Error {
    Error::from_raw_os_error(errno)
}

pub fn from_io_error(io_error: io::Error) -> Error {
    Error::from(io_error)
}
