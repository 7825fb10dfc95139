use std::ffi::CString;
use std::io;
use std::path::{Path, PathBuf};

use std::os::unix::prelude::*;

use libc::{c_int, c_void, size_t};
use tracing::debug;

use crate::error::{Error, ErrorKind, Result};
use crate::SerialPort;

/// A serial port backed by a POSIX TTY device file.
///
/// The handle keeps the device path for its whole life. `open` binds a file
/// descriptor to it and puts the line into raw 8N1 mode; `close` releases
/// the descriptor and the handle goes back to rejecting every transport
/// operation with [`InvalidHandle`](ErrorKind::InvalidHandle). Dropping an
/// open handle releases the descriptor as well.
///
/// The descriptor stays non-blocking for its whole life: `read` and `write`
/// report "nothing moved" as `Ok(0)` instead of waiting, and deadline logic
/// belongs to the caller (see [`Clock`](crate::clock::Clock)).
pub struct TTYPort {
    device: PathBuf,
    baudrate: u32,
    fd: Option<RawFd>,
}

impl TTYPort {
    /// Creates a closed handle for the TTY device at `path`, e.g.
    /// `/dev/ttyUSB0`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        TTYPort {
            device: path.as_ref().to_path_buf(),
            baudrate: 0,
            fd: None,
        }
    }

    fn fd(&self) -> Result<RawFd> {
        match self.fd {
            Some(fd) => Ok(fd),
            None => Err(Error::new(ErrorKind::InvalidHandle, "port is closed")),
        }
    }

    fn set_pin(&mut self, pin: c_int, level: bool) -> Result<()> {
        let fd = self.fd()?;

        let retval = if level {
            ioctl::tiocmbis(fd, pin)
        } else {
            ioctl::tiocmbic(fd, pin)
        };

        match retval {
            Ok(()) => Ok(()),
            Err(err) => Err(super::error::from_io_error(err)),
        }
    }

    fn read_pin(&mut self, pin: c_int) -> Result<bool> {
        let fd = self.fd()?;

        match ioctl::tiocmget(fd) {
            Ok(pins) => Ok(pins & pin != 0),
            Err(err) => Err(super::error::from_io_error(err)),
        }
    }

    /// Puts the descriptor into binary serial mode: receiver on, modem
    /// control lines ignored, no canonical processing, no echo, no signal
    /// characters, 8N1 framing, zero-character reads allowed.
    fn configure_raw(fd: RawFd, baudrate: u32) -> Result<()> {
        use termios::OPOST; // oflags
        use termios::{tcflush, tcsetattr, Termios};
        use termios::{CLOCAL, CREAD, CS8, CSIZE, CSTOPB, PARENB}; // cflags
        use termios::{ECHO, ECHOE, ECHOK, ECHONL, ICANON, IEXTEN, ISIG}; // lflags
        use termios::{ICRNL, IGNBRK, IGNCR, INLCR, IXOFF, IXON}; // iflags
        use termios::{TCIOFLUSH, TCSANOW};
        use termios::{VMIN, VTIME}; // c_cc indexes

        let mut termios = match Termios::from_fd(fd) {
            Ok(t) => t,
            Err(e) => return Err(super::error::from_io_error(e)),
        };

        termios.c_cflag |= CREAD | CLOCAL;
        termios.c_cflag &= !(CSIZE | CSTOPB | PARENB);
        termios.c_cflag |= CS8;
        termios.c_lflag &= !(ICANON | ECHO | ECHOE | ECHOK | ECHONL | ISIG | IEXTEN);
        termios.c_oflag &= !OPOST;
        termios.c_iflag &= !(INLCR | IGNCR | ICRNL | IGNBRK | IXON | IXOFF);

        termios.c_cc[VMIN] = 0;
        termios.c_cc[VTIME] = 0;

        set_speed(&mut termios, baudrate)?;

        if let Err(err) = tcsetattr(fd, TCSANOW, &termios) {
            return Err(super::error::from_io_error(err));
        }

        if let Err(err) = tcflush(fd, TCIOFLUSH) {
            return Err(super::error::from_io_error(err));
        }

        Ok(())
    }
}

impl Drop for TTYPort {
    fn drop(&mut self) {
        if let Some(fd) = self.fd.take() {
            let _ = ioctl::tiocnxcl(fd);

            unsafe {
                libc::close(fd);
            }
        }
    }
}

impl SerialPort for TTYPort {
    fn is_open(&self) -> bool {
        self.fd.is_some()
    }

    fn port_name(&self) -> &str {
        self.device.to_str().unwrap_or("(invalid)")
    }

    fn baudrate(&self) -> u32 {
        self.baudrate
    }

    fn open(&mut self, baudrate: u32) -> Result<()> {
        use libc::{EINVAL, O_NOCTTY, O_NONBLOCK, O_RDWR};

        if self.fd.is_some() {
            self.close()?;
        }

        let cstr = match CString::new(self.device.as_os_str().as_bytes()) {
            Ok(s) => s,
            Err(_) => return Err(super::error::from_raw_os_error(EINVAL)),
        };

        let fd = unsafe { libc::open(cstr.as_ptr(), O_RDWR | O_NOCTTY | O_NONBLOCK, 0) };
        if fd < 0 {
            return Err(super::error::last_os_error());
        }

        // get exclusive access to device
        if let Err(err) = ioctl::tiocexcl(fd) {
            unsafe { libc::close(fd) };
            return Err(super::error::from_io_error(err));
        }

        if let Err(err) = TTYPort::configure_raw(fd, baudrate) {
            unsafe { libc::close(fd) };
            return Err(err);
        }

        self.fd = Some(fd);
        self.baudrate = baudrate;

        debug!(device = %self.device.display(), baudrate, "opened serial device");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let fd = match self.fd.take() {
            Some(fd) => fd,
            None => return Err(Error::new(ErrorKind::InvalidHandle, "port is closed")),
        };

        // the handle is invalid from here on, whatever the native calls say
        let _ = ioctl::tiocnxcl(fd);

        if unsafe { libc::close(fd) } < 0 {
            return Err(super::error::last_os_error());
        }

        debug!(device = %self.device.display(), "closed serial device");
        Ok(())
    }

    fn set_baudrate(&mut self, baudrate: u32) -> Result<()> {
        use termios::{tcsetattr, Termios, TCSANOW};

        let fd = self.fd()?;

        let mut termios = match Termios::from_fd(fd) {
            Ok(t) => t,
            Err(e) => return Err(super::error::from_io_error(e)),
        };

        set_speed(&mut termios, baudrate)?;

        if let Err(err) = tcsetattr(fd, TCSANOW, &termios) {
            return Err(super::error::from_io_error(err));
        }

        self.baudrate = baudrate;
        Ok(())
    }

    fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        let fd = self.fd()?;

        let len = unsafe { libc::write(fd, buffer.as_ptr() as *const c_void, buffer.len() as size_t) };
        if len >= 0 {
            return Ok(len as usize);
        }

        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock {
            // transmit buffer cannot take more right now
            return Ok(0);
        }

        debug!(%err, requested = buffer.len(), "tty write failed");
        Err(Error::new(
            ErrorKind::Io(io::ErrorKind::Other),
            "device write failed",
        ))
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let fd = self.fd()?;

        let len = unsafe { libc::read(fd, buffer.as_mut_ptr() as *mut c_void, buffer.len() as size_t) };
        if len >= 0 {
            return Ok(len as usize);
        }

        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock {
            return Ok(0);
        }

        debug!(%err, "tty read failed");
        Err(super::error::from_io_error(err))
    }

    fn tx_free(&mut self) -> Result<usize> {
        self.fd()?;
        Ok(usize::MAX)
    }

    fn tx_used(&mut self) -> Result<usize> {
        // the kernel keeps its transmit queue to itself
        self.fd()?;
        Ok(0)
    }

    fn tx_flush(&mut self) -> Result<()> {
        let fd = self.fd()?;

        match termios::tcdrain(fd) {
            Ok(()) => Ok(()),
            Err(err) => Err(super::error::from_io_error(err)),
        }
    }

    fn rx_free(&mut self) -> Result<usize> {
        self.fd()?;
        Ok(usize::MAX)
    }

    fn rx_used(&mut self) -> Result<usize> {
        let fd = self.fd()?;

        let mut count: c_int = 0;
        if unsafe { libc::ioctl(fd, libc::FIONREAD as _, &mut count as *mut c_int) } < 0 {
            return Err(super::error::last_os_error());
        }

        Ok(count as usize)
    }

    fn rx_flush(&mut self) -> Result<()> {
        use termios::{tcflush, TCIFLUSH};

        let fd = self.fd()?;

        match tcflush(fd, TCIFLUSH) {
            Ok(()) => Ok(()),
            Err(err) => Err(super::error::from_io_error(err)),
        }
    }

    fn set_break(&mut self, enabled: bool) -> Result<()> {
        let fd = self.fd()?;

        let request = if enabled {
            libc::TIOCSBRK
        } else {
            libc::TIOCCBRK
        };

        if unsafe { libc::ioctl(fd, request as _) } < 0 {
            return Err(super::error::last_os_error());
        }

        Ok(())
    }

    fn set_flow_control(&mut self, enabled: bool) -> Result<()> {
        use termios::os::target::CRTSCTS;
        use termios::{tcsetattr, Termios, IXOFF, IXON, TCSANOW};

        let fd = self.fd()?;

        let mut termios = match Termios::from_fd(fd) {
            Ok(t) => t,
            Err(e) => return Err(super::error::from_io_error(e)),
        };

        if enabled {
            termios.c_cflag |= CRTSCTS;
        } else {
            termios.c_cflag &= !CRTSCTS;
        }
        termios.c_iflag &= !(IXON | IXOFF);

        match tcsetattr(fd, TCSANOW, &termios) {
            Ok(()) => Ok(()),
            Err(err) => Err(super::error::from_io_error(err)),
        }
    }

    fn set_rts(&mut self, asserted: bool) -> Result<()> {
        self.set_pin(ioctl::TIOCM_RTS as c_int, asserted)
    }

    fn get_cts(&mut self) -> Result<bool> {
        self.read_pin(ioctl::TIOCM_CTS as c_int)
    }
}

fn set_speed(termios: &mut termios::Termios, baudrate: u32) -> Result<()> {
    use termios::cfsetspeed;
    use termios::os::target::{B115200, B230400, B57600};
    use termios::{B110, B1200, B19200, B2400, B300, B38400, B4800, B600, B9600};

    #[cfg(target_os = "linux")]
    use termios::os::linux::{B460800, B921600};

    let baud = match baudrate {
        110 => B110,
        300 => B300,
        600 => B600,
        1200 => B1200,
        2400 => B2400,
        4800 => B4800,
        9600 => B9600,
        19200 => B19200,
        38400 => B38400,
        57600 => B57600,
        115200 => B115200,
        230400 => B230400,
        #[cfg(target_os = "linux")]
        460800 => B460800,
        #[cfg(target_os = "linux")]
        921600 => B921600,

        _ => {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("unsupported baud rate: {}", baudrate),
            ))
        }
    };

    match cfsetspeed(termios, baud) {
        Ok(()) => Ok(()),
        Err(err) => Err(super::error::from_io_error(err)),
    }
}
