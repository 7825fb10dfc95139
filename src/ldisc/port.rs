use std::io;

use tracing::{debug, trace};

use super::link::{ControlRequest, LineDiscipline};
use crate::error::{Error, ErrorKind, Result};
use crate::SerialPort;

/// A serial port driven through an attached kernel tty line discipline.
///
/// Unlike the POSIX backend, this port never opens or closes anything
/// itself: the surrounding kernel machinery attaches a tty to the handle
/// with [`attached`](LdiscPort::attached)/[`attach`](LdiscPort::attach) and
/// releases it with [`detach`](LdiscPort::detach). The contract's `open`,
/// `close`, and `set_baudrate` are therefore permanent
/// [`Unimplemented`](ErrorKind::Unimplemented) outcomes here, and a handle
/// with no attached tty fails every transport operation with
/// [`InvalidHandle`](ErrorKind::InvalidHandle).
pub struct LdiscPort<T: LineDiscipline> {
    baudrate: u32,
    link: Option<T>,
}

impl<T: LineDiscipline> LdiscPort<T> {
    /// Wraps a tty that the kernel has already attached and configured for
    /// `baudrate`.
    pub fn attached(link: T, baudrate: u32) -> Self {
        LdiscPort {
            baudrate: baudrate,
            link: Some(link),
        }
    }

    /// Creates a handle with no attached tty. Every transport operation
    /// fails with [`InvalidHandle`](ErrorKind::InvalidHandle) until a link
    /// is attached.
    pub fn detached() -> Self {
        LdiscPort {
            baudrate: 0,
            link: None,
        }
    }

    /// Binds an attached tty to this handle, replacing any previous link.
    pub fn attach(&mut self, link: T, baudrate: u32) -> Option<T> {
        self.baudrate = baudrate;
        self.link.replace(link)
    }

    /// Releases the attached tty, invalidating the handle.
    pub fn detach(&mut self) -> Option<T> {
        self.link.take()
    }

    fn link(&mut self) -> Result<&mut T> {
        match self.link {
            Some(ref mut link) => Ok(link),
            None => {
                trace!("operation on detached tty handle");
                Err(Error::new(ErrorKind::InvalidHandle, "no tty attached"))
            }
        }
    }
}

fn unimplemented(what: &str) -> Error {
    Error::new(
        ErrorKind::Unimplemented,
        format!("{} is not wired on this line discipline", what),
    )
}

impl<T: LineDiscipline> SerialPort for LdiscPort<T> {
    fn is_open(&self) -> bool {
        self.link.is_some()
    }

    fn port_name(&self) -> &str {
        match self.link {
            Some(ref link) => link.name(),
            None => "(detached)",
        }
    }

    fn baudrate(&self) -> u32 {
        self.baudrate
    }

    fn open(&mut self, _baudrate: u32) -> Result<()> {
        Err(Error::new(
            ErrorKind::Unimplemented,
            "tty attachment is managed by the kernel",
        ))
    }

    fn close(&mut self) -> Result<()> {
        Err(Error::new(
            ErrorKind::Unimplemented,
            "tty detachment is managed by the kernel",
        ))
    }

    fn set_baudrate(&mut self, _baudrate: u32) -> Result<()> {
        Err(Error::new(
            ErrorKind::Unimplemented,
            "line speed is configured at attachment time",
        ))
    }

    fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        let link = self.link()?;

        let result = match link.write(buffer) {
            Some(result) => result,
            None => link.driver_write(buffer),
        };

        match result {
            Ok(count) => {
                trace!(count, requested = buffer.len(), "ldisc write");
                Ok(count)
            }
            Err(err) => {
                debug!(%err, requested = buffer.len(), "ldisc write failed");
                Err(Error::new(
                    ErrorKind::Io(io::ErrorKind::Other),
                    "device write failed",
                ))
            }
        }
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let link = self.link()?;

        match link.read(buffer) {
            None => Err(unimplemented("read")),
            Some(Ok(count)) => {
                trace!(count, "ldisc read");
                Ok(count)
            }
            Some(Err(err)) => {
                debug!(%err, "ldisc read failed");
                Err(Error::from(err))
            }
        }
    }

    fn tx_free(&mut self) -> Result<usize> {
        self.link()?;
        Ok(usize::MAX)
    }

    fn tx_used(&mut self) -> Result<usize> {
        // the tty layer keeps its transmit queue to itself
        self.link()?;
        Ok(0)
    }

    fn tx_flush(&mut self) -> Result<()> {
        match self.link()?.wait_until_sent() {
            Some(()) => Ok(()),
            None => Err(unimplemented("wait-until-sent")),
        }
    }

    fn rx_free(&mut self) -> Result<usize> {
        self.link()?;
        Ok(usize::MAX)
    }

    fn rx_used(&mut self) -> Result<usize> {
        let link = self.link()?;

        match link.control(ControlRequest::InputAvailable) {
            None => Err(unimplemented("control requests")),
            Some(Ok(count)) => Ok(count),
            Some(Err(err)) => {
                debug!(%err, "input-count control request failed");
                Err(Error::from(err))
            }
        }
    }

    fn rx_flush(&mut self) -> Result<()> {
        match self.link()?.discard_input() {
            Some(()) => Ok(()),
            None => Err(unimplemented("input flush")),
        }
    }

    fn set_break(&mut self, enabled: bool) -> Result<()> {
        let link = self.link()?;

        let request = if enabled {
            ControlRequest::SetBreak
        } else {
            ControlRequest::ClearBreak
        };

        match link.control(request) {
            None => Err(unimplemented("control requests")),
            Some(Ok(_)) => Ok(()),
            Some(Err(err)) => {
                debug!(%err, ?request, "break control request failed");
                Err(Error::from(err))
            }
        }
    }

    fn set_flow_control(&mut self, _enabled: bool) -> Result<()> {
        self.link()?;
        Err(unimplemented("flow control"))
    }

    fn set_rts(&mut self, _asserted: bool) -> Result<()> {
        self.link()?;
        Err(unimplemented("modem control lines"))
    }

    fn get_cts(&mut self) -> Result<bool> {
        self.link()?;
        Err(unimplemented("modem control lines"))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io;

    use super::*;

    /// Echoes every transmitted byte back out of the receive side, with a
    /// bounded transmit window. Wires everything except wait-until-sent.
    struct LoopbackTty {
        buffered: VecDeque<u8>,
        capacity: usize,
        break_asserted: bool,
    }

    impl LoopbackTty {
        fn new() -> Self {
            LoopbackTty::with_capacity(usize::MAX)
        }

        fn with_capacity(capacity: usize) -> Self {
            LoopbackTty {
                buffered: VecDeque::new(),
                capacity: capacity,
                break_asserted: false,
            }
        }
    }

    impl LineDiscipline for LoopbackTty {
        fn name(&self) -> &str {
            "ttyLOOP0"
        }

        fn driver_write(&mut self, _buffer: &[u8]) -> io::Result<usize> {
            panic!("loopback wires an ldisc write; the driver path must not run");
        }

        fn write(&mut self, buffer: &[u8]) -> Option<io::Result<usize>> {
            let accepted = buffer.len().min(self.capacity - self.buffered.len());
            self.buffered.extend(buffer[..accepted].iter().copied());
            Some(Ok(accepted))
        }

        fn read(&mut self, buffer: &mut [u8]) -> Option<io::Result<usize>> {
            let count = buffer.len().min(self.buffered.len());
            for slot in &mut buffer[..count] {
                *slot = self.buffered.pop_front().unwrap();
            }
            Some(Ok(count))
        }

        fn control(&mut self, request: ControlRequest) -> Option<io::Result<usize>> {
            match request {
                ControlRequest::InputAvailable => Some(Ok(self.buffered.len())),
                ControlRequest::SetBreak => {
                    self.break_asserted = true;
                    Some(Ok(0))
                }
                ControlRequest::ClearBreak => {
                    self.break_asserted = false;
                    Some(Ok(0))
                }
            }
        }

        fn discard_input(&mut self) -> Option<()> {
            self.buffered.clear();
            Some(())
        }
    }

    /// A tty with no discipline operations at all: only the driver's own
    /// transmit path exists.
    struct BareTty {
        sink: Vec<u8>,
    }

    impl LineDiscipline for BareTty {
        fn name(&self) -> &str {
            "ttyBARE0"
        }

        fn driver_write(&mut self, buffer: &[u8]) -> io::Result<usize> {
            self.sink.extend_from_slice(buffer);
            Ok(buffer.len())
        }
    }

    /// A tty whose native primitives all fail.
    struct FaultyTty;

    impl LineDiscipline for FaultyTty {
        fn name(&self) -> &str {
            "ttyBAD0"
        }

        fn driver_write(&mut self, _buffer: &[u8]) -> io::Result<usize> {
            Err(io::Error::from_raw_os_error(5))
        }

        fn read(&mut self, _buffer: &mut [u8]) -> Option<io::Result<usize>> {
            Some(Err(io::Error::from_raw_os_error(5)))
        }

        fn control(&mut self, _request: ControlRequest) -> Option<io::Result<usize>> {
            Some(Err(io::Error::from_raw_os_error(25)))
        }
    }

    fn loopback() -> LdiscPort<LoopbackTty> {
        LdiscPort::attached(LoopbackTty::new(), 9600)
    }

    #[test]
    fn round_trip_preserves_order_and_values() {
        let mut port = loopback();

        let frame = [0x7E, 0x00, 0x02, 0x23, 0x11];
        assert_eq!(port.write(&frame).unwrap(), frame.len());

        let mut buffer = [0u8; 8];
        assert_eq!(port.read(&mut buffer).unwrap(), frame.len());
        assert_eq!(&buffer[..frame.len()], &frame);
    }

    #[test]
    fn round_trip_survives_split_reads() {
        let mut port = loopback();

        port.write(&[0x7E, 0x00, 0x02]).unwrap();

        let mut buffer = [0u8; 2];
        assert_eq!(port.read(&mut buffer).unwrap(), 2);
        assert_eq!(buffer, [0x7E, 0x00]);

        assert_eq!(port.read(&mut buffer).unwrap(), 1);
        assert_eq!(buffer[0], 0x02);
    }

    #[test]
    fn put_char_get_char_round_trip() {
        let mut port = loopback();

        port.put_char(0xA5).unwrap();
        assert_eq!(port.get_char().unwrap(), 0xA5);
    }

    #[test]
    fn get_char_on_empty_buffer_reports_no_data() {
        let mut port = loopback();

        let err = port.get_char().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoData);
    }

    #[test]
    fn read_on_empty_buffer_returns_zero() {
        let mut port = loopback();

        let mut buffer = [0u8; 4];
        assert_eq!(port.read(&mut buffer).unwrap(), 0);
    }

    #[test]
    fn full_transmit_window_reports_no_space() {
        let mut port = LdiscPort::attached(LoopbackTty::with_capacity(0), 9600);

        assert_eq!(port.write(&[0x55]).unwrap(), 0);
        assert_eq!(port.put_char(0x55).unwrap_err().kind(), ErrorKind::NoSpace);
    }

    #[test]
    fn short_write_reports_partial_count() {
        let mut port = LdiscPort::attached(LoopbackTty::with_capacity(2), 9600);

        assert_eq!(port.write(&[1, 2, 3]).unwrap(), 2);
    }

    #[test]
    fn detached_handle_rejects_every_operation() {
        let mut port = loopback();
        let link = port.detach().unwrap();
        assert!(link.buffered.is_empty());
        assert!(!port.is_open());

        let mut buffer = [0u8; 4];
        assert_eq!(
            port.write(&[1]).unwrap_err().kind(),
            ErrorKind::InvalidHandle
        );
        assert_eq!(
            port.read(&mut buffer).unwrap_err().kind(),
            ErrorKind::InvalidHandle
        );
        assert_eq!(port.put_char(1).unwrap_err().kind(), ErrorKind::InvalidHandle);
        assert_eq!(port.get_char().unwrap_err().kind(), ErrorKind::InvalidHandle);
        assert_eq!(port.tx_free().unwrap_err().kind(), ErrorKind::InvalidHandle);
        assert_eq!(port.tx_used().unwrap_err().kind(), ErrorKind::InvalidHandle);
        assert_eq!(port.tx_flush().unwrap_err().kind(), ErrorKind::InvalidHandle);
        assert_eq!(port.rx_free().unwrap_err().kind(), ErrorKind::InvalidHandle);
        assert_eq!(port.rx_used().unwrap_err().kind(), ErrorKind::InvalidHandle);
        assert_eq!(port.rx_flush().unwrap_err().kind(), ErrorKind::InvalidHandle);
        assert_eq!(
            port.set_break(true).unwrap_err().kind(),
            ErrorKind::InvalidHandle
        );
        assert_eq!(
            port.set_flow_control(true).unwrap_err().kind(),
            ErrorKind::InvalidHandle
        );
        assert_eq!(
            port.set_rts(true).unwrap_err().kind(),
            ErrorKind::InvalidHandle
        );
        assert_eq!(port.get_cts().unwrap_err().kind(), ErrorKind::InvalidHandle);
    }

    #[test]
    fn never_attached_handle_is_invalid() {
        let mut port = LdiscPort::<LoopbackTty>::detached();

        assert!(!port.is_open());
        assert_eq!(port.port_name(), "(detached)");
        assert_eq!(
            port.write(b"AT\r").unwrap_err().kind(),
            ErrorKind::InvalidHandle
        );
    }

    #[test]
    fn lifecycle_stubs_are_unimplemented_in_any_state() {
        let mut port = loopback();
        assert_eq!(port.open(9600).unwrap_err().kind(), ErrorKind::Unimplemented);
        assert_eq!(port.close().unwrap_err().kind(), ErrorKind::Unimplemented);
        assert_eq!(
            port.set_baudrate(115200).unwrap_err().kind(),
            ErrorKind::Unimplemented
        );

        port.detach();
        assert_eq!(port.open(9600).unwrap_err().kind(), ErrorKind::Unimplemented);
        assert_eq!(port.close().unwrap_err().kind(), ErrorKind::Unimplemented);
        assert_eq!(
            port.set_baudrate(115200).unwrap_err().kind(),
            ErrorKind::Unimplemented
        );
    }

    #[test]
    fn modem_lines_are_unimplemented() {
        let mut port = loopback();

        assert_eq!(
            port.set_flow_control(true).unwrap_err().kind(),
            ErrorKind::Unimplemented
        );
        assert_eq!(
            port.set_rts(true).unwrap_err().kind(),
            ErrorKind::Unimplemented
        );
        assert_eq!(port.get_cts().unwrap_err().kind(), ErrorKind::Unimplemented);
    }

    #[test]
    fn write_falls_back_to_the_driver_path() {
        let mut port = LdiscPort::attached(BareTty { sink: Vec::new() }, 9600);

        assert_eq!(port.write(b"AT\r").unwrap(), 3);

        let link = port.detach().unwrap();
        assert_eq!(link.sink, b"AT\r");
    }

    #[test]
    fn missing_primitives_are_unimplemented_every_time() {
        let mut port = LdiscPort::attached(BareTty { sink: Vec::new() }, 9600);
        let mut buffer = [0u8; 4];

        for _ in 0..2 {
            assert_eq!(
                port.read(&mut buffer).unwrap_err().kind(),
                ErrorKind::Unimplemented
            );
            assert_eq!(
                port.rx_used().unwrap_err().kind(),
                ErrorKind::Unimplemented
            );
            assert_eq!(
                port.rx_flush().unwrap_err().kind(),
                ErrorKind::Unimplemented
            );
            assert_eq!(
                port.tx_flush().unwrap_err().kind(),
                ErrorKind::Unimplemented
            );
            assert_eq!(
                port.set_break(true).unwrap_err().kind(),
                ErrorKind::Unimplemented
            );
        }
    }

    #[test]
    fn write_failure_discards_native_detail() {
        let mut port = LdiscPort::attached(FaultyTty, 9600);

        let err = port.write(&[0x55]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io(io::ErrorKind::Other));
        assert_eq!(err.raw_os_error(), None);
    }

    #[test]
    fn read_failure_preserves_native_detail() {
        let mut port = LdiscPort::attached(FaultyTty, 9600);

        let mut buffer = [0u8; 4];
        let err = port.read(&mut buffer).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Io(_)));
        assert_eq!(err.raw_os_error(), Some(5));
    }

    #[test]
    fn control_failure_preserves_native_detail() {
        let mut port = LdiscPort::attached(FaultyTty, 9600);

        assert_eq!(port.rx_used().unwrap_err().raw_os_error(), Some(25));
        assert_eq!(port.set_break(true).unwrap_err().raw_os_error(), Some(25));
    }

    #[test]
    fn buffer_status_reports() {
        let mut port = loopback();

        assert_eq!(port.tx_free().unwrap(), usize::MAX);
        assert_eq!(port.rx_free().unwrap(), usize::MAX);
        assert_eq!(port.tx_used().unwrap(), 0);
        assert_eq!(port.rx_used().unwrap(), 0);

        port.write(&[1, 2, 3]).unwrap();
        assert_eq!(port.rx_used().unwrap(), 3);
    }

    #[test]
    fn rx_flush_discards_buffered_input() {
        let mut port = loopback();

        port.write(&[1, 2, 3]).unwrap();
        port.rx_flush().unwrap();

        assert_eq!(port.rx_used().unwrap(), 0);
        assert_eq!(port.get_char().unwrap_err().kind(), ErrorKind::NoData);
    }

    #[test]
    fn break_control_round_trips() {
        let mut port = loopback();

        port.set_break(true).unwrap();
        assert!(port.detach().unwrap().break_asserted);

        let mut port = loopback();
        port.set_break(true).unwrap();
        port.set_break(false).unwrap();
        assert!(!port.detach().unwrap().break_asserted);
    }

    #[test]
    fn port_identity_follows_the_link() {
        let mut port = loopback();
        assert!(port.is_open());
        assert_eq!(port.port_name(), "ttyLOOP0");
        assert_eq!(port.baudrate(), 9600);

        port.detach();
        assert_eq!(port.port_name(), "(detached)");
    }

    #[test]
    fn reattach_revalidates_the_handle() {
        let mut port = LdiscPort::<LoopbackTty>::detached();
        assert!(port.attach(LoopbackTty::new(), 115200).is_none());

        assert!(port.is_open());
        assert_eq!(port.baudrate(), 115200);
        assert_eq!(port.write(&[0x7E]).unwrap(), 1);
    }
}
