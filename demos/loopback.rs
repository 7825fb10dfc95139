//! Round-trips a radio frame through an in-process line discipline.
//!
//! No hardware required; the "device" echoes its transmit path back into
//! its receive buffer.

use std::collections::VecDeque;
use std::io;

use radio_serial::ldisc::{ControlRequest, LdiscPort, LineDiscipline};
use radio_serial::prelude::*;

struct EchoTty {
    buffered: VecDeque<u8>,
}

impl LineDiscipline for EchoTty {
    fn name(&self) -> &str {
        "ttyECHO0"
    }

    fn driver_write(&mut self, buffer: &[u8]) -> io::Result<usize> {
        self.buffered.extend(buffer.iter().copied());
        Ok(buffer.len())
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
            ControlRequest::SetBreak | ControlRequest::ClearBreak => Some(Ok(0)),
        }
    }
}

fn main() {
    let mut port = LdiscPort::attached(
        EchoTty {
            buffered: VecDeque::new(),
        },
        9600,
    );

    let frame = [0x7E, 0x00, 0x02, 0x23, 0x11];
    let sent = port.write(&frame).unwrap();
    println!("queued {} bytes on {}", sent, port.port_name());
    println!("{} bytes waiting", port.rx_used().unwrap());

    let mut buffer = [0u8; 16];
    let received = port.read(&mut buffer).unwrap();
    println!("read back {:02X?}", &buffer[..received]);
}
