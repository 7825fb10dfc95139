//! Opens a real device, sends the modem attention sequence, and polls for a
//! reply against a clock deadline.
//!
//! Usage: `terminal /dev/ttyUSB0`

#[cfg(unix)]
fn main() {
    use std::env;
    use std::thread;
    use std::time::Duration;

    use radio_serial::clock::{SystemClock, MS_TIMER_RESOLUTION};
    use radio_serial::prelude::*;

    let device = env::args_os().nth(1).expect("usage: terminal <device>");

    println!("opening port: {:?}", device);
    let mut port = radio_serial::open(&device, 9600).unwrap();

    port.write(b"+++").unwrap();

    let clock = SystemClock::new();
    let deadline = clock.milliseconds() + 2_000;

    while clock.milliseconds() < deadline {
        if port.rx_used().unwrap() > 0 {
            let mut buffer = [0u8; 64];
            let count = port.read(&mut buffer).unwrap();
            print!("{}", String::from_utf8_lossy(&buffer[..count]));
        }

        thread::sleep(Duration::from_millis(MS_TIMER_RESOLUTION as u64));
    }

    port.close().unwrap();
}

#[cfg(not(unix))]
fn main() {
    eprintln!("this demo drives a POSIX TTY device; build it on a Unix host");
}
