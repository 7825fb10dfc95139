//! Serial port implementation driven through a kernel tty line discipline.

pub use self::link::*;
pub use self::port::*;

mod link;
mod port;
