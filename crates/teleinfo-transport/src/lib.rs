//! Serial line transport for Teleinfo meters.
//!
//! The meter's customer output is a half-duplex serial line with fixed electrical
//! framing: 1200 baud, 7 data bits, even parity, 1 stop bit. This crate opens a tty
//! device with those settings in raw mode and exposes it as a blocking [`std::io::Read`].
//!
//! This is the lowest layer of teleinfo. The frame decoder reads from the
//! [`SerialPort`] provided here.

pub mod config;
pub mod error;

#[cfg(unix)]
pub mod serial;

pub use config::{DataBits, Parity, SerialConfig, StopBits, TELEINFO_BAUD_RATE};
pub use error::{Result, TransportError};

#[cfg(unix)]
pub use serial::SerialPort;
