//! Port abstraction for serial communication with the boot ROM.
//!
//! The protocol layer never touches a concrete serial port. It talks to a
//! [`Port`], which is a duplex byte channel with a configurable read timeout
//! and the ability to hold the line in a break condition (the boot ROM
//! answers a break with an ACK).
//!
//! ```text
//! +---------------------------+
//! |  Negotiator / Upload      |
//! +-------------+-------------+
//!               |
//! +-------------v-------------+
//! |  RomClient (cmd/status)   |
//! +-------------+-------------+
//!               |
//! +-------------v-------------+
//! |  Transport (packets/ACK)  |
//! +-------------+-------------+
//!               |
//! +-------------v-------------+
//! |        Port trait         |
//! +-------------+-------------+
//!               |
//! +-------------v-------------+
//! | NativePort (serialport)   |
//! +---------------------------+
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use ccflash::port::Port;
//!
//! fn example<P: Port>(port: &mut P) -> ccflash::Result<()> {
//!     port.set_break(true)?;
//!     let mut ack = [0u8; 2];
//!     std::io::Read::read_exact(port, &mut ack)?;
//!     port.set_break(false)?;
//!     Ok(())
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;

#[cfg(test)]
pub(crate) mod mock;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// Default baud rate of the CC3200/CC32xx boot ROM UART.
pub const DEFAULT_BAUD: u32 = 921_600;

/// Serial port configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB1", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Initial read/write timeout.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD,
            timeout: Duration::from_millis(1000),
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Serial port information.
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial_number: Option<String>,
}

/// Duplex byte channel used to talk to the boot ROM.
///
/// Reads are expected to block for at most [`Port::timeout`] and to fail with
/// [`std::io::ErrorKind::TimedOut`] when nothing arrives. A read returning
/// `Ok(0)` is treated as end of stream.
pub trait Port: Read + Write + Send {
    /// Set the read timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Get the current timeout.
    fn timeout(&self) -> Duration;

    /// Assert (`true`) or release (`false`) the break condition on TX.
    fn set_break(&mut self, level: bool) -> Result<()>;

    /// Discard pending input and output.
    fn clear_buffers(&mut self) -> Result<()>;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Close the port and release resources.
    ///
    /// After calling this method every read and write fails.
    fn close(&mut self) -> Result<()>;
}

impl<P: Port + ?Sized> Port for Box<P> {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        (**self).set_timeout(timeout)
    }

    fn timeout(&self) -> Duration {
        (**self).timeout()
    }

    fn set_break(&mut self, level: bool) -> Result<()> {
        (**self).set_break(level)
    }

    fn clear_buffers(&mut self) -> Result<()> {
        (**self).clear_buffers()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Trait for listing available serial ports.
pub trait PortEnumerator {
    /// List all available serial ports.
    fn list_ports() -> Result<Vec<PortInfo>>;
}

#[cfg(feature = "native")]
pub use native::{NativePort, NativePortEnumerator};
