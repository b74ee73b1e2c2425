//! Native serial port implementation using the `serialport` crate.

use {
    crate::{
        error::{Error, Result},
        port::{Port, PortEnumerator, PortInfo, SerialConfig},
    },
    log::{debug, trace},
    serialport::{ClearBuffer, DataBits, FlowControl, Parity, StopBits},
    std::{
        io::{Read, Write},
        time::Duration,
    },
};

/// Native serial port implementation.
pub struct NativePort {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
    timeout: Duration,
}

impl NativePort {
    /// Open a boot ROM link: 8N1, no flow control, break released.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let mut port = serialport::new(&config.port_name, config.baud_rate)
            .timeout(config.timeout)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open()?;
        // A previous session may have left the line in break.
        port.clear_break()?;
        debug!("Opened {} at {} baud", config.port_name, config.baud_rate);

        Ok(Self {
            port: Some(port),
            name: config
                .port_name
                .clone(),
            timeout: config.timeout,
        })
    }

    fn inner(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| {
                Error::Serial(serialport::Error::new(
                    serialport::ErrorKind::NoDevice,
                    "Port is closed",
                ))
            })
    }

    fn io(&mut self) -> std::io::Result<&mut Box<dyn serialport::SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotConnected, "port closed"))
    }
}

impl Port for NativePort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.inner()?
            .set_timeout(timeout)?;
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_break(&mut self, level: bool) -> Result<()> {
        trace!("{}: break {}", self.name, if level { "on" } else { "off" });
        let port = self.inner()?;
        if level {
            port.set_break()?;
        } else {
            port.clear_break()?;
        }
        Ok(())
    }

    fn clear_buffers(&mut self) -> Result<()> {
        self.inner()?
            .clear(ClearBuffer::All)?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) -> Result<()> {
        if self
            .port
            .take()
            .is_some()
        {
            debug!("Closed {}", self.name);
        }
        Ok(())
    }
}

impl Read for NativePort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.io()?
            .read(buf)
    }
}

impl Write for NativePort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.io()?
            .write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.io()?
            .flush()
    }
}

fn port_info(port: serialport::SerialPortInfo) -> PortInfo {
    let mut info = PortInfo {
        name: port.port_name,
        vid: None,
        pid: None,
        manufacturer: None,
        product: None,
        serial_number: None,
    };
    if let serialport::SerialPortType::UsbPort(usb) = port.port_type {
        info.vid = Some(usb.vid);
        info.pid = Some(usb.pid);
        info.manufacturer = usb.manufacturer;
        info.product = usb.product;
        info.serial_number = usb.serial_number;
    }
    info
}

/// Native port enumerator.
pub struct NativePortEnumerator;

impl PortEnumerator for NativePortEnumerator {
    fn list_ports() -> Result<Vec<PortInfo>> {
        Ok(serialport::available_ports()?
            .into_iter()
            .map(port_info)
            .collect())
    }
}
