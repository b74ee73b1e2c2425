//! Board control and port discovery.
//!
//! A [`DeviceControl`] drives whatever lines put the chip into its boot ROM
//! (SOP2 strap plus reset on a LaunchPad, a GPIO expander on a test rig).
//! The flashing engine only ever calls it through the trait; how the lines
//! are toggled is up to the integrator.

pub mod detect;

pub use detect::{
    DetectedPort, DeviceKind, auto_detect_port, detect_ports, format_port_list, select_port,
};

use {crate::error::Result, log::warn};

/// Reset/boot-mode control of the target board.
pub trait DeviceControl {
    /// Reset the chip into its boot ROM.
    fn enter_bootloader(&mut self) -> Result<()>;

    /// Reset the chip into the flashed firmware.
    fn boot_firmware(&mut self) -> Result<()>;

    /// Release the control lines.
    fn close(&mut self) -> Result<()>;
}

impl<D: DeviceControl + ?Sized> DeviceControl for Box<D> {
    fn enter_bootloader(&mut self) -> Result<()> {
        (**self).enter_bootloader()
    }

    fn boot_firmware(&mut self) -> Result<()> {
        (**self).boot_firmware()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Owns a [`DeviceControl`] for the duration of a run and closes it once,
/// either explicitly or on drop.
pub struct ControlGuard<D: DeviceControl> {
    inner: D,
    closed: bool,
}

impl<D: DeviceControl> ControlGuard<D> {
    /// Take ownership of an acquired control.
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            closed: false,
        }
    }

    /// Borrow the control.
    pub fn control(&mut self) -> &mut D {
        &mut self.inner
    }

    /// Whether [`close`](Self::close) already ran.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the control. Later calls do nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner
            .close()
    }
}

impl<D: DeviceControl> Drop for ControlGuard<D> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to release device control: {e}");
        }
    }
}
