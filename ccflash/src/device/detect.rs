//! Serial port discovery and classification.

use crate::error::{Error, Result};

#[cfg(feature = "native")]
use {
    crate::port::{NativePortEnumerator, PortEnumerator},
    log::{debug, info, trace},
};

/// USB bridges commonly found between a host and a CC32xx board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DeviceKind {
    /// TI XDS110 debug probe on LaunchPad boards.
    Xds110,
    /// FTDI-based TI CC3200 LaunchPad.
    Cc3200LaunchPad,
    /// FTDI FT232/FT2232/FT4232.
    Ftdi,
    /// Silicon Labs CP210x.
    Cp210x,
    /// WCH CH340/CH341.
    Ch340,
    /// Anything else.
    Unknown,
}

/// Known USB VID/PID pairs. An empty PID list matches any PID.
const KNOWN_USB_DEVICES: &[(u16, &[u16], DeviceKind)] = &[
    (0x0451, &[0xBEF3], DeviceKind::Xds110),
    (0x0451, &[0xC32A], DeviceKind::Cc3200LaunchPad),
    (
        0x0403,
        &[0x6001, 0x6010, 0x6011, 0x6014, 0x6015],
        DeviceKind::Ftdi,
    ),
    (0x10C4, &[0xEA60, 0xEA70, 0xEA71], DeviceKind::Cp210x),
    (0x1A86, &[0x7523, 0x7522, 0x5523], DeviceKind::Ch340),
];

impl DeviceKind {
    /// Classify a USB VID/PID pair.
    #[must_use]
    pub fn from_vid_pid(vid: u16, pid: u16) -> Self {
        KNOWN_USB_DEVICES
            .iter()
            .find(|(v, pids, _)| *v == vid && (pids.is_empty() || pids.contains(&pid)))
            .map_or(Self::Unknown, |(_, _, kind)| *kind)
    }

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Xds110 => "TI XDS110",
            Self::Cc3200LaunchPad => "TI CC3200 LaunchPad",
            Self::Ftdi => "FTDI",
            Self::Cp210x => "CP210x",
            Self::Ch340 => "CH340/CH341",
            Self::Unknown => "Unknown",
        }
    }

    /// Whether the VID/PID was recognised.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// TI boards, which are preferred during auto-selection.
    pub fn is_ti(&self) -> bool {
        matches!(self, Self::Xds110 | Self::Cc3200LaunchPad)
    }
}

/// A discovered serial port.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DetectedPort {
    /// Port name (e.g. "/dev/ttyACM0" or "COM3").
    pub name: String,
    /// Classified bridge.
    pub device: DeviceKind,
    /// USB Vendor ID (if available).
    pub vid: Option<u16>,
    /// USB Product ID (if available).
    pub pid: Option<u16>,
    /// Product string (if available).
    pub product: Option<String>,
}

/// Enumerate serial ports with their classification.
#[cfg(feature = "native")]
pub fn detect_ports() -> Vec<DetectedPort> {
    match NativePortEnumerator::list_ports() {
        Ok(ports) => ports
            .into_iter()
            .map(|p| {
                let device = match (p.vid, p.pid) {
                    (Some(vid), Some(pid)) => DeviceKind::from_vid_pid(vid, pid),
                    _ => DeviceKind::Unknown,
                };
                trace!("Found port {} ({device:?})", p.name);
                DetectedPort {
                    name: p.name,
                    device,
                    vid: p.vid,
                    pid: p.pid,
                    product: p.product,
                }
            })
            .collect(),
        Err(e) => {
            debug!("Failed to enumerate serial ports: {e}");
            Vec::new()
        },
    }
}

/// Enumerate serial ports (always empty without the `native` feature).
#[cfg(not(feature = "native"))]
pub fn detect_ports() -> Vec<DetectedPort> {
    Vec::new()
}

/// Pick the most likely board port: TI boards first, then known bridges,
/// then whatever comes first.
pub fn select_port(ports: &[DetectedPort]) -> Result<DetectedPort> {
    ports
        .iter()
        .find(|p| p.device.is_ti())
        .or_else(|| {
            ports
                .iter()
                .find(|p| p.device.is_known())
        })
        .or_else(|| ports.first())
        .cloned()
        .ok_or(Error::DeviceNotFound)
}

/// Auto-detect a single board port.
#[cfg(feature = "native")]
pub fn auto_detect_port() -> Result<DetectedPort> {
    let port = select_port(&detect_ports())?;
    info!("Auto-detected {} on {}", port.device.name(), port.name);
    Ok(port)
}

/// Auto-detect a single board port (unavailable without the `native` feature).
#[cfg(not(feature = "native"))]
pub fn auto_detect_port() -> Result<DetectedPort> {
    Err(Error::Unsupported(
        "port auto-detection requires the native feature".to_string(),
    ))
}

/// One display line per port.
pub fn format_port_list(ports: &[DetectedPort]) -> Vec<String> {
    ports
        .iter()
        .map(|port| {
            let kind = if port.device.is_known() {
                format!(" [{}]", port.device.name())
            } else if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
                format!(" [VID:{vid:04X} PID:{pid:04X}]")
            } else {
                String::new()
            };
            let product = port
                .product
                .as_ref()
                .map(|p| format!(" - {p}"))
                .unwrap_or_default();
            format!("{}{kind}{product}", port.name)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str, device: DeviceKind) -> DetectedPort {
        DetectedPort {
            name: name.to_string(),
            device,
            vid: None,
            pid: None,
            product: None,
        }
    }

    #[test]
    fn test_device_kind_from_vid_pid() {
        assert_eq!(DeviceKind::from_vid_pid(0x0451, 0xBEF3), DeviceKind::Xds110);
        assert_eq!(
            DeviceKind::from_vid_pid(0x0451, 0xC32A),
            DeviceKind::Cc3200LaunchPad
        );
        assert_eq!(DeviceKind::from_vid_pid(0x0403, 0x6010), DeviceKind::Ftdi);
        assert_eq!(DeviceKind::from_vid_pid(0x10C4, 0xEA60), DeviceKind::Cp210x);
        assert_eq!(DeviceKind::from_vid_pid(0x1A86, 0x7523), DeviceKind::Ch340);
        assert_eq!(DeviceKind::from_vid_pid(0x0451, 0x1234), DeviceKind::Unknown);
    }

    #[test]
    fn test_select_port_prefers_ti() {
        let ports = vec![
            port("/dev/ttyS0", DeviceKind::Unknown),
            port("/dev/ttyUSB0", DeviceKind::Ftdi),
            port("/dev/ttyACM0", DeviceKind::Xds110),
        ];
        assert_eq!(select_port(&ports).unwrap().name, "/dev/ttyACM0");
        assert_eq!(select_port(&ports[..2]).unwrap().name, "/dev/ttyUSB0");
        assert_eq!(select_port(&ports[..1]).unwrap().name, "/dev/ttyS0");
        assert!(matches!(select_port(&[]), Err(Error::DeviceNotFound)));
    }

    #[test]
    fn test_format_port_list() {
        let mut xds = port("/dev/ttyACM0", DeviceKind::Xds110);
        xds.product = Some("XDS110".to_string());
        let mut other = port("/dev/ttyUSB1", DeviceKind::Unknown);
        other.vid = Some(0x1234);
        other.pid = Some(0x5678);

        let lines = format_port_list(&[xds, other]);
        assert_eq!(lines[0], "/dev/ttyACM0 [TI XDS110] - XDS110");
        assert_eq!(lines[1], "/dev/ttyUSB1 [VID:1234 PID:5678]");
    }
}
