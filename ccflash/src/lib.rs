//! # ccflash
//!
//! A library for flashing TI SimpleLink CC3200/CC32xx chips through their
//! UART boot ROM.
//!
//! This crate provides:
//!
//! - The length/checksum packet transport with ACK handshake
//! - Break-based boot loader synchronization and the CC3200 NWP handover
//! - The ROM command/status protocol (version, storage, format, erase, raw
//!   storage access)
//! - Chunked SLFS file upload with signatures and fail-safe allocation
//! - Flashing order for firmware bundles
//! - A SLIP codec for escape-framed links
//!
//! ## Supported Chips
//!
//! - CC3200 (primary loader plus NWP loader)
//! - CC3220R / CC3220S / CC3220SF and other CC32xx parts
//!
//! ## Features
//!
//! - `native` (default): Native serial port support
//! - `serde`: Serialization support for reports
//!
//! ## Example
//!
//! ```rust,no_run
//! use ccflash::{ChipFamily, ConnectConfig, MemoryCatalog, PartInfo, PartType, SerialConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut catalog = MemoryCatalog::new();
//!     catalog.add(
//!         PartInfo::new("/sys/mcuimg.bin", PartType::BootLoader),
//!         std::fs::read("mcuimg.bin")?,
//!     );
//!
//!     #[cfg(feature = "native")]
//!     {
//!         let config = SerialConfig::new("/dev/ttyUSB0", 921600);
//!         let mut flasher = ChipFamily::Cc3200.create_flasher(&config, ConnectConfig::default())?;
//!         flasher.connect()?;
//!         flasher.flash_catalog(&catalog, &mut |name, current, total| {
//!             println!("Flashing {}: {}/{}", name, current, total);
//!         })?;
//!         flasher.close();
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod device;
pub mod error;
pub mod image;
pub mod port;
pub mod protocol;
pub mod target;

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    device::{ControlGuard, DetectedPort, DeviceControl, DeviceKind, auto_detect_port, detect_ports},
    error::{Error, ErrorKind, Result},
    image::part::{
        FilePart, MemoryCatalog, PartCatalog, PartInfo, PartType, SIGNATURE_LEN, sort_parts,
    },
    port::{Port, PortEnumerator, PortInfo, SerialConfig},
    protocol::{Command, Status, StorageBitmap, VersionInfo},
    target::{
        ChipFamily, ChipType, ConnectConfig, DeviceReport, Flasher, LinkState, RomClient,
        RomFlasher, Session, Timeouts,
    },
};
