//! Chip family profiles.
//!
//! The CC3200 and CC32xx boot ROMs speak the same packet protocol but differ
//! in which commands they implement, the byte order of the version response,
//! how quickly they answer a break, and whether the primary boot loader must
//! hand the UART over to the network processor before SLFS can be written.
//! One [`RomClient`](super::RomClient) drives both, parameterised by
//! [`ChipFamily`].

use {
    crate::{
        error::{Error, Result},
        image::part::PartCatalog,
        protocol::{Command, DeviceInfo, Endianness, MacAddress, StorageBitmap, VersionInfo},
        target::negotiate::{ConnectConfig, LinkState},
    },
    std::{fmt, time::Duration},
};

#[cfg(feature = "native")]
use crate::port::SerialConfig;

/// Boot loader version reported by the NWP loader embedded in a CC3200.
///
/// A CC3200 answering with this version is already talking through the NWP.
pub const CC3200_NWP_BOOTLOADER: u32 = 0x0200_0400;

/// Oldest CC3200 primary boot loader that can hand over to the NWP.
pub const CC3200_MIN_BOOTLOADER: u32 = 0x0201_0400;

/// Boot loader versions above this with discriminant 0x10 are CC3220 parts.
const CC3220_BOOTLOADER_THRESHOLD: u32 = 0x0300_0000;

/// Opcodes implemented by the CC3200 ROM.
const CC3200_COMMANDS: &[Command] = &[
    Command::StartUpload,
    Command::FinishUpload,
    Command::GetStatus,
    Command::UploadChunk,
    Command::GetStorageList,
    Command::FormatSlfs,
    Command::EraseFile,
    Command::GetVersionInfo,
    Command::SwitchUartToAppsMcu,
];

/// Attached silicon, as classified from the version response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ChipType {
    /// CC3200.
    Cc3200,
    /// CC3220R.
    Cc3220,
    /// CC3220S (secure).
    Cc3220S,
    /// CC3220SF (secure, internal flash).
    Cc3220SF,
}

impl ChipType {
    /// Classify from the chip discriminant and boot loader version.
    ///
    /// 0x10 is shared by CC3200 and CC3220; only the boot loader version tells
    /// them apart.
    pub fn classify(discriminant: u8, bootloader: u32) -> Result<Self> {
        match discriminant {
            0x10 if bootloader > CC3220_BOOTLOADER_THRESHOLD => Ok(Self::Cc3220),
            0x10 => Ok(Self::Cc3200),
            0x18 => Ok(Self::Cc3220S),
            0x19 => Ok(Self::Cc3220SF),
            other => Err(Error::UnknownChip(other)),
        }
    }

    /// Family whose ROM protocol this chip speaks.
    pub fn family(self) -> ChipFamily {
        match self {
            Self::Cc3200 => ChipFamily::Cc3200,
            Self::Cc3220 | Self::Cc3220S | Self::Cc3220SF => ChipFamily::Cc32xx,
        }
    }
}

impl fmt::Display for ChipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cc3200 => write!(f, "CC3200"),
            Self::Cc3220 => write!(f, "CC3220"),
            Self::Cc3220S => write!(f, "CC3220S"),
            Self::Cc3220SF => write!(f, "CC3220SF"),
        }
    }
}

/// Supported chip families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChipFamily {
    /// CC3200 (primary loader on the apps MCU, NWP loader behind it).
    #[default]
    Cc3200,
    /// CC3220/CC3220S/CC3220SF and relatives.
    Cc32xx,
}

impl ChipFamily {
    /// Byte order of the version response.
    pub fn version_byte_order(self) -> Endianness {
        match self {
            Self::Cc3200 => Endianness::Little,
            Self::Cc32xx => Endianness::Big,
        }
    }

    /// Whether the ROM implements `command`.
    pub fn supports(self, command: Command) -> bool {
        match self {
            Self::Cc3200 => CC3200_COMMANDS.contains(&command),
            Self::Cc32xx => true,
        }
    }

    /// Read timeout while waiting for the break ACK.
    pub fn connect_read_timeout(self) -> Duration {
        match self {
            Self::Cc3200 => Duration::from_millis(200),
            Self::Cc32xx => Duration::from_millis(1000),
        }
    }

    /// Whether this version response comes from a primary loader that must
    /// hand the UART over to the NWP loader.
    pub fn needs_handover(self, version: &VersionInfo) -> bool {
        match self {
            Self::Cc3200 => {
                version.discriminant & 0x10 != 0 && version.bootloader != CC3200_NWP_BOOTLOADER
            },
            Self::Cc32xx => false,
        }
    }

    /// Oldest primary boot loader this family can work with.
    pub fn min_bootloader(self) -> Option<u32> {
        match self {
            Self::Cc3200 => Some(CC3200_MIN_BOOTLOADER),
            Self::Cc32xx => None,
        }
    }

    /// Classify the attached chip from a version response.
    ///
    /// The CC3200 ROM only guarantees the 0x10 bit of the discriminant.
    pub fn classify(self, version: &VersionInfo) -> Result<ChipType> {
        match self {
            Self::Cc3200 if version.discriminant & 0x10 != 0 => Ok(ChipType::Cc3200),
            Self::Cc3200 => Err(Error::UnknownChip(version.discriminant)),
            Self::Cc32xx => version.chip(),
        }
    }

    /// Get the chip family from a string name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name
            .to_lowercase()
            .as_str()
        {
            "cc3200" | "cc3100" => Some(Self::Cc3200),
            "cc32xx" | "cc3220" | "cc3220s" | "cc3220sf" | "cc3235" | "cc3235s" | "cc3235sf" => {
                Some(Self::Cc32xx)
            },
            _ => None,
        }
    }
}

impl fmt::Display for ChipFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cc3200 => write!(f, "CC3200"),
            Self::Cc32xx => write!(f, "CC32xx"),
        }
    }
}

/// What a connected boot loader reports about the device.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DeviceReport {
    /// Classified chip.
    pub chip: ChipType,
    /// Version response of the loader in use.
    pub version: VersionInfo,
    /// Version response of the primary loader, if a handover took place.
    pub primary_version: Option<VersionInfo>,
    /// Available storage.
    pub storage: StorageBitmap,
    /// Factory MAC address, if the ROM can report it.
    pub mac: Option<MacAddress>,
    /// Filesystem geometry, if the ROM can report it.
    pub device_info: Option<DeviceInfo>,
}

/// Trait for flashing operations across all chip families.
///
/// This trait provides a unified interface for flashing firmware,
/// allowing the CLI to work with any chip family through a common API.
pub trait Flasher {
    /// Negotiate a session with the boot loader.
    fn connect(&mut self) -> Result<()>;

    /// Link state of the current session.
    fn state(&self) -> LinkState;

    /// Query the connected boot loader.
    fn info(&mut self) -> Result<DeviceReport>;

    /// Upload every part of `catalog`, in flashing order.
    ///
    /// # Arguments
    ///
    /// * `catalog` - Source of parts and their payloads
    /// * `progress` - Progress callback (part_name, current_bytes, total_bytes)
    fn flash_catalog(
        &mut self,
        catalog: &dyn PartCatalog,
        progress: &mut dyn FnMut(&str, usize, usize),
    ) -> Result<()>;

    /// Format SLFS to `size` bytes.
    fn format(&mut self, size: u32) -> Result<()>;

    /// Delete one file from SLFS.
    fn erase_file(&mut self, name: &str) -> Result<()>;

    /// Release the reset lines so the firmware boots.
    fn boot_firmware(&mut self) -> Result<()>;

    /// Close the flasher and release resources.
    ///
    /// Safe to call more than once. After calling this method every
    /// operation fails.
    fn close(&mut self);
}

impl ChipFamily {
    /// Create a flasher instance for this chip family (native platforms).
    ///
    /// This is the main entry point for creating chip-specific flashers.
    #[cfg(feature = "native")]
    pub fn create_flasher(
        &self,
        config: &SerialConfig,
        connect: ConnectConfig,
    ) -> Result<Box<dyn Flasher>> {
        let port = crate::port::NativePort::open(config)?;
        Ok(Box::new(
            super::flasher::RomFlasher::new(port, *self).with_connect_config(connect),
        ))
    }
}
