//! Typed decoders for boot ROM responses.
//!
//! Field order is fixed by the ROM. Version info is the one structure whose
//! byte order depends on the ROM generation (little-endian on CC3200,
//! big-endian on CC32xx); everything else is big-endian.

use {
    crate::{
        error::{Error, Result},
        protocol::command::Command,
        target::chip::ChipType,
    },
    byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt},
    std::{fmt, io::Cursor},
};

/// Byte order of multi-byte response fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

impl Endianness {
    fn read_u32(self, bytes: &[u8]) -> u32 {
        match self {
            Self::Little => LittleEndian::read_u32(bytes),
            Self::Big => BigEndian::read_u32(bytes),
        }
    }
}

fn malformed(command: Command, reason: impl Into<String>) -> Error {
    Error::MalformedResponse {
        command,
        reason: reason.into(),
    }
}

fn require_len(command: Command, bytes: &[u8], min: usize) -> Result<()> {
    if bytes.len() < min {
        return Err(malformed(
            command,
            format!("expected at least {min} bytes, got {}", bytes.len()),
        ));
    }
    Ok(())
}

/// Format a packed version word as dotted decimal, most significant byte first.
pub fn format_version(version: u32) -> String {
    let [a, b, c, d] = version.to_be_bytes();
    format!("{a}.{b}.{c}.{d}")
}

/// Response to `GetVersionInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct VersionInfo {
    /// Boot loader version.
    pub bootloader: u32,
    /// Network processor firmware version.
    pub nwp: u32,
    /// MAC layer version.
    pub mac: u32,
    /// PHY version.
    pub phy: u32,
    /// Raw chip type word.
    pub chip_type: u32,
    /// First byte of the chip type field as sent on the wire.
    pub discriminant: u8,
}

impl VersionInfo {
    /// Minimum number of bytes in a version response.
    pub const MIN_LEN: usize = 20;

    /// Decode a version response in the given byte order.
    ///
    /// The ROM sends a few trailing bytes past the five words; they are ignored.
    pub fn decode(bytes: &[u8], order: Endianness) -> Result<Self> {
        require_len(Command::GetVersionInfo, bytes, Self::MIN_LEN)?;
        Ok(Self {
            bootloader: order.read_u32(&bytes[0..4]),
            nwp: order.read_u32(&bytes[4..8]),
            mac: order.read_u32(&bytes[8..12]),
            phy: order.read_u32(&bytes[12..16]),
            chip_type: order.read_u32(&bytes[16..20]),
            discriminant: bytes[16],
        })
    }

    /// Classify the attached silicon.
    pub fn chip(&self) -> Result<ChipType> {
        ChipType::classify(self.discriminant, self.bootloader)
    }

    /// Boot loader version as dotted decimal.
    pub fn bootloader_version_string(&self) -> String {
        format_version(self.bootloader)
    }
}

/// Bitmap of storage backends reported by `GetStorageList`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StorageBitmap(pub u8);

impl StorageBitmap {
    /// Internal flash.
    pub const FLASH: u8 = 0x02;
    /// External serial flash.
    pub const SFLASH: u8 = 0x04;
    /// RAM.
    pub const RAM: u8 = 0x80;

    /// Raw bitmap.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Whether all bits of `mask` are set.
    pub fn contains(self, mask: u8) -> bool {
        self.0 & mask == mask
    }

    /// Serial flash and RAM are both required for uploads.
    pub fn is_usable(self) -> bool {
        self.contains(Self::SFLASH | Self::RAM)
    }
}

impl fmt::Display for StorageBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)?;
        let names: Vec<&str> = [
            (Self::FLASH, "flash"),
            (Self::SFLASH, "sflash"),
            (Self::RAM, "ram"),
        ]
        .into_iter()
        .filter(|(bit, _)| self.contains(*bit))
        .map(|(_, name)| name)
        .collect();
        if !names.is_empty() {
            write!(f, " ({})", names.join(", "))?;
        }
        Ok(())
    }
}

/// Storage device selector for raw storage commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum StorageId {
    /// RAM.
    Ram = 0,
    /// Internal flash.
    Flash = 1,
    /// External serial flash.
    SFlash = 2,
}

impl StorageId {
    /// Wire value.
    pub fn id(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ram => "RAM",
            Self::Flash => "Flash",
            Self::SFlash => "SFlash",
        })
    }
}

/// Response to `GetStorageInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StorageInfo {
    /// Erase block size in bytes.
    pub block_size: u16,
    /// Number of blocks.
    pub num_blocks: u16,
    /// Reserved word.
    pub reserved: u32,
}

impl StorageInfo {
    /// Decode a storage info response.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        require_len(Command::GetStorageInfo, bytes, 8)?;
        let mut cursor = Cursor::new(bytes);
        Ok(Self {
            block_size: cursor.read_u16::<BigEndian>()?,
            num_blocks: cursor.read_u16::<BigEndian>()?,
            reserved: cursor.read_u32::<BigEndian>()?,
        })
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> u64 {
        u64::from(self.block_size) * u64::from(self.num_blocks)
    }
}

/// Response to `GetDeviceInfo`.
///
/// Only the filesystem geometry and free block count are understood; the
/// remaining words are kept as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DeviceInfo {
    /// SLFS block size.
    pub fs_block_size: u16,
    /// SLFS block count.
    pub fs_num_blocks: u16,
    /// Unknown.
    pub unknown04: u16,
    /// Unknown.
    pub unknown06: u16,
    /// Unknown.
    pub unknown08: u16,
    /// Unknown, looks like a free size.
    pub fs_unknown_free_size: u16,
    /// Free SLFS blocks.
    pub fs_free_blocks: u16,
}

impl DeviceInfo {
    /// Decode a device info response.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        require_len(Command::GetDeviceInfo, bytes, 14)?;
        let mut cursor = Cursor::new(bytes);
        Ok(Self {
            fs_block_size: cursor.read_u16::<BigEndian>()?,
            fs_num_blocks: cursor.read_u16::<BigEndian>()?,
            unknown04: cursor.read_u16::<BigEndian>()?,
            unknown06: cursor.read_u16::<BigEndian>()?,
            unknown08: cursor.read_u16::<BigEndian>()?,
            fs_unknown_free_size: cursor.read_u16::<BigEndian>()?,
            fs_free_blocks: cursor.read_u16::<BigEndian>()?,
        })
    }

    /// Free filesystem space in bytes.
    pub fn free_bytes(&self) -> u64 {
        u64::from(self.fs_block_size) * u64::from(self.fs_free_blocks)
    }
}

/// Factory MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Decode a MAC address response.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        require_len(Command::GetMacAddress, bytes, 6)?;
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&bytes[..6]);
        Ok(Self(mac))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Captured from a CC3220SF: boot loader 3.0.1.0, chip type 0x19.
    const CC3220SF_VERSION: [u8; 28] = [
        0x03, 0x00, 0x01, 0x00, //
        0x02, 0x00, 0x00, 0x00, //
        0x01, 0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, 0x00, //
        0x19, 0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn test_version_info_big_endian() {
        let vi = VersionInfo::decode(&CC3220SF_VERSION, Endianness::Big).unwrap();
        assert_eq!(vi.bootloader, 0x03000100);
        assert_eq!(vi.nwp, 0x02000000);
        assert_eq!(vi.chip_type, 0x19000000);
        assert_eq!(vi.discriminant, 0x19);
        assert_eq!(vi.bootloader_version_string(), "3.0.1.0");
        assert_eq!(vi.chip().unwrap(), ChipType::Cc3220SF);
    }

    #[test]
    fn test_version_info_little_endian() {
        let bytes = [
            0x00, 0x04, 0x01, 0x02, //
            0x00, 0x00, 0x00, 0x00, //
            0x00, 0x00, 0x00, 0x00, //
            0x00, 0x00, 0x00, 0x00, //
            0x10, 0x00, 0x00, 0x00,
        ];
        let vi = VersionInfo::decode(&bytes, Endianness::Little).unwrap();
        assert_eq!(vi.bootloader, 0x02010400);
        assert_eq!(vi.chip_type, 0x10);
        assert_eq!(vi.discriminant, 0x10);
        assert_eq!(vi.bootloader_version_string(), "2.1.4.0");
        assert_eq!(vi.chip().unwrap(), ChipType::Cc3200);
    }

    #[test]
    fn test_version_info_too_short() {
        let err = VersionInfo::decode(&[0u8; 19], Endianness::Big).unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedResponse {
                command: Command::GetVersionInfo,
                ..
            }
        ));
    }

    #[test]
    fn test_storage_bitmap() {
        assert!(StorageBitmap(0x84).is_usable());
        assert!(StorageBitmap(0x86).is_usable());
        assert!(!StorageBitmap(0x04).is_usable());
        assert!(!StorageBitmap(0x82).is_usable());
        assert_eq!(StorageBitmap(0x86).to_string(), "0x86 (flash, sflash, ram)");
        assert_eq!(StorageBitmap(0x00).to_string(), "0x00");
    }

    #[test]
    fn test_storage_info_decode() {
        let si = StorageInfo::decode(&[0x10, 0x00, 0x01, 0x00, 0, 0, 0, 0]).unwrap();
        assert_eq!(si.block_size, 0x1000);
        assert_eq!(si.num_blocks, 0x100);
        assert_eq!(si.capacity(), 1 << 20);
        assert!(StorageInfo::decode(&[0x10, 0x00]).is_err());
    }

    #[test]
    fn test_device_info_decode() {
        // 1000 0400 0178 000b 0016 0254 0267 ...
        let bytes = [
            0x10, 0x00, 0x04, 0x00, 0x01, 0x78, 0x00, 0x0b, 0x00, 0x16, 0x02, 0x54, 0x02, 0x67,
            0x00, 0x00,
        ];
        let di = DeviceInfo::decode(&bytes).unwrap();
        assert_eq!(di.fs_block_size, 0x1000);
        assert_eq!(di.fs_num_blocks, 0x400);
        assert_eq!(di.fs_free_blocks, 0x267);
        assert_eq!(di.free_bytes(), 0x1000 * 0x267);
    }

    #[test]
    fn test_mac_address() {
        let mac = MacAddress::decode(&[0xd0, 0x5f, 0xb8, 0x01, 0x02, 0xab]).unwrap();
        assert_eq!(mac.to_string(), "d0:5f:b8:01:02:ab");
        assert!(MacAddress::decode(&[0; 5]).is_err());
    }
}
