//! Boot ROM command opcodes and status codes.
//!
//! Every request is a single opcode byte followed by opaque argument bytes,
//! wrapped in a [`packet`](super::packet). Mutating commands carry no response
//! payload; their outcome is fetched with a follow-up [`Command::GetStatus`].

use std::fmt;

/// Boot ROM command opcodes.
///
/// Not every family implements every opcode; see
/// [`ChipFamily::supports`](crate::target::ChipFamily::supports).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Open a file on SLFS for writing.
    StartUpload = 0x21,
    /// Close the file opened by `StartUpload`, optionally with a signature.
    FinishUpload = 0x22,
    /// Fetch the status of the previous command.
    GetStatus = 0x23,
    /// Write a chunk of the open file.
    UploadChunk = 0x24,
    /// Fetch the storage bitmap (answered with a raw byte, not a packet).
    GetStorageList = 0x27,
    /// Format the SLFS filesystem.
    FormatSlfs = 0x28,
    /// Write raw bytes to a storage device.
    RawStorageWrite = 0x2D,
    /// Delete a file from SLFS.
    EraseFile = 0x2E,
    /// Fetch boot loader, NWP, MAC and PHY versions.
    GetVersionInfo = 0x2F,
    /// Erase raw blocks of a storage device.
    RawStorageErase = 0x30,
    /// Fetch the block geometry of a storage device.
    GetStorageInfo = 0x31,
    /// Jump to the code previously written to RAM.
    ExecuteFromRam = 0x32,
    /// Hand the UART over from the primary loader to the NWP loader.
    SwitchUartToAppsMcu = 0x33,
    /// Program a raw boot image.
    UploadImage = 0x34,
    /// Fetch filesystem geometry and free space.
    GetDeviceInfo = 0x37,
    /// Fetch the factory MAC address.
    GetMacAddress = 0x3A,
}

impl Command {
    /// All known opcodes.
    pub const ALL: [Self; 16] = [
        Self::StartUpload,
        Self::FinishUpload,
        Self::GetStatus,
        Self::UploadChunk,
        Self::GetStorageList,
        Self::FormatSlfs,
        Self::RawStorageWrite,
        Self::EraseFile,
        Self::GetVersionInfo,
        Self::RawStorageErase,
        Self::GetStorageInfo,
        Self::ExecuteFromRam,
        Self::SwitchUartToAppsMcu,
        Self::UploadImage,
        Self::GetDeviceInfo,
        Self::GetMacAddress,
    ];

    /// Opcode byte on the wire.
    pub fn opcode(self) -> u8 {
        self as u8
    }

    /// Look up a command by opcode.
    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.opcode() == byte)
    }

    /// Command name.
    pub fn name(self) -> &'static str {
        match self {
            Self::StartUpload => "StartUpload",
            Self::FinishUpload => "FinishUpload",
            Self::GetStatus => "GetStatus",
            Self::UploadChunk => "UploadChunk",
            Self::GetStorageList => "GetStorageList",
            Self::FormatSlfs => "FormatSLFS",
            Self::RawStorageWrite => "RawStorageWrite",
            Self::EraseFile => "EraseFile",
            Self::GetVersionInfo => "GetVersionInfo",
            Self::RawStorageErase => "RawStorageErase",
            Self::GetStorageInfo => "GetStorageInfo",
            Self::ExecuteFromRam => "ExecuteFromRAM",
            Self::SwitchUartToAppsMcu => "SwitchUARTtoAppsMCU",
            Self::UploadImage => "UploadImage",
            Self::GetDeviceInfo => "GetDeviceInfo",
            Self::GetMacAddress => "GetMACAddress",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:#x})", self.name(), self.opcode())
    }
}

/// Status reported by `GetStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    /// Previous command succeeded.
    Ok = 0x40,
    /// Opcode not recognised.
    UnknownCommand = 0x41,
    /// Opcode recognised but arguments rejected.
    InvalidCommand = 0x42,
    /// Address out of range.
    InvalidAddress = 0x43,
    /// Flash operation failed.
    FlashFail = 0x44,
}

impl Status {
    /// Decode a status byte. Unknown values are not coerced.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x40 => Some(Self::Ok),
            0x41 => Some(Self::UnknownCommand),
            0x42 => Some(Self::InvalidCommand),
            0x43 => Some(Self::InvalidAddress),
            0x44 => Some(Self::FlashFail),
            _ => None,
        }
    }

    /// Status byte on the wire.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Whether this is [`Status::Ok`].
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "ok",
            Self::UnknownCommand => "unknown command",
            Self::InvalidCommand => "invalid command",
            Self::InvalidAddress => "invalid address",
            Self::FlashFail => "flash failure",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_display() {
        assert_eq!(Command::UploadChunk.to_string(), "UploadChunk(0x24)");
        assert_eq!(Command::GetVersionInfo.to_string(), "GetVersionInfo(0x2f)");
        assert_eq!(
            Command::SwitchUartToAppsMcu.to_string(),
            "SwitchUARTtoAppsMCU(0x33)"
        );
    }

    #[test]
    fn test_command_from_byte() {
        for cmd in Command::ALL {
            assert_eq!(Command::from_byte(cmd.opcode()), Some(cmd));
        }
        assert_eq!(Command::from_byte(0x25), None);
    }

    #[test]
    fn test_status_from_byte() {
        assert_eq!(Status::from_byte(0x40), Some(Status::Ok));
        assert_eq!(Status::from_byte(0x44), Some(Status::FlashFail));
        assert_eq!(Status::from_byte(0x45), None);
        assert_eq!(Status::from_byte(0x00), None);
        assert!(Status::Ok.is_ok());
        assert!(!Status::InvalidAddress.is_ok());
        assert_eq!(Status::InvalidCommand.code(), 0x42);
    }
}
