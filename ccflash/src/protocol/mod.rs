//! Wire protocol implementations.

pub mod command;
pub mod packet;
pub mod response;
pub mod slip;
pub mod transport;

// Re-export common types
pub use {
    command::{Command, Status},
    packet::{ACK, checksum},
    response::{
        DeviceInfo, Endianness, MacAddress, StorageBitmap, StorageId, StorageInfo, VersionInfo,
    },
    slip::SlipDecoder,
    transport::Transport,
};
