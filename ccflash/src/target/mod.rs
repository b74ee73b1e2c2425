//! Boot ROM targets.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Flasher (RomFlasher)                         │
//! ├──────────────────────────────────────────────┤
//! │ Negotiator / Session                         │  break sync, NWP handover
//! ├──────────────────────────────────────────────┤
//! │ RomClient (+ upload)                         │  command/status, SLFS files
//! ├──────────────────────────────────────────────┤
//! │ Transport                                    │  length/checksum packets
//! └──────────────────────────────────────────────┘
//! ```

pub mod chip;
pub mod flasher;
pub mod negotiate;
pub mod rom;
pub mod upload;

pub use {
    chip::{ChipFamily, ChipType, DeviceReport, Flasher},
    flasher::RomFlasher,
    negotiate::{ConnectConfig, LinkInfo, LinkState, Negotiator, Session},
    rom::{RomClient, Timeouts},
    upload::{OpenFlags, UploadEncoding, choose_block_encoding, open_flags},
};
