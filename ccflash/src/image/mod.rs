//! Firmware image handling.

pub mod part;

pub use part::{
    BOOT_IMAGE_NAME, FilePart, MemoryCatalog, PartCatalog, PartInfo, PartType, SERVICE_PACK_NAME,
    SIGNATURE_LEN, sort_parts,
};
