//! Firmware parts and the order they are flashed in.
//!
//! A firmware bundle is a set of named parts, each destined for one SLFS file.
//! Parts are written strictly in this order:
//!
//! 1. the service pack,
//! 2. the boot image,
//! 3. boot configuration parts,
//! 4. application parts,
//! 5. filesystem containers,
//! 6. everything else.
//!
//! Ties are broken by name. Writing application or filesystem parts before
//! the boot image and its configuration can leave the device unbootable if
//! the run is interrupted.

use {
    crate::error::{Error, Result},
    std::{cmp::Ordering, fmt},
};

/// SLFS name of the NWP service pack.
pub const SERVICE_PACK_NAME: &str = "/sys/servicepack.ucf";

/// SLFS name of the application boot image.
pub const BOOT_IMAGE_NAME: &str = "/sys/mcuimg.bin";

/// Required length of a file signature.
pub const SIGNATURE_LEN: usize = 0x100;

/// Part type, as tagged in the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PartType {
    /// NWP service pack (`servicepack`).
    ServicePack,
    /// Boot image (`boot`).
    BootLoader,
    /// Boot configuration (`boot_cfg`).
    BootLoaderConfig,
    /// Application image (`app`).
    App,
    /// Filesystem container (`fs`).
    FsContainer,
    /// Plain SLFS file (`slfile`).
    SlFile,
    /// Certificate (`cert`).
    Certificate,
    /// CA bundle (`cabundle`).
    CaBundle,
    /// SimpleLink configuration (`slconfig`).
    SlConfig,
    /// Any other tag.
    Other(String),
}

impl PartType {
    /// Parse a bundle type tag. Unknown tags are kept verbatim.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "servicepack" => Self::ServicePack,
            "boot" => Self::BootLoader,
            "boot_cfg" => Self::BootLoaderConfig,
            "app" => Self::App,
            "fs" => Self::FsContainer,
            "slfile" => Self::SlFile,
            "cert" => Self::Certificate,
            "cabundle" => Self::CaBundle,
            "slconfig" => Self::SlConfig,
            other => Self::Other(other.to_string()),
        }
    }

    /// Bundle type tag.
    pub fn tag(&self) -> &str {
        match self {
            Self::ServicePack => "servicepack",
            Self::BootLoader => "boot",
            Self::BootLoaderConfig => "boot_cfg",
            Self::App => "app",
            Self::FsContainer => "fs",
            Self::SlFile => "slfile",
            Self::Certificate => "cert",
            Self::CaBundle => "cabundle",
            Self::SlConfig => "slconfig",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for PartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Catalog entry describing one part, without its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartInfo {
    /// SLFS file name.
    pub name: String,
    /// Part type.
    pub part_type: PartType,
    /// Fixed allocation size; defaults to the payload length.
    pub alloc_size: Option<u32>,
    /// Open the file fail-safe (the ROM keeps the previous copy until commit).
    pub fail_safe: bool,
}

impl PartInfo {
    /// Create an entry with no allocation override.
    pub fn new(name: impl Into<String>, part_type: PartType) -> Self {
        Self {
            name: name.into(),
            part_type,
            alloc_size: None,
            fail_safe: false,
        }
    }

    /// Set a fixed allocation size.
    #[must_use]
    pub fn with_alloc_size(mut self, size: u32) -> Self {
        self.alloc_size = Some(size);
        self
    }

    /// Mark the part fail-safe.
    #[must_use]
    pub fn with_fail_safe(mut self, fail_safe: bool) -> Self {
        self.fail_safe = fail_safe;
        self
    }

    /// Position class in the flashing order (lower goes first).
    pub fn rank(&self) -> u8 {
        match &self.part_type {
            PartType::ServicePack => 0,
            _ if self.name == SERVICE_PACK_NAME => 0,
            PartType::BootLoader => 1,
            _ if self.name == BOOT_IMAGE_NAME => 1,
            PartType::BootLoaderConfig => 2,
            PartType::App => 3,
            PartType::FsContainer => 4,
            _ => 5,
        }
    }

    /// Flashing order: rank first, then name.
    pub fn flash_order(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| {
                self.name
                    .cmp(&other.name)
            })
    }
}

/// Sort parts into flashing order.
pub fn sort_parts(parts: &mut [PartInfo]) {
    parts.sort_by(PartInfo::flash_order);
}

/// Read-only source of parts.
///
/// Accessors may fail (missing source blob, bad checksum); such failures are
/// reported before any protocol bytes are sent for the part.
pub trait PartCatalog {
    /// All parts, in catalog order.
    fn parts(&self) -> Vec<PartInfo>;

    /// Payload of one part.
    fn payload(&self, part: &PartInfo) -> Result<Vec<u8>>;

    /// Signature of one part, if it is signed.
    fn signature(&self, part: &PartInfo) -> Result<Option<Vec<u8>>>;

    /// All parts, in flashing order.
    fn sorted_parts(&self) -> Vec<PartInfo> {
        let mut parts = self.parts();
        sort_parts(&mut parts);
        parts
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    info: PartInfo,
    data: Vec<u8>,
    signature: Option<Vec<u8>>,
}

/// Catalog held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    entries: Vec<MemoryEntry>,
}

impl MemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an unsigned part.
    pub fn add(&mut self, info: PartInfo, data: Vec<u8>) -> &mut Self {
        self.entries
            .push(MemoryEntry {
                info,
                data,
                signature: None,
            });
        self
    }

    /// Add a signed part.
    pub fn add_signed(&mut self, info: PartInfo, data: Vec<u8>, signature: Vec<u8>) -> &mut Self {
        self.entries
            .push(MemoryEntry {
                info,
                data,
                signature: Some(signature),
            });
        self
    }

    fn entry(&self, part: &PartInfo) -> Result<&MemoryEntry> {
        self.entries
            .iter()
            .find(|e| e.info.name == part.name)
            .ok_or_else(|| Error::InvalidPart {
                name: part
                    .name
                    .clone(),
                reason: "not in catalog".into(),
            })
    }
}

impl PartCatalog for MemoryCatalog {
    fn parts(&self) -> Vec<PartInfo> {
        self.entries
            .iter()
            .map(|e| {
                e.info
                    .clone()
            })
            .collect()
    }

    fn payload(&self, part: &PartInfo) -> Result<Vec<u8>> {
        Ok(self
            .entry(part)?
            .data
            .clone())
    }

    fn signature(&self, part: &PartInfo) -> Result<Option<Vec<u8>>> {
        Ok(self
            .entry(part)?
            .signature
            .clone())
    }
}

/// A part ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    /// SLFS file name.
    pub name: String,
    /// File contents.
    pub data: Vec<u8>,
    /// Fixed allocation size; defaults to the payload length.
    pub alloc_size: Option<u32>,
    /// Signature blob; must be [`SIGNATURE_LEN`] bytes when present.
    pub signature: Option<Vec<u8>>,
    /// Open the file fail-safe.
    pub fail_safe: bool,
}

impl FilePart {
    /// Create an unsigned part.
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
            alloc_size: None,
            signature: None,
            fail_safe: false,
        }
    }

    /// Set a fixed allocation size.
    #[must_use]
    pub fn with_alloc_size(mut self, size: u32) -> Self {
        self.alloc_size = Some(size);
        self
    }

    /// Attach a signature.
    #[must_use]
    pub fn with_signature(mut self, signature: Vec<u8>) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Mark the part fail-safe.
    #[must_use]
    pub fn with_fail_safe(mut self, fail_safe: bool) -> Self {
        self.fail_safe = fail_safe;
        self
    }

    /// Load a part's payload and signature from a catalog.
    ///
    /// Accessor failures become [`Error::InvalidPart`].
    pub fn load(catalog: &dyn PartCatalog, info: &PartInfo) -> Result<Self> {
        let to_part_error = |e: Error| match e {
            Error::InvalidPart { .. } => e,
            other => Error::InvalidPart {
                name: info
                    .name
                    .clone(),
                reason: other.to_string(),
            },
        };
        let data = catalog
            .payload(info)
            .map_err(to_part_error)?;
        let signature = catalog
            .signature(info)
            .map_err(to_part_error)?;
        Ok(Self {
            name: info
                .name
                .clone(),
            data,
            alloc_size: info.alloc_size,
            signature,
            fail_safe: info.fail_safe,
        })
    }

    /// Bytes to allocate on SLFS: the larger of the allocation size and the
    /// payload length.
    pub fn target_size(&self) -> usize {
        let alloc = self
            .alloc_size
            .map_or(0, |s| s as usize);
        alloc.max(
            self.data
                .len(),
        )
    }
}
