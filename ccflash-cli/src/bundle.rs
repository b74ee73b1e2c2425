//! Firmware bundle directories.
//!
//! A bundle is a directory holding `manifest.json` and the files it names:
//!
//! ```json
//! {
//!   "name": "demo",
//!   "version": "1.0",
//!   "parts": {
//!     "/sys/mcuimg.bin": { "type": "boot", "src": "mcuimg.bin", "alloc_size": 65536 },
//!     "/cert/ca.pem":    { "type": "cert", "src": "ca.pem", "signature": "ca.sig" }
//!   }
//! }
//! ```
//!
//! Part keys are SLFS file names. `size`, when present, must match the
//! source file.

use {
    crate::CliError,
    anyhow::Result,
    ccflash::{PartCatalog, PartInfo, PartType},
    serde::{Deserialize, Serialize},
    std::{
        collections::BTreeMap,
        fs,
        path::{Path, PathBuf},
    },
};

/// Manifest file name inside a bundle directory.
pub const MANIFEST_NAME: &str = "manifest.json";

/// One part entry of `manifest.json`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManifestPart {
    /// Part type tag.
    #[serde(rename = "type")]
    pub part_type: String,
    /// Payload file, relative to the bundle directory.
    pub src: Option<String>,
    /// Expected payload size.
    pub size: Option<u64>,
    /// SLFS allocation size, if larger than the payload.
    pub alloc_size: Option<u32>,
    /// Signature file, relative to the bundle directory.
    pub signature: Option<String>,
    /// Allocate the file fail-safe.
    #[serde(default)]
    pub fail_safe: bool,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    name: Option<String>,
    version: Option<String>,
    parts: BTreeMap<String, ManifestPart>,
}

/// A bundle directory read through its manifest.
#[derive(Debug)]
pub struct BundleCatalog {
    dir: PathBuf,
    /// Bundle name.
    pub name: Option<String>,
    /// Bundle version.
    pub version: Option<String>,
    parts: BTreeMap<String, ManifestPart>,
}

fn invalid_part(name: &str, reason: impl Into<String>) -> ccflash::Error {
    ccflash::Error::InvalidPart {
        name: name.to_string(),
        reason: reason.into(),
    }
}

impl BundleCatalog {
    /// Read `manifest.json` from `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_NAME);
        let content = fs::read_to_string(&path).map_err(|e| {
            CliError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let manifest: Manifest = serde_json::from_str(&content).map_err(|e| {
            CliError::Config(format!("Invalid manifest {}: {e}", path.display()))
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
            name: manifest.name,
            version: manifest.version,
            parts: manifest.parts,
        })
    }

    /// Manifest entry for a part.
    pub fn entry(&self, name: &str) -> Option<&ManifestPart> {
        self.parts
            .get(name)
    }

    fn source_path(&self, info: &PartInfo) -> ccflash::Result<PathBuf> {
        let entry = self
            .entry(&info.name)
            .ok_or_else(|| invalid_part(&info.name, "not in manifest"))?;
        let src = entry
            .src
            .as_ref()
            .ok_or_else(|| invalid_part(&info.name, "no src"))?;
        Ok(self
            .dir
            .join(src))
    }

    /// Payload size without reading the payload.
    pub fn payload_size(&self, info: &PartInfo) -> ccflash::Result<u64> {
        let path = self.source_path(info)?;
        Ok(fs::metadata(path)?.len())
    }
}

impl PartCatalog for BundleCatalog {
    fn parts(&self) -> Vec<PartInfo> {
        self.parts
            .iter()
            .map(|(name, p)| {
                let mut info = PartInfo::new(name.clone(), PartType::from_tag(&p.part_type))
                    .with_fail_safe(p.fail_safe);
                if let Some(size) = p.alloc_size {
                    info = info.with_alloc_size(size);
                }
                info
            })
            .collect()
    }

    fn payload(&self, info: &PartInfo) -> ccflash::Result<Vec<u8>> {
        let data = fs::read(self.source_path(info)?)?;
        if let Some(expected) = self
            .entry(&info.name)
            .and_then(|p| p.size)
        {
            if expected != data.len() as u64 {
                return Err(invalid_part(
                    &info.name,
                    format!("size mismatch: manifest says {expected}, file has {}", data.len()),
                ));
            }
        }
        Ok(data)
    }

    fn signature(&self, info: &PartInfo) -> ccflash::Result<Option<Vec<u8>>> {
        match self
            .entry(&info.name)
            .and_then(|p| p.signature.as_ref())
        {
            Some(sig) => Ok(Some(fs::read(
                self.dir
                    .join(sig),
            )?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, ccflash::FilePart, tempfile::TempDir};

    fn bundle(manifest: &str, files: &[(&str, &[u8])]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path()
                .join(MANIFEST_NAME),
            manifest,
        )
        .unwrap();
        for (name, data) in files {
            fs::write(
                dir.path()
                    .join(name),
                data,
            )
            .unwrap();
        }
        dir
    }

    #[test]
    fn test_load_and_order() {
        let dir = bundle(
            r#"{
                "name": "demo",
                "version": "1.2",
                "parts": {
                    "/sys/app.bin": { "type": "app", "src": "app.bin" },
                    "/sys/servicepack.ucf": { "type": "servicepack", "src": "sp.ucf" },
                    "/sys/mcuimg.bin": { "type": "boot", "src": "boot.bin", "alloc_size": 65536 }
                }
            }"#,
            &[("app.bin", b"app"), ("sp.ucf", b"sp"), ("boot.bin", b"boot")],
        );
        let catalog = BundleCatalog::load(dir.path()).unwrap();
        assert_eq!(catalog.name.as_deref(), Some("demo"));

        let names: Vec<String> = catalog
            .sorted_parts()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(
            names,
            vec!["/sys/servicepack.ucf", "/sys/mcuimg.bin", "/sys/app.bin"]
        );

        let boot = catalog
            .parts()
            .into_iter()
            .find(|p| p.name == "/sys/mcuimg.bin")
            .unwrap();
        assert_eq!(boot.alloc_size, Some(65536));
        let file = FilePart::load(&catalog, &boot).unwrap();
        assert_eq!(file.data, b"boot");
        assert_eq!(file.target_size(), 65536);
    }

    #[test]
    fn test_signature_is_read() {
        let dir = bundle(
            r#"{ "parts": { "/cert/ca.pem": { "type": "cert", "src": "ca.pem", "signature": "ca.sig" } } }"#,
            &[("ca.pem", b"pem"), ("ca.sig", &[7u8; 256])],
        );
        let catalog = BundleCatalog::load(dir.path()).unwrap();
        let info = &catalog.parts()[0];
        let file = FilePart::load(&catalog, info).unwrap();
        assert_eq!(
            file.signature
                .map(|s| s.len()),
            Some(256)
        );
    }

    #[test]
    fn test_missing_src_is_invalid_part() {
        let dir = bundle(r#"{ "parts": { "/x": { "type": "slfile" } } }"#, &[]);
        let catalog = BundleCatalog::load(dir.path()).unwrap();
        let err = FilePart::load(&catalog, &catalog.parts()[0]).unwrap_err();
        assert!(matches!(err, ccflash::Error::InvalidPart { .. }));
        assert!(err
            .to_string()
            .contains("/x"));
    }

    #[test]
    fn test_size_mismatch_is_invalid_part() {
        let dir = bundle(
            r#"{ "parts": { "/x": { "type": "slfile", "src": "x.bin", "size": 10 } } }"#,
            &[("x.bin", b"short")],
        );
        let catalog = BundleCatalog::load(dir.path()).unwrap();
        let err = FilePart::load(&catalog, &catalog.parts()[0]).unwrap_err();
        assert_eq!(err.kind(), ccflash::ErrorKind::Configuration);
        assert!(err
            .to_string()
            .contains("size mismatch"));
    }

    #[test]
    fn test_missing_manifest_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = BundleCatalog::load(dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Config(_))
        ));
    }
}
