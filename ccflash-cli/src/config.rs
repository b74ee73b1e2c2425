//! Configuration file support for ccflash.
//!
//! Sources, highest priority first:
//! 1. Command-line arguments
//! 2. Environment variables (CCFLASH_*)
//! 3. Local config file (./ccflash.toml)
//! 4. Global config file (~/.config/ccflash/config.toml)

use {
    directories::ProjectDirs,
    log::{debug, info, warn},
    serde::{Deserialize, Serialize},
    std::{
        fs,
        path::{Path, PathBuf},
    },
};

/// Name of the local configuration file.
pub const LOCAL_CONFIG: &str = "ccflash.toml";

/// USB device identification for port matching.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsbDevice {
    /// USB Vendor ID.
    pub vid: u16,
    /// USB Product ID.
    pub pid: u16,
}

impl UsbDevice {
    /// Check if this device matches the given USB info.
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vid == vid && self.pid == pid
    }
}

/// Port selection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortConfig {
    /// Preferred serial port (e.g. "/dev/ttyACM0" or "COM3").
    pub serial: Option<String>,
    /// Baud rate.
    pub baud: Option<u32>,
    /// Boards remembered for auto-detection.
    #[serde(default)]
    pub usb_device: Vec<UsbDevice>,
}

/// Boot loader negotiation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectSettings {
    /// Chip family name ("cc3200", "cc32xx", ...).
    pub chip: Option<String>,
    /// Synchronization attempts.
    pub attempts: Option<u32>,
    /// Delay between reset and reading the ACK, in milliseconds.
    pub settle_ms: Option<u64>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Port settings.
    #[serde(default)]
    pub port: PortConfig,
    /// Negotiation settings.
    #[serde(default)]
    pub connect: ConnectSettings,
}

impl Config {
    /// Load the global config, then the local one on top.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global);
            }
        }

        if let Some(local) = Self::load_from_file(Path::new(LOCAL_CONFIG)) {
            debug!("Loaded local config from {LOCAL_CONFIG}");
            config.merge(local);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {e}", path.display());
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {e}", path.display());
                None
            },
        }
    }

    /// Global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "ccflash").map(|dirs| {
            dirs.config_dir()
                .to_path_buf()
        })
    }

    /// Global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one. Set values in `other` win.
    fn merge(&mut self, other: Self) {
        if other
            .port
            .serial
            .is_some()
        {
            self.port.serial = other.port.serial;
        }
        if other
            .port
            .baud
            .is_some()
        {
            self.port.baud = other.port.baud;
        }
        for dev in other.port.usb_device {
            if !self
                .port
                .usb_device
                .contains(&dev)
            {
                self.port
                    .usb_device
                    .push(dev);
            }
        }

        if other
            .connect
            .chip
            .is_some()
        {
            self.connect.chip = other.connect.chip;
        }
        if other
            .connect
            .attempts
            .is_some()
        {
            self.connect.attempts = other.connect.attempts;
        }
        if other
            .connect
            .settle_ms
            .is_some()
        {
            self.connect.settle_ms = other.connect.settle_ms;
        }
    }

    /// Whether `vid:pid` was remembered as a board.
    pub fn is_remembered(&self, vid: u16, pid: u16) -> bool {
        self.port
            .usb_device
            .iter()
            .any(|d| d.matches(vid, pid))
    }

    /// Remember a USB device for future auto-detection.
    ///
    /// Written to the local file when one exists, to the global file otherwise.
    pub fn remember_usb_device(&mut self, vid: u16, pid: u16) -> anyhow::Result<()> {
        let device = UsbDevice { vid, pid };
        if self
            .port
            .usb_device
            .contains(&device)
        {
            return Ok(());
        }

        let path = if Path::new(LOCAL_CONFIG).exists() {
            PathBuf::from(LOCAL_CONFIG)
        } else if let Some(global_dir) = Self::global_config_dir() {
            fs::create_dir_all(&global_dir)?;
            global_dir.join("config.toml")
        } else {
            PathBuf::from(LOCAL_CONFIG)
        };

        let mut on_disk = Self::load_from_file(&path).unwrap_or_default();
        on_disk
            .port
            .usb_device
            .push(device);
        self.port
            .usb_device
            .push(device);

        fs::write(&path, toml::to_string_pretty(&on_disk)?)?;
        info!("Saved USB device to {}", path.display());
        Ok(())
    }
}
