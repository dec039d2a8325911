//! Process-wide application settings.
//!
//! One `Settings` value is loaded at program start and passed by handle to
//! whatever needs it; there is no global lookup. The backing file is plain
//! JSON in the platform config directory (or any path the caller picks).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// How many recent devices to remember.
const MAX_RECENT_DEVICES: usize = 10;

/// Errors loading or saving settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The settings file is not valid JSON.
    #[error("settings parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// No platform config directory could be resolved.
    #[error("no configuration directory available on this platform")]
    NoConfigDir,
}

/// One remembered device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecentDevice {
    /// Device public key, hex.
    pub public_key_hex: String,
    /// Advertised name at the time of connection.
    pub name: String,
    /// Last seen, seconds since the epoch.
    pub last_seen: u64,
}

/// Persisted application settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Public key (hex) of the last connected device.
    pub last_device_key: Option<String>,
    /// Transport of the last connection ("serial" / "ble").
    pub last_connection_type: Option<String>,
    /// Target of the last connection (port path or BLE name).
    pub last_connection_target: Option<String>,
    /// Reconnect to the last device at startup.
    pub auto_connect: bool,
    /// Display preference: show timestamps.
    pub show_timestamps: bool,
    /// Display preference: show SNR next to messages.
    pub show_snr: bool,
    /// Display preference: timestamp format string.
    pub datetime_format: String,
    /// Recently connected devices, newest first.
    pub recent_devices: Vec<RecentDevice>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            last_device_key: None,
            last_connection_type: None,
            last_connection_target: None,
            auto_connect: false,
            show_timestamps: true,
            show_snr: true,
            datetime_format: "%Y-%m-%d %H:%M:%S".to_string(),
            recent_devices: Vec::new(),
        }
    }
}

impl Settings {
    /// Default settings file location in the platform config directory.
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        let dirs = directories::ProjectDirs::from("", "", "meshcore")
            .ok_or(SettingsError::NoConfigDir)?;
        Ok(dirs.config_dir().join("settings.json"))
    }

    /// Load settings from `path`, falling back to defaults when the file
    /// does not exist yet.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings file, using defaults");
                Ok(Settings::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Write settings to `path`, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Record a connection to a device: updates the last-device fields and
    /// the recent list (deduplicated by key, newest first, bounded).
    pub fn record_connection(
        &mut self,
        public_key_hex: &str,
        name: &str,
        connection_type: &str,
        target: &str,
        now: u64,
    ) {
        self.last_device_key = Some(public_key_hex.to_string());
        self.last_connection_type = Some(connection_type.to_string());
        self.last_connection_target = Some(target.to_string());

        self.recent_devices
            .retain(|d| d.public_key_hex != public_key_hex);
        self.recent_devices.insert(
            0,
            RecentDevice {
                public_key_hex: public_key_hex.to_string(),
                name: name.to_string(),
                last_seen: now,
            },
        );
        self.recent_devices.truncate(MAX_RECENT_DEVICES);
    }
}
