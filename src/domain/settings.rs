use crate::domain::negotiation::DEFAULT_INITIAL_MTU;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_true(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "ble_mtu_probe".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub log_settings: LogSettings,

    // Negotiation
    #[serde(default = "default_initial_mtu")]
    pub initial_mtu: u16,

    // Host windows around a probe
    #[serde(default = "default_scan_window_secs")]
    pub scan_window_secs: u64,
    #[serde(default = "default_true")]
    pub request_discoverable: bool,
    #[serde(default = "default_discoverable_secs")]
    pub discoverable_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    #[serde(default)]
    pub last_address: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),
            initial_mtu: default_initial_mtu(),
            scan_window_secs: default_scan_window_secs(),
            request_discoverable: default_true(),
            discoverable_secs: default_discoverable_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            last_address: None,
        }
    }
}

impl Settings {
    /// Snapshot of the values the Bluetooth worker needs
    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            initial_mtu: self.initial_mtu.max(1),
            scan_window: Duration::from_secs(self.scan_window_secs),
            discoverable_window: self
                .request_discoverable
                .then(|| Duration::from_secs(self.discoverable_secs)),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs.max(1)),
        }
    }
}

fn default_initial_mtu() -> u16 {
    DEFAULT_INITIAL_MTU
}
fn default_scan_window_secs() -> u64 {
    15
}
fn default_discoverable_secs() -> u64 {
    120
}
fn default_probe_timeout_secs() -> u64 {
    60
}

/// Probe parameters passed from the host into the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    pub initial_mtu: u16,
    pub scan_window: Duration,
    /// `None` skips the discoverable request entirely
    pub discoverable_window: Option<Duration>,
    pub probe_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Settings::default().probe_config()
    }
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Load from an explicit file, falling back to defaults when it is
    /// missing or unreadable.
    pub fn with_path(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!(
                    "Using default settings ({}): {}",
                    settings_path.display(),
                    e
                );
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("BleMtuProbe");
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(dir) = self.settings_path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    /// Remember the last address a probe was started for
    pub fn remember_address(&mut self, address: &str) -> anyhow::Result<()> {
        if self.settings.last_address.as_deref() != Some(address) {
            self.settings.last_address = Some(address.to_string());
            self.save()?;
        }
        Ok(())
    }
}
