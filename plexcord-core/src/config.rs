//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/plexcord/config.json`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/plexcord/` (~/.config/plexcord/)
//! - State/Logs: `$XDG_STATE_HOME/plexcord/` (~/.local/state/plexcord/)
//!
//! The file on disk is merged onto the built-in defaults, so a partial file
//! only overrides the keys it names. A file that cannot be parsed is moved
//! aside with a timestamp suffix and replaced by the defaults.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Presence display options
    #[serde(default)]
    pub display: DisplayConfig,

    /// Plex accounts and the servers to listen to for each
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// Log at debug level instead of info
    #[serde(default)]
    pub debug: bool,
}

impl LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub fn level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}

/// Presence display options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayConfig {
    /// Show a remaining-time countdown instead of elapsed time
    #[serde(default = "default_use_remaining_time")]
    pub use_remaining_time: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            use_remaining_time: default_use_remaining_time(),
        }
    }
}

fn default_use_remaining_time() -> bool {
    true
}

/// A Plex account and its servers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConfig {
    /// Plex authentication token
    pub token: String,

    /// Servers to listen to with this account
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

/// Per-server listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Server name as shown in Plex (matched case-insensitively)
    pub name: String,

    /// Username whose sessions are shown; defaults to the signed-in account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_for_user: Option<String>,

    /// Libraries whose items are never shown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blacklisted_libraries: Option<BTreeSet<String>>,

    /// When set, only items from these libraries are shown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whitelisted_libraries: Option<BTreeSet<String>>,
}

/// Outcome of checking a library against a server's filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryFilter {
    Allowed,
    Blacklisted,
    NotWhitelisted,
}

impl ServerConfig {
    /// Create a server entry with no user override and no filters
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listen_for_user: None,
            blacklisted_libraries: None,
            whitelisted_libraries: None,
        }
    }

    /// Apply the blacklist, then the whitelist, to a library name.
    pub fn library_filter(&self, library: &str) -> LibraryFilter {
        if let Some(blacklist) = &self.blacklisted_libraries {
            if blacklist.contains(library) {
                return LibraryFilter::Blacklisted;
            }
        }
        if let Some(whitelist) = &self.whitelisted_libraries {
            if !whitelist.contains(library) {
                return LibraryFilter::NotWhitelisted;
            }
        }
        LibraryFilter::Allowed
    }
}

/// Recursively merge `overlay` onto `target`.
///
/// Objects merge key by key; any other value replaces what was there.
pub fn merge(target: &mut Value, overlay: Value) {
    match (target, overlay) {
        (Value::Object(target), Value::Object(overlay)) => {
            for (key, value) in overlay {
                merge(target.entry(key).or_insert(Value::Null), value);
            }
        }
        (target, overlay) => *target = overlay,
    }
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific path, then write it back.
    ///
    /// Never fails: an unreadable file is quarantined and defaults are used.
    pub fn load_from(path: &Path) -> Self {
        Self::load_at(path, chrono::Utc::now().timestamp())
    }

    fn load_at(path: &Path, now: i64) -> Self {
        if !path.is_file() {
            tracing::info!("No config file found at {:?}, using defaults", path);
            let config = Config::default();
            config.save_to(path);
            return config;
        }

        let parse_err = match Self::read(path) {
            Ok(config) => {
                config.save_to(path);
                return config;
            }
            Err(e) => e,
        };

        let quarantined = quarantine_path(path, now);
        if let Err(rename_err) = std::fs::rename(path, &quarantined) {
            // Leave the unreadable file in place rather than overwrite it
            tracing::error!(
                path = %path.display(),
                error = %parse_err,
                rename_error = %rename_err,
                "Failed to parse the config file and could not move it aside, using defaults"
            );
            return Config::default();
        }

        tracing::error!(
            path = %path.display(),
            moved_to = %quarantined.display(),
            error = %parse_err,
            "Failed to parse the config file, a new one will be created"
        );
        let config = Config::default();
        config.save_to(path);
        config
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let loaded: Value = serde_json::from_str(&content)?;

        let mut merged = serde_json::to_value(Config::default())?;
        merge(&mut merged, loaded);

        Ok(serde_json::from_value(merged)?)
    }

    /// Write the configuration, logging instead of returning failures
    pub fn save_to(&self, path: &Path) {
        if let Err(e) = self.write_atomic(path) {
            tracing::error!(
                path = %path.display(),
                error = %e,
                "Failed to write the config file"
            );
        }
    }

    /// Serialize as tab-indented JSON with a trailing newline and replace
    /// `path` in one rename.
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut payload = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut serializer = serde_json::Serializer::with_formatter(&mut payload, formatter);
        self.serialize(&mut serializer)?;
        payload.push(b'\n');

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, payload)?;
        std::fs::rename(&tmp_path, path).map_err(|e| {
            Error::Config(format!("failed to commit config file {:?}: {}", path, e))
        })?;
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/plexcord/config.json` (~/.config/plexcord/config.json)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("plexcord").join("config.json")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/plexcord/` (~/.local/state/plexcord/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("plexcord")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/plexcord/plexcord.log` (~/.local/state/plexcord/plexcord.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("plexcord.log")
    }
}

/// `config.json` -> `config-1700000000.json`
fn quarantine_path(path: &Path, timestamp: i64) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config".to_string());
    path.with_file_name(format!("{}-{}.json", stem, timestamp))
}

/// Shared, swappable configuration.
///
/// Readers take a cheap [`Arc`] snapshot; `reload` and `update` are the only
/// writers and hold the lock for the whole read-modify-write.
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<Arc<Config>>,
}

impl ConfigStore {
    /// Load the file at `path` (creating it if needed)
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let config = Config::load_from(&path);
        Self {
            path,
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current configuration
    pub fn snapshot(&self) -> Arc<Config> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Re-read the backing file and swap it in
    pub fn reload(&self) -> Arc<Config> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = Arc::new(Config::load_from(&self.path));
        current.clone()
    }

    /// Modify the configuration, swap it in and persist it
    pub fn update(&self, f: impl FnOnce(&mut Config)) -> Arc<Config> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Config::clone(&current);
        f(&mut next);
        next.save_to(&self.path);
        *current = Arc::new(next);
        current.clone()
    }
}
