//! Configuration for pfwatch consumers.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext), and
//! translation to `pfwatch_api::TransportConfig` plus
//! `pfwatch_core::SyncConfig`. Anything that embeds the engine loads its
//! appliance settings through here.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pfwatch_api::{TlsMode, TransportConfig};
use pfwatch_core::{Category, CoreError, SyncConfig};

/// Keyring service name; entries are keyed `<profile>/password`.
pub const KEYRING_SERVICE: &str = "pfwatch";

/// Bounds applied to `scan_interval`, in seconds.
pub const MIN_SCAN_INTERVAL: u64 = 10;
pub const MAX_SCAN_INTERVAL: u64 = 300;

/// Bounds applied to `device_tracker_scan_interval`, in seconds.
pub const MIN_DEVICE_TRACKER_SCAN_INTERVAL: u64 = 30;
pub const MAX_DEVICE_TRACKER_SCAN_INTERVAL: u64 = 300;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no profile named '{profile}'")]
    UnknownProfile { profile: String },

    #[error("no password configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("invalid sync settings: {0}")]
    Sync(#[from] CoreError),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named.
    pub default_profile: Option<String>,

    /// Values a profile falls back to.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named appliance profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, or the default profile when `name` is `None`.
    pub fn profile<'a>(&'a self, name: Option<&'a str>) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|p| (name, p))
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,

    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,

    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_device_tracker_scan_interval")]
    pub device_tracker_scan_interval: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            scan_interval: default_scan_interval(),
            verify_ssl: default_verify_ssl(),
            timeout: default_timeout(),
            device_tracker_scan_interval: default_device_tracker_scan_interval(),
        }
    }
}

fn default_scan_interval() -> u64 {
    30
}
fn default_verify_ssl() -> bool {
    true
}
fn default_timeout() -> u64 {
    20
}
fn default_device_tracker_scan_interval() -> u64 {
    60
}

/// A named appliance profile.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// Appliance base URL (e.g., "https://192.168.1.1").
    pub url: String,

    #[serde(default = "default_username")]
    pub username: String,

    /// Plaintext password. Prefer `password_env` or the keyring.
    pub password: Option<String>,

    /// Environment variable holding the password.
    pub password_env: Option<String>,

    /// Override certificate verification.
    pub verify_ssl: Option<bool>,

    /// Seconds between poll cycles.
    pub scan_interval: Option<u64>,

    /// Also poll the ARP table.
    #[serde(default)]
    pub device_tracker_enabled: bool,

    /// Seconds between ARP table fetches when the device tracker is on.
    pub device_tracker_scan_interval: Option<u64>,

    /// Per-call timeout in seconds.
    pub timeout: Option<u64>,
}

fn default_username() -> String {
    "admin".into()
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "pfwatch", "pfwatch").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("pfwatch");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + `PFWATCH_*` environment. Nested keys use `__`,
/// e.g. `PFWATCH_DEFAULTS__SCAN_INTERVAL=60`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("PFWATCH_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the appliance password: `password_env`, then the system
/// keyring, then plaintext.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Env var named by the profile
    if let Some(ref env_name) = profile.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password")) {
        if let Ok(pw) = entry.get_password() {
            return Ok(SecretString::from(pw));
        }
    }

    // 3. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

// ── Translation ─────────────────────────────────────────────────────

/// Clamp a configured scan interval into the supported range.
pub fn scan_interval(secs: u64) -> Duration {
    Duration::from_secs(secs.clamp(MIN_SCAN_INTERVAL, MAX_SCAN_INTERVAL))
}

/// Clamp a configured device tracker interval into the supported range.
pub fn device_tracker_scan_interval(secs: u64) -> Duration {
    Duration::from_secs(secs.clamp(
        MIN_DEVICE_TRACKER_SCAN_INTERVAL,
        MAX_DEVICE_TRACKER_SCAN_INTERVAL,
    ))
}

/// Build the transport and engine settings for one profile.
pub fn profile_to_configs(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<(TransportConfig, SyncConfig), ConfigError> {
    let password = resolve_password(profile, profile_name)?;
    let mut transport = TransportConfig::new(&profile.url, profile.username.clone(), password)
        .map_err(|e| ConfigError::Validation {
            field: "url".into(),
            reason: e.to_string(),
        })?;

    if !profile.verify_ssl.unwrap_or(defaults.verify_ssl) {
        transport.tls = TlsMode::DangerAcceptInvalid;
    }

    let timeout_secs = profile.timeout.unwrap_or(defaults.timeout);
    if timeout_secs == 0 {
        return Err(ConfigError::Validation {
            field: "timeout".into(),
            reason: "must be at least 1 second".into(),
        });
    }
    let timeout = Duration::from_secs(timeout_secs);
    transport.timeout = timeout;

    let interval = scan_interval(profile.scan_interval.unwrap_or(defaults.scan_interval));
    let mut sync = SyncConfig::default().with_poll_interval(interval);
    sync.call_timeout = timeout;
    sync.cycle_lease_wait = sync.cycle_lease_wait.min(interval / 2);
    if profile.device_tracker_enabled {
        let arp_interval = device_tracker_scan_interval(
            profile
                .device_tracker_scan_interval
                .unwrap_or(defaults.device_tracker_scan_interval),
        );
        sync = sync
            .with_category(Category::Arp)
            .with_category_interval(Category::Arp, arp_interval);
    }
    sync.validate()?;

    Ok((transport, sync))
}
