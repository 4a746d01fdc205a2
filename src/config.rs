//! Configuration management for the haptic bridge
//!
//! Handles loading, validation and saving of the JSON configuration file.
//! Configuration is stored at `~/.config/hapticbridge/config.json`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// Constants
// ============================================================================

/// Directory under the platform config dir
const CONFIG_DIR: &str = "hapticbridge";

/// File name inside [`CONFIG_DIR`]
const CONFIG_FILE: &str = "config.json";

// ============================================================================
// Transport Configuration
// ============================================================================

/// Connection parameters handed to the transport at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Application identifier registered with the device service
    #[serde(default = "default_app_id")]
    pub app_id: String,

    /// Human-readable application name
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Let the transport reconnect on its own after a lost link
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    /// Connection attempts before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_app_id() -> String { "hapticbridge".to_string() }
fn default_app_name() -> String { "Haptic Bridge".to_string() }
fn default_true() -> bool { true }
fn default_max_retries() -> u32 { 3 }

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            app_id: default_app_id(),
            app_name: default_app_name(),
            auto_reconnect: true,
            max_retries: default_max_retries(),
        }
    }
}

// ============================================================================
// Limiter Configuration
// ============================================================================

/// Submission rate limit and idle suppression settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Minimum time between forwarded submissions on one (device, key) lane.
    /// 35ms caps each lane at roughly 28Hz.
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: u64,

    /// Zero-intensity frames are dropped once a device has been quiet this long
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_ms: u64,

    /// Floor for forwarded durations
    #[serde(default = "default_min_duration")]
    pub min_duration_ms: u32,

    /// Requested durations are stretched by this factor to cover frame gaps
    #[serde(default = "default_duration_multiplier")]
    pub duration_multiplier: u32,

    /// Records untouched for this long are swept
    #[serde(default = "default_record_retention")]
    pub record_retention_ms: u64,

    /// Sweep after this many submissions
    #[serde(default = "default_sweep_every")]
    pub sweep_every_submissions: u32,

    /// Sweep at least this often while submissions keep arriving
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,
}

fn default_min_interval() -> u64 { 35 }
fn default_idle_timeout() -> u64 { 100 }
fn default_min_duration() -> u32 { 80 }
fn default_duration_multiplier() -> u32 { 2 }
fn default_record_retention() -> u64 { 5000 }
fn default_sweep_every() -> u32 { 256 }
fn default_sweep_interval() -> u64 { 1000 }

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval(),
            idle_timeout_ms: default_idle_timeout(),
            min_duration_ms: default_min_duration(),
            duration_multiplier: default_duration_multiplier(),
            record_retention_ms: default_record_retention(),
            sweep_every_submissions: default_sweep_every(),
            sweep_interval_ms: default_sweep_interval(),
        }
    }
}

impl LimiterConfig {
    /// Raise multiplier, sweep cadence and retention to workable minimums
    pub fn validate(&mut self) {
        self.duration_multiplier = self.duration_multiplier.max(1);
        self.sweep_every_submissions = self.sweep_every_submissions.max(1);
        // Records must outlive both windows or the sweep would erase live state
        let floor = self.min_interval_ms.max(self.idle_timeout_ms);
        if self.record_retention_ms <= floor {
            tracing::warn!(
                record_retention_ms = self.record_retention_ms,
                floor,
                "record_retention_ms too small, raising"
            );
            self.record_retention_ms = floor * 2;
        }
    }
}

// ============================================================================
// Status Cache / Router / Lifecycle Configuration
// ============================================================================

/// Status cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusCacheConfig {
    /// How long an "is active" answer is reused
    #[serde(default = "default_ttl")]
    pub ttl_ms: u64,
}

fn default_ttl() -> u64 { 1000 }

impl Default for StatusCacheConfig {
    fn default() -> Self {
        Self { ttl_ms: default_ttl() }
    }
}

/// Value router settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Cached replica values win over local sampling for this long
    #[serde(default = "default_freshness")]
    pub freshness_ms: u64,

    /// Minimum time between replica cache sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,

    /// Let a user feel points they own themselves in shared sessions
    #[serde(default)]
    pub allow_self_haptics: bool,
}

fn default_freshness() -> u64 { 200 }

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            freshness_ms: default_freshness(),
            sweep_interval_ms: default_sweep_interval(),
            allow_self_haptics: false,
        }
    }
}

/// Device lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Create host actuator points when a device is plugged in at runtime
    #[serde(default = "default_true")]
    pub hot_plug_registration: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            hot_plug_registration: true,
        }
    }
}

// ============================================================================
// Bridge Configuration
// ============================================================================

/// Every tunable of the bridge, one section per component
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub limiter: LimiterConfig,

    #[serde(default)]
    pub status_cache: StatusCacheConfig,

    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Where this config was read from; `save` writes back there
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Config {
    /// `<config dir>/hapticbridge/config.json`, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Read the bridge config from its platform location.
    ///
    /// Falls back to built-in tunables when there is no config dir or no file.
    pub fn load_default() -> Result<Self, ConfigError> {
        let Some(path) = Self::default_path() else {
            tracing::warn!("No platform config dir, bridge using built-in tunables");
            return Ok(Self::default());
        };
        Self::load(path)
    }

    /// Read the bridge config from `path`, clamping bad tunables.
    ///
    /// A missing file yields the built-in tunables bound to `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let raw = fs::read_to_string(path).map_err(ConfigError::Io)?;
            serde_json::from_str::<Config>(&raw).map_err(ConfigError::Parse)?
        } else {
            tracing::info!(path = %path.display(), "No bridge config file, using built-in tunables");
            Config::default()
        };

        config.validate();
        config.config_path = Some(path.to_path_buf());

        tracing::info!(
            path = %path.display(),
            min_interval_ms = config.limiter.min_interval_ms,
            idle_timeout_ms = config.limiter.idle_timeout_ms,
            ttl_ms = config.status_cache.ttl_ms,
            hot_plug = config.lifecycle.hot_plug_registration,
            "Bridge tunables ready"
        );

        Ok(config)
    }

    /// Write the tunables back as pretty JSON, creating the directory
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = self
            .config_path
            .clone()
            .or_else(Self::default_path)
            .ok_or(ConfigError::NoConfigDir)?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(ConfigError::Io)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(ConfigError::Parse)?;
        fs::write(&path, json).map_err(ConfigError::Io)?;

        tracing::info!(path = %path.display(), "Bridge config written");
        Ok(())
    }

    /// Repair tunables that would break the limiter or the transport handshake
    pub fn validate(&mut self) {
        self.limiter.validate();
        if self.transport.app_id.trim().is_empty() {
            self.transport.app_id = default_app_id();
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Failure reading or writing the bridge config
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read or written
    Io(std::io::Error),
    /// Config file is not valid bridge JSON
    Parse(serde_json::Error),
    /// Nowhere to save: no path given and no platform config dir
    NoConfigDir,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "bridge config I/O failed: {}", e),
            ConfigError::Parse(e) => write!(f, "bridge config is malformed: {}", e),
            ConfigError::NoConfigDir => write!(f, "no path to store the bridge config"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::NoConfigDir => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
