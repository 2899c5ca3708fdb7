//! Configuration management for the fanwarden daemon.
//!
//! The YAML configuration doubles as the device's persistent store: besides
//! runtime settings it carries the operating mode, manual duty, auto-mode
//! bounds and the three schedule registers, written back after every
//! successful mutating call and restored at startup.

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::RwLock;

use crate::{
    arbiter::{AutoConfig, OperatingMode},
    schedule::{RegisterEntry, SLOT_COUNT},
};

/// Main configuration structure for the fanwarden daemon.
///
/// # Example
///
/// ```yaml
/// version: 1
/// tick_seconds: 1
/// enable_broadcast: true
/// broadcast_interval: 2
/// pwm_path: /sys/class/hwmon/hwmon2/pwm1
///
/// mode: 1
/// manual_duty: 40
/// auto:
///   Tmin: 24.0
///   Tmax: 30.0
///
/// registers:
///   - id: 1
///     active: true
///     hour_start: 8
///     min_start: 0
///     hour_end: 10
///     min_end: 30
///     temp0: 22.0
///     temp100: 28.0
///     days: 0b0011111
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Configuration version for compatibility checking.
    pub version: u8,

    /// Control tick cadence in seconds.
    #[serde(default = "defaults::tick_seconds")]
    pub tick_seconds: u16,

    /// Whether to enable the periodic state broadcast signal.
    #[serde(default = "defaults::enable_broadcast")]
    pub enable_broadcast: bool,

    /// Interval between broadcasts in seconds.
    #[serde(default = "defaults::broadcast_interval")]
    pub broadcast_interval: u16,

    /// Sysfs PWM node driven by the control tick. Log-only when absent.
    #[serde(default)]
    pub pwm_path: Option<PathBuf>,

    /// Persisted operating mode, wire encoding 0..=2.
    #[serde(default)]
    pub mode: u8,

    /// Persisted manual duty percentage.
    #[serde(default)]
    pub manual_duty: u8,

    /// Persisted auto-mode calibration bounds.
    #[serde(default)]
    pub auto: AutoConfig,

    /// Persisted schedule registers.
    #[serde(default = "defaults::registers")]
    pub registers: Vec<RegisterEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            tick_seconds: defaults::tick_seconds(),
            enable_broadcast: defaults::enable_broadcast(),
            broadcast_interval: defaults::broadcast_interval(),
            pwm_path: None,
            mode: 0,
            manual_duty: 0,
            auto: AutoConfig::default(),
            registers: defaults::registers(),
        }
    }
}

impl Config {
    /// Validates the control-state fields. Registers are deliberately not
    /// checked here: they degrade to factory defaults at restore time
    /// instead of making the whole file unloadable.
    pub fn validate(&self) -> Result<()> {
        OperatingMode::try_from(self.mode)
            .map_err(|e| anyhow::anyhow!("Invalid persisted mode: {e}"))?;

        if self.manual_duty > 100 {
            anyhow::bail!("Persisted manual duty {} outside 0..=100", self.manual_duty);
        }

        if !(self.auto.tmin < self.auto.tmax) {
            anyhow::bail!(
                "Persisted auto bounds {}..{} are not strictly increasing",
                self.auto.tmin,
                self.auto.tmax
            );
        }

        if self.registers.len() > SLOT_COUNT {
            anyhow::bail!(
                "Configuration carries {} registers, device has {}",
                self.registers.len(),
                SLOT_COUNT
            );
        }

        Ok(())
    }
}

mod defaults {
    use crate::schedule::RegisterEntry;

    /// Default control tick cadence in seconds.
    pub fn tick_seconds() -> u16 {
        1
    }

    /// Default broadcast enable state.
    pub fn enable_broadcast() -> bool {
        false
    }

    /// Default interval between broadcasts in seconds.
    pub fn broadcast_interval() -> u16 {
        2
    }

    /// Factory-default register table.
    pub fn registers() -> Vec<RegisterEntry> {
        vec![
            RegisterEntry::inert(1),
            RegisterEntry::inert(2),
            RegisterEntry::inert(3),
        ]
    }
}

fn locate_config() -> Result<PathBuf> {
    // 1) ENV
    if let Ok(env_path) = env::var("FANWARDEN_CONFIG") {
        return Ok(PathBuf::from(env_path));
    }

    // 2) XDG_CONFIG_HOME or $HOME/.config
    if let Some(mut cfg_dir) = env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|h| Path::new(&h).join(".config")))
    {
        cfg_dir.push("fanwarden/config.yml");
        if cfg_dir.exists() {
            return Ok(cfg_dir);
        }
    }

    // 3) /etc
    let etc = Path::new("/etc/fanwarden/config.yml");
    if etc.exists() {
        return Ok(etc.to_path_buf());
    }

    anyhow::bail!("Configuration file not found in any standard location")
}

/// Configuration manager that owns both the config data and its file.
///
/// # Example
///
/// ```no_run
/// use fanwarden::config::ConfigManager;
/// use std::path::PathBuf;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config_manager = ConfigManager::load(Some(PathBuf::from("config.yml"))).await?;
/// let tick_seconds = config_manager.get().await.tick_seconds;
/// config_manager.save().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Arc<RwLock<Config>>,
    path: PathBuf,
}

impl ConfigManager {
    /// Creates a new ConfigManager with the given config and path.
    pub fn new(config: Config, path: PathBuf) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            path,
        }
    }

    /// Loads configuration from the given file or the standard locations:
    /// `FANWARDEN_CONFIG`, `$XDG_CONFIG_HOME/fanwarden/config.yml`
    /// (or `~/.config/...`), then `/etc/fanwarden/config.yml`.
    pub async fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => locate_config().context("No configuration file found")?,
        };

        info!("Loading config from: {}", config_path.display());
        let config = Self::load_config_from_path(&config_path)?;

        Ok(Self::new(config, config_path))
    }

    /// Gets a read-only reference to the current configuration.
    pub async fn get(&self) -> tokio::sync::RwLockReadGuard<'_, Config> {
        self.config.read().await
    }

    /// Gets a mutable reference to the current configuration.
    pub async fn get_mut(&self) -> tokio::sync::RwLockWriteGuard<'_, Config> {
        self.config.write().await
    }

    /// Returns the path to the configuration file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reloads configuration from the same file.
    pub async fn reload(&self) -> Result<()> {
        info!("Reloading config from: {}", self.path.display());
        let new_config = Self::load_config_from_path(&self.path)?;

        *self.config.write().await = new_config;
        Ok(())
    }

    /// Saves the current configuration to its file. The write goes through
    /// a temporary file and a rename so a crash mid-save never leaves a
    /// truncated config behind.
    pub async fn save(&self) -> Result<()> {
        let config = self.config.read().await;
        let config_yaml =
            serde_yaml::to_string(&*config).context("Failed to serialize configuration")?;

        let tmp_path = self.path.with_extension("yml.tmp");
        fs::write(&tmp_path, config_yaml).with_context(|| {
            format!("Failed to write temporary config to {}", tmp_path.display())
        })?;

        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to move config to {}", self.path.display()))?;

        info!("Configuration saved to: {}", self.path.display());
        Ok(())
    }

    /// Clones the current configuration.
    pub async fn clone_config(&self) -> Config {
        self.config.read().await.clone()
    }

    fn load_config_from_path(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML in: {}", path.display()))?;

        if config.version != 1 {
            anyhow::bail!(
                "Unsupported config version {} in file: {}",
                config.version,
                path.display()
            );
        }

        config
            .validate()
            .with_context(|| format!("Configuration validation failed for: {}", path.display()))?;

        Ok(config)
    }
}
