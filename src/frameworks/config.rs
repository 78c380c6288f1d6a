use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::{env, fmt, time::Duration};

use crate::domain::generator::{GeneratorCatalog, GeneratorType};
use crate::domain::world::{WorldMultipliers, WorldRules};

// Runtime/server constants (not gameplay tuning).

pub fn http_port() -> u16 {
    env::var("GENERATOR_SERVER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3010)
}

pub fn database_url() -> Option<String> {
    env::var("DATABASE_URL").ok().filter(|url| !url.is_empty())
}

// One identity per process start.
pub fn server_id() -> String {
    env::var("SERVER_ID")
        .ok()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

pub fn economy_service_url() -> Option<String> {
    env::var("ECONOMY_SERVICE_URL").ok().filter(|url| !url.is_empty())
}

pub fn economy_timeout() -> Duration {
    let millis = env::var("ECONOMY_TIMEOUT_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(1500);
    Duration::from_millis(millis)
}

pub fn settings_path() -> String {
    env::var("SETTINGS_PATH").unwrap_or_else(|_| "config/generators.toml".to_string())
}

pub const PRESENTATION_CHANNEL_CAPACITY: usize = 4096;
pub const FEED_BROADCAST_CAPACITY: usize = 1024;
pub const USER_SAVE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub enum ConfigError {
    Read(String),
    Parse(String),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read(msg) => write!(f, "failed to read settings: {msg}"),
            ConfigError::Parse(msg) => write!(f, "failed to parse settings: {msg}"),
            ConfigError::Invalid(msg) => write!(f, "invalid settings: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

// Gameplay tuning loaded from the settings TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub keys: KeySettings,
    pub simulation: SimulationSection,
    pub locks: LockSection,
    pub corruption: CorruptionSection,
    pub autosell: AutoSellSection,
    pub restore: RestoreSection,
    pub worlds: HashMap<String, WorldMultipliers>,
    pub generators: Vec<GeneratorType>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeySettings {
    pub prefix: String,
}

impl Default for KeySettings {
    fn default() -> Self {
        Self {
            prefix: "gens".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationSection {
    pub tick_millis: u64,
    pub save_every_ticks: u64,
    pub online_only: bool,
    pub blacklisted_worlds: HashSet<String>,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            tick_millis: 250,
            save_every_ticks: 20,
            online_only: false,
            blacklisted_worlds: HashSet::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LockSection {
    pub ttl_seconds: u64,
    pub acquire_interval_seconds: u64,
}

impl Default for LockSection {
    fn default() -> Self {
        Self {
            ttl_seconds: 30,
            acquire_interval_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorruptionSection {
    pub enabled: bool,
    pub percentage: f64,
    pub interval_minutes: u64,
    pub notify_interval_minutes: u64,
    pub blacklisted_generators: HashSet<String>,
    pub show_markers: bool,
}

impl Default for CorruptionSection {
    fn default() -> Self {
        Self {
            enabled: false,
            percentage: 10.0,
            interval_minutes: 60,
            notify_interval_minutes: 5,
            blacklisted_generators: HashSet::new(),
            show_markers: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AutoSellSection {
    pub flush_interval_seconds: u32,
    pub multiplier_limit: Option<f64>,
}

impl Default for AutoSellSection {
    fn default() -> Self {
        Self {
            flush_interval_seconds: 30,
            multiplier_limit: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RestoreSection {
    pub safe_restoration: bool,
    pub cleanup_orphaned: bool,
}

impl Default for RestoreSection {
    fn default() -> Self {
        Self {
            safe_restoration: true,
            cleanup_orphaned: false,
        }
    }
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Read(format!("{}: {err}", path.display())))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let settings: Settings =
            toml::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulation.tick_millis == 0 {
            return Err(ConfigError::Invalid(
                "simulation.tick_millis must be positive".to_string(),
            ));
        }
        if self.locks.ttl_seconds == 0 || self.locks.acquire_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "lock ttl and acquire interval must be positive".to_string(),
            ));
        }
        if self.locks.acquire_interval_seconds >= self.locks.ttl_seconds {
            return Err(ConfigError::Invalid(format!(
                "locks.acquire_interval_seconds ({}) must be below locks.ttl_seconds ({})",
                self.locks.acquire_interval_seconds, self.locks.ttl_seconds
            )));
        }
        if self.corruption.enabled && self.corruption.interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "corruption.interval_minutes must be positive".to_string(),
            ));
        }
        if self.corruption.enabled && self.corruption.notify_interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "corruption.notify_interval_minutes must be positive".to_string(),
            ));
        }
        self.catalog().validate().map_err(ConfigError::Invalid)
    }

    pub fn catalog(&self) -> GeneratorCatalog {
        GeneratorCatalog::new(self.generators.clone())
    }

    pub fn world_rules(&self) -> WorldRules {
        WorldRules::new(self.worlds.clone())
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.simulation.tick_millis)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.locks.ttl_seconds)
    }

    pub fn acquire_interval(&self) -> Duration {
        Duration::from_secs(self.locks.acquire_interval_seconds)
    }

    // Offline owners' generators are only worth leasing when some of them can run.
    pub fn include_offline_owners(&self) -> bool {
        !self.simulation.online_only
            || self
                .generators
                .iter()
                .any(|gen_type| gen_type.online_only == Some(false))
    }
}
