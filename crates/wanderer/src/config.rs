//! Configuration management for the Wanderer service.
//!
//! Settings are loaded from a TOML file (a default one is written on first
//! run), then overridden by command-line flags and validated before anything
//! starts.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use wanderer_kills::RetryPolicy;
use wanderer_map::{EngineSettings, LayoutDirection, ManagerSettings, MapId, MapOptions};

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub maps: MapSettings,
    #[serde(default)]
    pub kills: KillSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Map engine and executor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapSettings {
    /// Seconds between garbage collection passes
    pub gc_interval_secs: u64,
    /// Idle minutes after which an unattached system expires
    pub system_expire_minutes: u64,
    /// Minutes a last-activity entry is kept
    pub activity_ttl_minutes: u64,
    /// Bounded mailbox size of each map executor
    pub mailbox_capacity: usize,
    /// Default placement direction for maps without their own option
    pub layout: LayoutDirection,
    /// JSON export of solar systems; every positive id is accepted without it
    pub static_data_path: Option<String>,
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            gc_interval_secs: 60,
            system_expire_minutes: 15,
            activity_ttl_minutes: 60,
            mailbox_capacity: 256,
            layout: LayoutDirection::default(),
            static_data_path: None,
        }
    }
}

/// Kill feed settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KillSettings {
    pub enabled: bool,
    /// Phoenix websocket endpoint of the kill service
    pub feed_url: String,
    pub sync_interval_secs: u64,
    /// Maps updated within this many minutes count as active
    pub active_map_window_minutes: u64,
    /// Kills older than this many minutes are discarded
    pub kill_cutoff_minutes: u64,
    pub max_kills_per_system: usize,
    /// When false every map is entitled to kill data
    pub subscriptions_enabled: bool,
    /// Map ids holding a subscription, used when `subscriptions_enabled`
    pub entitled_maps: Vec<String>,
    pub retry: RetrySettings,
}

impl Default for KillSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            feed_url: "ws://127.0.0.1:4004/socket/websocket?vsn=1.0.0".to_string(),
            sync_interval_secs: 30,
            active_map_window_minutes: 30,
            kill_cutoff_minutes: 60,
            max_kills_per_system: 50,
            subscriptions_enabled: false,
            entitled_maps: Vec::new(),
            retry: RetrySettings::default(),
        }
    }
}

/// Retry budget for enrichment lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

fn minutes(count: u64) -> chrono::Duration {
    chrono::Duration::minutes(count.min(u64::from(u32::MAX)) as i64)
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, writes the default configuration there and
    /// returns it.
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config = toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            system_expire: minutes(self.maps.system_expire_minutes),
            activity_ttl: minutes(self.maps.activity_ttl_minutes),
        }
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            mailbox_capacity: self.maps.mailbox_capacity,
        }
    }

    pub fn default_map_options(&self) -> MapOptions {
        MapOptions {
            layout: self.maps.layout,
        }
    }

    pub fn static_data_path(&self) -> Option<PathBuf> {
        self.maps.static_data_path.as_ref().map(PathBuf::from)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.maps.gc_interval_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.kills.sync_interval_secs)
    }

    pub fn active_map_window(&self) -> chrono::Duration {
        minutes(self.kills.active_map_window_minutes)
    }

    pub fn kill_cutoff(&self) -> chrono::Duration {
        minutes(self.kills.kill_cutoff_minutes)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.kills.retry.max_attempts,
            base_delay: Duration::from_millis(self.kills.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.kills.retry.max_delay_ms),
        }
    }

    /// Entitled map ids in canonical form.
    pub fn entitled_maps(&self) -> Result<Vec<String>, String> {
        self.kills
            .entitled_maps
            .iter()
            .map(|raw| {
                raw.parse::<MapId>()
                    .map(|id| id.to_string())
                    .map_err(|_| format!("Invalid entitled map id: {raw}"))
            })
            .collect()
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<(), String> {
        if self.maps.gc_interval_secs == 0 {
            return Err("maps.gc_interval_secs must be greater than zero".to_string());
        }
        if self.maps.system_expire_minutes == 0 {
            return Err("maps.system_expire_minutes must be greater than zero".to_string());
        }
        if self.maps.mailbox_capacity == 0 {
            return Err("maps.mailbox_capacity must be greater than zero".to_string());
        }

        if self.kills.enabled {
            if !(self.kills.feed_url.starts_with("ws://") || self.kills.feed_url.starts_with("wss://")) {
                return Err(format!(
                    "kills.feed_url must be a ws:// or wss:// URL, got {}",
                    self.kills.feed_url
                ));
            }
            if self.kills.sync_interval_secs == 0 {
                return Err("kills.sync_interval_secs must be greater than zero".to_string());
            }
        }
        if self.kills.max_kills_per_system == 0 {
            return Err("kills.max_kills_per_system must be greater than zero".to_string());
        }
        if self.kills.retry.max_attempts == 0 {
            return Err("kills.retry.max_attempts must be at least 1".to_string());
        }
        if self.kills.retry.base_delay_ms > self.kills.retry.max_delay_ms {
            return Err("kills.retry.base_delay_ms must not exceed max_delay_ms".to_string());
        }
        self.entitled_maps()?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}
