use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;
use crate::matching::{MatchOptions, TrackMatcher};
use crate::quality::{Comparator, LosslessTiebreak, QualityRequirements, StandardScorer, UpgradePolicy};

/// Directory name below the platform config dir
pub const APP_DIR_NAME: &str = "plex-upgrade";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub auth: AuthConfig,
    pub server: ServerConfig,
    pub upgrade: UpgradeConfig,
    pub matching: MatchOptions,
    pub spotdl: SpotdlConfig,
}

/// Plex account login
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Authentication token; skips username/password login
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Which media server to use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Connect to this server directly instead of discovering it via plex.tv
    pub url: Option<String>,
    /// Name of the account resource to connect to
    pub resource: Option<String>,
    /// HTTP request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: None,
            resource: None,
            timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> crate::error::Result<Duration> {
        if self.timeout_secs == 0 {
            return Err(Error::Config("server.timeout_secs must be at least 1".to_string()));
        }
        Ok(Duration::from_secs(self.timeout_secs))
    }
}

/// Upgrade rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeConfig {
    /// "all", "below_threshold" or "lossless"
    pub policy: UpgradePolicy,
    /// mp3 tracks below this bitrate need an upgrade (below_threshold policy)
    pub mp3_min_bitrate: u32,
    /// aac tracks below this bitrate need an upgrade (below_threshold policy)
    pub aac_min_bitrate: u32,
    /// "bitrate", "resolution" or "equal"
    pub lossless_tiebreak: LosslessTiebreak,
    /// Title prefix for duplicated playlists
    pub copy_title_prefix: String,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            policy: UpgradePolicy::All,
            mp3_min_bitrate: 320,
            aac_min_bitrate: 256,
            lossless_tiebreak: LosslessTiebreak::Bitrate,
            copy_title_prefix: "Copy of ".to_string(),
        }
    }
}

impl UpgradeConfig {
    pub fn requirements(&self) -> QualityRequirements {
        QualityRequirements {
            policy: self.policy,
            mp3_min_bitrate: self.mp3_min_bitrate,
            aac_min_bitrate: self.aac_min_bitrate,
        }
    }
}

/// Downloading tracks that could not be upgraded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotdlConfig {
    /// spotdl executable name or path
    pub command: String,
    /// Download directory (empty = ./spotdl)
    pub output_dir: Option<String>,
}

impl Default for SpotdlConfig {
    fn default() -> Self {
        Self {
            command: "spotdl".to_string(),
            output_dir: None,
        }
    }
}

impl Config {
    /// Get the configuration directory, creating it if needed
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join(APP_DIR_NAME);

        fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from the default path, or create default if not exists
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            Self::load_from(&path)
        } else {
            let config = Config::default();
            config.save_to(&path)?;
            tracing::info!("Created default config at {}", path.display());
            Ok(config)
        }
    }

    /// Load configuration from an explicit path; a missing file means defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file {} not found, using defaults", path.display());
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Generate example config content for documentation
    pub fn example_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// Comparator built from the matching and upgrade sections
    pub fn comparator(&self) -> Comparator {
        Comparator::new(
            TrackMatcher::new(self.matching.clone()),
            Box::new(StandardScorer::new(self.upgrade.lossless_tiebreak)),
        )
    }
}
