use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

const DEFAULT_API_URL: &str = "https://story-api.dicoding.dev/v1";
/// Longest age any cache partition or offline copy may be configured with (100 years).
const MAX_AGE_LIMIT_SECS: u64 = 60 * 60 * 24 * 365 * 100;
const MAX_RETENTION_DAYS: u32 = 365 * 100;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  /// Where databases and logs live (defaults to $XDG_DATA_HOME/storykeep)
  pub data_dir: Option<PathBuf>,
  pub cache: CacheConfig,
  pub offline: OfflineConfig,
  pub sync: SyncConfig,
  pub push: PushConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub base_url: Url,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: Url::parse(DEFAULT_API_URL).expect("default API url is valid"),
    }
  }
}

/// Bounds of one cache partition.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct PartitionBounds {
  pub max_entries: usize,
  pub max_age_secs: u64,
}

impl PartitionBounds {
  pub fn max_age(&self) -> chrono::Duration {
    i64::try_from(self.max_age_secs)
      .ok()
      .and_then(chrono::TimeDelta::try_seconds)
      .unwrap_or(chrono::TimeDelta::MAX)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Disable to run network-only
  pub enabled: bool,
  pub api: PartitionBounds,
  pub images: PartitionBounds,
  pub map_tiles: PartitionBounds,
  /// Hostnames (or parent domains) that serve map tiles
  pub map_tile_hosts: Vec<String>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      api: PartitionBounds {
        max_entries: 100,
        max_age_secs: 60 * 60 * 24,
      },
      images: PartitionBounds {
        max_entries: 200,
        max_age_secs: 60 * 60 * 24 * 30,
      },
      map_tiles: PartitionBounds {
        max_entries: 200,
        max_age_secs: 60 * 60 * 24 * 30,
      },
      map_tile_hosts: vec!["tile.openstreetmap.org".to_string()],
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
  /// How long copies of viewed stories are kept for offline browsing
  pub story_retention_days: u32,
}

impl Default for OfflineConfig {
  fn default() -> Self {
    Self {
      story_retention_days: 7,
    }
  }
}

impl OfflineConfig {
  pub fn retention(&self) -> chrono::Duration {
    chrono::TimeDelta::try_days(i64::from(self.story_retention_days)).unwrap_or(chrono::TimeDelta::MAX)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Drain pending uploads before network commands when online
  pub on_start: bool,
  /// Connectivity probe period for `sync --watch`
  pub probe_interval_secs: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      on_start: true,
      probe_interval_secs: 30,
    }
  }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PermissionSetting {
  Granted,
  Denied,
  /// Ask on the terminal each time a subscription is requested
  #[default]
  Prompt,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushKeysConfig {
  pub p256dh: String,
  pub auth: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PushConfig {
  pub vapid_public_key: String,
  /// Push service endpoint; push is unsupported when unset
  pub endpoint: Option<String>,
  pub keys: PushKeysConfig,
  pub permission: PermissionSetting,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./storykeep.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/storykeep/config.yaml
  ///
  /// Falls back to defaults when no file exists.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("storykeep.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("storykeep").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.cache.api.max_entries == 0
      || config.cache.images.max_entries == 0
      || config.cache.map_tiles.max_entries == 0
    {
      return Err(eyre!("cache max_entries must be at least 1"));
    }
    for (name, bounds) in [
      ("api", &config.cache.api),
      ("images", &config.cache.images),
      ("map_tiles", &config.cache.map_tiles),
    ] {
      if bounds.max_age_secs > MAX_AGE_LIMIT_SECS {
        return Err(eyre!(
          "cache.{}.max_age_secs must be at most {}",
          name,
          MAX_AGE_LIMIT_SECS
        ));
      }
    }
    if config.offline.story_retention_days > MAX_RETENTION_DAYS {
      return Err(eyre!(
        "offline.story_retention_days must be at most {}",
        MAX_RETENTION_DAYS
      ));
    }
    Ok(config)
  }

  /// Resolve the data directory, creating it if needed.
  pub fn data_dir(&self) -> Result<PathBuf> {
    let dir = match &self.data_dir {
      Some(dir) => dir.clone(),
      None => dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
        .ok_or_else(|| eyre!("Could not determine data directory"))?
        .join("storykeep"),
    };

    std::fs::create_dir_all(&dir)
      .map_err(|e| eyre!("Failed to create data directory {}: {}", dir.display(), e))?;

    Ok(dir)
  }

  /// Bearer token override from the environment.
  ///
  /// Checks STORYKEEP_TOKEN.
  pub fn token_override() -> Option<String> {
    std::env::var("STORYKEEP_TOKEN")
      .ok()
      .filter(|t| !t.is_empty())
  }

  /// Get the account password from environment variables.
  ///
  /// Checks STORYKEEP_PASSWORD.
  pub fn get_password() -> Result<String> {
    std::env::var("STORYKEEP_PASSWORD")
      .map_err(|_| eyre!("Password not found. Set STORYKEEP_PASSWORD or pass --password."))
  }
}
