use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sync::SyncOptions;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub sync: SyncOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Admin API root, e.g. `https://shop.example.com/api/admin`
  pub base_url: String,
  /// Per-request timeout
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
  30
}

impl ApiConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./dashsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/dashsync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    Self::resolve(Self::load_optional(explicit_path)?, None)
  }

  /// Like [`Config::load`], but `Ok(None)` when the search finds no file.
  ///
  /// A missing explicit path and a file that fails to parse are still errors.
  pub fn load_optional(explicit_path: Option<&Path>) -> Result<Option<Self>> {
    let path = match explicit_path {
      Some(p) if p.exists() => Some(p.to_path_buf()),
      Some(p) => return Err(eyre!("Config file not found: {}", p.display())),
      None => Self::find_config_file(),
    };

    path.map(|p| Self::load_from_path(&p)).transpose()
  }

  /// Combine a loaded file with a `--base-url` override. The override wins;
  /// without a file it is all the configuration there is.
  pub fn resolve(found: Option<Self>, base_url: Option<String>) -> Result<Self> {
    match (found, base_url) {
      (Some(config), Some(base_url)) => Ok(Self {
        api: ApiConfig {
          base_url,
          ..config.api
        },
        ..config
      }),
      (Some(config), None) => Ok(config),
      (None, Some(base_url)) => Ok(Self::for_base_url(base_url)),
      (None, None) => Err(eyre!(
        "No configuration file found. Create one at ~/.config/dashsync/config.yaml\n\
                 or pass --base-url."
      )),
    }
  }

  /// Configuration for a base URL given on the command line, when no file exists.
  pub fn for_base_url(base_url: impl Into<String>) -> Self {
    Self {
      api: ApiConfig {
        base_url: base_url.into(),
        timeout_secs: default_timeout_secs(),
      },
      sync: SyncOptions::default(),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("dashsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("dashsync").join("config.yaml");
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

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Get the API bearer token from environment variables.
  ///
  /// Checks DASHSYNC_API_TOKEN first, then API_TOKEN as fallback. A missing
  /// token is not an error; requests then go out unauthenticated.
  pub fn get_api_token() -> Option<String> {
    std::env::var("DASHSYNC_API_TOKEN")
      .or_else(|_| std::env::var("API_TOKEN"))
      .ok()
      .filter(|token| !token.is_empty())
  }
}
