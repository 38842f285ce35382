use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Application name, used as the store name prefix
  pub app_name: String,
  /// Generation counter; bump it to roll out a new offline asset set
  pub version: u32,
  /// Host of the reference-data API; requests to it use the API strategy
  pub api_host: String,
  /// Origin that serves the application's own assets
  pub static_origin: String,
  /// Assets that must be available offline, absolute or relative to `static_origin`
  pub manifest: Vec<String>,
  pub cache: CacheConfig,
  pub network: NetworkConfig,
  pub server: ServerConfig,
  /// Write logs to daily files in this directory instead of stderr
  pub log_dir: Option<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      app_name: "pokemon-database".to_string(),
      version: 1,
      api_host: "pokeapi.co".to_string(),
      static_origin: "http://localhost:3000/".to_string(),
      manifest: default_manifest(),
      cache: CacheConfig::default(),
      network: NetworkConfig::default(),
      server: ServerConfig::default(),
      log_dir: None,
    }
  }
}

fn default_manifest() -> Vec<String> {
  [
    "/",
    "/static/js/bundle.js",
    "/static/css/main.css",
    "/manifest.json",
    "/favicon.ico",
  ]
  .iter()
  .map(|s| s.to_string())
  .collect()
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
  /// Persistent SQLite database
  #[default]
  Sqlite,
  /// Process-local, lost on exit
  Memory,
  /// Caching disabled, network only
  None,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub backend: CacheBackend,
  /// Database path for the SQLite backend (default: $XDG_DATA_HOME/pokecache/cache.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
  /// Per-request timeout; 0 leaves it to the transport
  pub timeout_secs: u64,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self { timeout_secs: 30 }
  }
}

impl NetworkConfig {
  pub fn timeout(&self) -> Option<Duration> {
    (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub listen: SocketAddr,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      listen: SocketAddr::from(([127, 0, 0, 1], 8787)),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./pokecache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/pokecache/config.yaml
  ///
  /// Without any config file the built-in defaults are used.
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
    // Check current directory
    let local = PathBuf::from("pokecache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("pokecache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.app_name.trim().is_empty() {
      return Err(eyre!("app_name must not be empty"));
    }
    if self.api_host.trim().is_empty() {
      return Err(eyre!("api_host must not be empty"));
    }
    self.static_origin_url()?;
    Ok(())
  }

  /// Parsed `static_origin`.
  pub fn static_origin_url(&self) -> Result<Url> {
    let url = Url::parse(&self.static_origin)
      .map_err(|e| eyre!("Invalid static_origin '{}': {}", self.static_origin, e))?;
    if !matches!(url.scheme(), "http" | "https") {
      return Err(eyre!("static_origin must be an http(s) URL: {}", self.static_origin));
    }
    Ok(url)
  }
}
