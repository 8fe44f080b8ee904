//! Daemon settings
//!
//! Settings are layered: built-in defaults, then settings files (TOML or
//! JSON), then `NETLOGIN_*` environment variables. Network profiles live in
//! their own files, see [`crate::networks`].

use crate::login::Reachability;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SYSTEM_SETTINGS: &str = "/etc/netlogin/config";

/// Root settings structure
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Interface whose address is substituted for `$mac` (auto-detect if unset)
    pub interface: Option<String>,

    pub networks: NetworksConfig,

    pub http: HttpConfig,

    pub reachability: ReachabilityConfig,

    pub logging: LoggingConfig,
}

/// Where network profiles are read from
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct NetworksConfig {
    /// Directory of JSON files, merged first
    pub dir: PathBuf,

    /// Consolidated JSON file, overrides the directory
    pub file: PathBuf,
}

impl Default for NetworksConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/etc/netlogin/networks.d"),
            file: PathBuf::from("/etc/netlogin/networks.json"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    /// Request timeout in seconds
    pub timeout: u64,

    /// Connection timeout in seconds
    pub connect_timeout: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: 10,
            connect_timeout: 5,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ReachabilityConfig {
    pub url: String,
    pub expected_status: u16,
}

impl Default for ReachabilityConfig {
    fn default() -> Self {
        let Reachability {
            url,
            expected_status,
        } = Reachability::default();
        Self {
            url,
            expected_status,
        }
    }
}

impl From<&ReachabilityConfig> for Reachability {
    fn from(cfg: &ReachabilityConfig) -> Self {
        Self {
            url: cfg.url.clone(),
            expected_status: cfg.expected_status,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interface: None,
            networks: NetworksConfig::default(),
            http: HttpConfig::default(),
            reachability: ReachabilityConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings.
    ///
    /// With an explicit `path` that file must exist. Otherwise the system
    /// file is read, then the per-user file on top of it, each only when
    /// present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                tracing::debug!("Loading settings from: {}", path.display());
                Self::load_layers(Some(path), &[])
            }
            None => Self::load_layers(None, &search_paths()),
        }
    }

    /// `search` entries are extension-less stems (`.../config`), later ones
    /// overriding earlier ones. Environment variables win over every file.
    fn load_layers(explicit: Option<&Path>, search: &[PathBuf]) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = explicit {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
        }
        for stem in search {
            builder = builder
                .add_source(config::File::with_name(&stem.to_string_lossy()).required(false));
        }

        builder
            .add_source(
                config::Environment::with_prefix("NETLOGIN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Failed to parse settings")
    }
}

/// System settings first, then the per-user file
fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(SYSTEM_SETTINGS)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("netlogin").join("config"));
    }
    paths
}
