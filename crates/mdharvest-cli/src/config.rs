//! Configuration loading from TOML files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global configuration for mdharvest
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub fetch: FetchConfig,
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Harvested objsets are written under `<save_dir>/<collection id>/`.
    pub save_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("./harvested"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Page size override for paginated fetchers.
    pub page_size: Option<usize>,
    /// X-NXDocumentProperties header for Nuxeo harvests.
    pub nuxeo_properties: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: None,
            nuxeo_properties: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub base_url: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://registry.cdlib.org/api/v1/collection/".to_string(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Load from ./mdharvest.toml, then ~/.config/mdharvest/config.toml,
    /// falling back to defaults.
    pub fn load() -> Result<Self> {
        let local = PathBuf::from("./mdharvest.toml");
        if local.is_file() {
            return Self::from_file(&local);
        }
        if let Ok(home) = std::env::var("HOME") {
            let user = PathBuf::from(home).join(".config/mdharvest/config.toml");
            if user.is_file() {
                return Self::from_file(&user);
            }
        }
        Ok(Self::default())
    }
}
