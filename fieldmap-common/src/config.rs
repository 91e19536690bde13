//! Configuration loading for fieldmap
//!
//! Resolution priority for every setting:
//! 1. Environment variable (`FIELDMAP_*`)
//! 2. TOML config file (`~/.config/fieldmap/config.toml`, then
//!    `/etc/fieldmap/config.toml` on Linux)
//! 3. Compiled default

use crate::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:6150";
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";

/// Public Overpass mirrors, tried in order. No SLA on any of them.
pub const DEFAULT_OVERPASS_ENDPOINTS: &[&str] = &[
    "https://overpass-api.de/api/interpreter",
    "https://overpass.kumi.systems/api/interpreter",
    "https://overpass.nchc.org.tw/api/interpreter",
];

/// Resolved service configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Socket address the HTTP server binds to
    pub bind_addr: String,
    /// SQLite database file path
    pub database_path: PathBuf,
    /// Application name, used in the outbound User-Agent
    pub app_name: String,
    /// Application URL, appended to the User-Agent when present
    pub app_url: Option<String>,
    /// Forward-geocoding (Nominatim-compatible) base URL
    pub geocoder_url: String,
    /// Overpass interpreter endpoints, tried in order
    pub overpass_endpoints: Vec<String>,
}

/// Raw TOML file contents (all keys optional)
#[derive(Debug, Default, Deserialize)]
struct TomlConfig {
    bind_addr: Option<String>,
    database_path: Option<String>,
    app_name: Option<String>,
    app_url: Option<String>,
    geocoder_url: Option<String>,
    overpass_endpoints: Option<Vec<String>>,
}

impl AppConfig {
    /// Load configuration with env > TOML > default priority
    pub fn load() -> Result<Self> {
        let file = load_toml_config()?;

        let bind_addr = std::env::var("FIELDMAP_BIND_ADDR")
            .ok()
            .or(file.bind_addr)
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        let database_path = std::env::var("FIELDMAP_DATABASE")
            .ok()
            .or(file.database_path)
            .map(PathBuf::from)
            .unwrap_or_else(default_database_path);

        let app_name = std::env::var("FIELDMAP_APP_NAME")
            .ok()
            .or(file.app_name)
            .unwrap_or_else(|| "fieldmap".to_string());

        let app_url = std::env::var("FIELDMAP_APP_URL").ok().or(file.app_url);

        let geocoder_url = std::env::var("FIELDMAP_GEOCODER_URL")
            .ok()
            .or(file.geocoder_url)
            .unwrap_or_else(|| DEFAULT_GEOCODER_URL.to_string());

        let overpass_endpoints = match std::env::var("FIELDMAP_OVERPASS_ENDPOINTS") {
            Ok(list) => list.split(',').map(|s| s.trim().to_string()).collect(),
            Err(_) => file.overpass_endpoints.unwrap_or_else(|| {
                DEFAULT_OVERPASS_ENDPOINTS
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            }),
        };

        Ok(Self {
            bind_addr,
            database_path,
            app_name,
            app_url,
            geocoder_url,
            overpass_endpoints,
        })
    }

    /// Outbound User-Agent: `"{app_name} ({app_url})"`.
    ///
    /// Nominatim's usage policy requires an identifying User-Agent, so the
    /// app name is always present even when no URL is configured.
    pub fn user_agent(&self) -> String {
        match &self.app_url {
            Some(url) => format!("{} ({})", self.app_name, url),
            None => self.app_name.clone(),
        }
    }
}

/// Parse the first config file found, or defaults when none exists
fn load_toml_config() -> Result<TomlConfig> {
    let Some(path) = find_config_file() else {
        return Ok(TomlConfig::default());
    };

    let contents = std::fs::read_to_string(&path)?;
    let config: TomlConfig = toml::from_str(&contents)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Locate the platform config file, if any
fn find_config_file() -> Option<PathBuf> {
    if let Some(dir) = dirs::config_dir() {
        let user_config = dir.join("fieldmap").join("config.toml");
        if user_config.exists() {
            return Some(user_config);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/fieldmap/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// OS-dependent default database location
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("fieldmap"))
        .unwrap_or_else(|| PathBuf::from("./fieldmap_data"))
        .join("fieldmap.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_includes_url_when_configured() {
        let config = AppConfig {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            database_path: PathBuf::from("/tmp/fieldmap.db"),
            app_name: "fieldmap".to_string(),
            app_url: Some("https://fieldmap.example".to_string()),
            geocoder_url: DEFAULT_GEOCODER_URL.to_string(),
            overpass_endpoints: vec![],
        };
        assert_eq!(config.user_agent(), "fieldmap (https://fieldmap.example)");
    }

    #[test]
    fn user_agent_is_bare_name_without_url() {
        let config = AppConfig {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            database_path: PathBuf::from("/tmp/fieldmap.db"),
            app_name: "fieldmap".to_string(),
            app_url: None,
            geocoder_url: DEFAULT_GEOCODER_URL.to_string(),
            overpass_endpoints: vec![],
        };
        assert_eq!(config.user_agent(), "fieldmap");
    }

    #[test]
    fn toml_parses_partial_files() {
        let config: TomlConfig = toml::from_str("app_name = \"canvass\"").unwrap();
        assert_eq!(config.app_name.as_deref(), Some("canvass"));
        assert!(config.bind_addr.is_none());
    }
}
