use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::upload::DEFAULT_MAX_IMAGE_BYTES;

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_DIR: &str = "gallery";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub uploads: UploadsConfig,
    pub sync: SyncConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Base URL clients use to reach this server (upload URLs are built from it)
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            public_url: "http://localhost:3000".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Photo collection persistence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file holding the collection (empty = default data dir)
    pub photos_file: Option<String>,
}

impl StorageConfig {
    pub fn photos_path(&self) -> PathBuf {
        match self.photos_file {
            Some(ref path) => PathBuf::from(path),
            None => data_dir().join("photos.json"),
        }
    }
}

/// Uploaded image storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadsConfig {
    /// Directory for stored images (empty = default data dir)
    pub dir: Option<String>,
    pub max_image_bytes: usize,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

impl UploadsConfig {
    pub fn uploads_dir(&self) -> PathBuf {
        match self.dir {
            Some(ref dir) => PathBuf::from(dir),
            None => data_dir().join("uploads"),
        }
    }
}

/// Client polling policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub server_url: String,
    /// How often the poll timer fires
    pub poll_interval_secs: u64,
    /// Timer polls are skipped for this long after a local mutation
    pub quiet_period_secs: u64,
    /// Delay of the second refetch after a mutation
    pub verify_delay_ms: u64,
    /// A fetch taking longer than this is abandoned
    pub fetch_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3000".to_string(),
            poll_interval_secs: 30,
            quiet_period_secs: 30,
            verify_delay_ms: 2000,
            fetch_timeout_secs: 10,
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_secs(self.quiet_period_secs)
    }

    pub fn verify_delay(&self) -> Duration {
        Duration::from_millis(self.verify_delay_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}

impl Config {
    /// Get the configuration file path (`GALLERY_CONFIG` overrides)
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("GALLERY_CONFIG") {
            return Ok(PathBuf::from(path));
        }

        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join(APP_DIR);

        Ok(config_dir.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from the default path, then apply env overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from file, or create default if not exists
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;

            let config: Config = toml::from_str(&contents)
                .context("Failed to parse config file")?;

            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            tracing::info!("Wrote default config to {}", path.display());
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        fs::write(path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Environment wins over the file. Unparseable values are logged and ignored.
    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(port) = parse_var(&var, "GALLERY_PORT") {
            self.server.port = port;
        }
        if let Some(file) = var("GALLERY_PHOTOS_FILE") {
            self.storage.photos_file = Some(file);
        }
        if let Some(url) = var("GALLERY_SERVER_URL") {
            self.sync.server_url = url;
        }
    }

    /// Default config as TOML, printed by `gallery --print-config`.
    pub fn example_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_var<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T::Err: Display,
{
    let raw = var(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Invalid {} value {:?}: {}", key, raw, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.bind_address(), "0.0.0.0:3000");
        assert!(config.storage.photos_file.is_none());
        assert_eq!(config.uploads.max_image_bytes, 10 * 1024 * 1024);
        assert_eq!(config.sync.quiet_period(), Duration::from_secs(30));
        assert_eq!(config.sync.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.sync.verify_delay(), Duration::from_secs(2));
        assert_eq!(config.sync.fetch_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial_toml = r#"
[server]
port = 8080

[storage]
photos_file = "/srv/gallery/photos.json"
"#;

        let config: Config = toml::from_str(partial_toml).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.storage.photos_path(), PathBuf::from("/srv/gallery/photos.json"));
        assert_eq!(config.sync.quiet_period_secs, 30);
    }

    #[test]
    fn test_full_config_parsing() {
        let full_toml = r#"
[server]
host = "127.0.0.1"
port = 9000
public_url = "https://photos.example.org"

[storage]
photos_file = "photos.json"

[uploads]
dir = "/var/lib/gallery/uploads"
max_image_bytes = 1024

[sync]
server_url = "https://photos.example.org"
poll_interval_secs = 5
quiet_period_secs = 15
verify_delay_ms = 500
fetch_timeout_secs = 3
"#;

        let config: Config = toml::from_str(full_toml).unwrap();

        assert_eq!(config.server.bind_address(), "127.0.0.1:9000");
        assert_eq!(config.server.public_url, "https://photos.example.org");
        assert_eq!(config.uploads.uploads_dir(), PathBuf::from("/var/lib/gallery/uploads"));
        assert_eq!(config.uploads.max_image_bytes, 1024);
        assert_eq!(config.sync.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.sync.quiet_period(), Duration::from_secs(15));
        assert_eq!(config.sync.verify_delay(), Duration::from_millis(500));
        assert_eq!(config.sync.fetch_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_example_config_is_valid() {
        let example = Config::example_config();
        let parsed: Result<Config, _> = toml::from_str(&example);
        assert!(parsed.is_ok(), "Example config should be valid TOML");
        for section in ["[server]", "[uploads]", "[sync]"] {
            assert!(example.contains(section), "missing {section}");
        }
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let result: Result<Config, _> = toml::from_str("this is not valid [[ toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_missing_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gallery").join("config.toml");

        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.server.port, 3000);
        assert!(path.exists());
        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.sync.server_url, config.sync.server_url);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("GALLERY_PORT", "4321"),
            ("GALLERY_PHOTOS_FILE", "/tmp/p.json"),
            ("GALLERY_SERVER_URL", "http://gallery.lan"),
        ]);
        let mut config = Config::default();

        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.port, 4321);
        assert_eq!(config.storage.photos_path(), PathBuf::from("/tmp/p.json"));
        assert_eq!(config.sync.server_url, "http://gallery.lan");
    }

    #[test]
    fn test_invalid_env_port_is_ignored() {
        let mut config = Config::default();

        config.apply_env_overrides(|key| (key == "GALLERY_PORT").then(|| "not-a-port".to_string()));

        assert_eq!(config.server.port, 3000);
    }
}
