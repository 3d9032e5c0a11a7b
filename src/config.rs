//! Configuration file parsing
//!
//! TOML configuration for the server (`koha.toml`) and the client
//! (`mochi.toml`). A missing file means defaults; both loaders write the
//! defaults out so operators have something to edit.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default server bind address
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";

/// Default client server URL
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Packages published at startup
    #[serde(default, rename = "package", skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<PackageSource>,
}

/// Server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Address to listen on
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Catalog store directory
    #[serde(default = "default_storage")]
    pub storage: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            storage: default_storage(),
            log_level: default_log_level(),
        }
    }
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

fn default_storage() -> PathBuf {
    PathBuf::from("instance")
}

fn default_log_level() -> String {
    "info".to_string()
}

/// A file hosted under a package name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSource {
    /// Package name
    pub name: String,

    /// Path to the file
    pub file: PathBuf,
}

impl ServerConfig {
    /// Load configuration from a file, writing defaults if it is missing.
    ///
    /// Relative paths inside the file are resolved against its directory.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::parse(&std::fs::read_to_string(path)?)?
        } else {
            log::info!("Writing default server configuration to {:?}", path);
            let config = Self::default();
            write_toml(path, &config)?;
            config
        };
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Parse configuration from a string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        if self.server.storage.is_relative() {
            self.server.storage = base.join(&self.server.storage);
        }
        for package in &mut self.packages {
            if package.file.is_relative() {
                package.file = base.join(&package.file);
            }
        }
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for package in &self.packages {
            crate::protocol::validate_package_name(&package.name)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            if !seen.insert(package.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate package: {}",
                    package.name
                )));
            }
        }
        Ok(())
    }
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the server
    #[serde(default = "default_server_url")]
    pub server: String,

    /// Bearer token sent with every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_client_log_level")]
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: default_server_url(),
            token: None,
            timeout_secs: default_timeout_secs(),
            log_level: default_client_log_level(),
        }
    }
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_client_log_level() -> String {
    "warn".to_string()
}

impl ClientConfig {
    /// Load configuration from a file, writing defaults if it is missing
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::parse(&std::fs::read_to_string(path)?)
        } else {
            let config = Self::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Parse configuration from a string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write configuration to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        self.validate()?;
        write_toml(path.as_ref(), self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.server.starts_with("http://") || self.server.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "server must be an http(s) URL: {}",
                self.server
            )));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}

fn write_toml<T: Serialize>(path: &Path, value: &T) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, toml::to_string_pretty(value)?)?;
    Ok(())
}
