//! Service endpoint configuration.
//!
//! Values are resolved in three layers: built-in defaults, then an optional
//! TOML file, then `FLOWBENCH_*` environment variables.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

use crate::ServiceError;

/// Environment variable overriding [`ServiceConfig::base_url`]
pub const ENV_BASE_URL: &str = "FLOWBENCH_BASE_URL";
/// Environment variable supplying [`ServiceConfig::api_key`]
pub const ENV_API_KEY: &str = "FLOWBENCH_API_KEY";
/// Environment variable overriding [`ServiceConfig::timeout_seconds`]
pub const ENV_TIMEOUT_SECONDS: &str = "FLOWBENCH_TIMEOUT_SECONDS";

/// Where and how to reach the remote services
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL shared by all endpoints (e.g. "http://localhost:3000")
    pub base_url: String,
    /// Bearer token sent with every request; never written back to disk
    #[serde(skip_serializing, deserialize_with = "deserialize_api_key")]
    pub api_key: Option<SecretString>,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Path of the text generation endpoint
    pub generate_path: String,
    /// Path of the browser extraction endpoint
    pub extract_path: String,
    /// Path of the vector embed/search endpoint
    pub vector_path: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            api_key: None,
            timeout_seconds: 60,
            generate_path: "/api/generate".to_string(),
            extract_path: "/api/scrape".to_string(),
            vector_path: "/api/vector".to_string(),
        }
    }
}

fn deserialize_api_key<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .filter(|k| !k.trim().is_empty())
        .map(|k| SecretString::new(k.into())))
}

/// Default location of the config file (`<config dir>/flowbench/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("flowbench").join("config.toml"))
}

impl ServiceConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml(content: &str) -> Result<Self, ServiceError> {
        toml::from_str(content).map_err(|e| ServiceError::Config(e.to_string()))
    }

    /// Render as TOML (the API key is omitted)
    pub fn to_toml(&self) -> Result<String, ServiceError> {
        toml::to_string_pretty(self).map_err(|e| ServiceError::Config(e.to_string()))
    }

    /// Resolve the configuration.
    ///
    /// An explicit `path` must exist. Without one the default location is read
    /// when present. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, ServiceError> {
        let mut config = match path {
            Some(path) => Self::read_file(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::read_file(&path)?,
                None => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ServiceError> {
        info!("Loading service config from {:?}", path);
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServiceError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Apply `FLOWBENCH_*` overrides from `lookup`; unparsable values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.base_url = base_url;
        }
        if let Some(key) = lookup(ENV_API_KEY).filter(|v| !v.trim().is_empty()) {
            self.api_key = Some(SecretString::new(key.into()));
        }
        if let Some(timeout) = lookup(ENV_TIMEOUT_SECONDS).and_then(|v| v.trim().parse().ok()) {
            self.timeout_seconds = timeout;
        }
    }

    /// Check the base URL and timeout
    pub fn validate(&self) -> Result<(), ServiceError> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| ServiceError::Config(format!("invalid base URL {:?}: {}", self.base_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ServiceError::Config(
                "base URL must start with http:// or https://".to_string(),
            ));
        }
        if self.timeout_seconds == 0 {
            return Err(ServiceError::Config(
                "timeout_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
