//! Client configuration

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fallback backend origin variable shared with the web frontend
const LEGACY_BASE_URL_VAR: &str = "NEXT_PUBLIC_API_BASE_URL";

/// Shelf client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Backend origin, e.g. `https://shelf.example.edu/api`
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// OAuth client id used for Google sign-in
    #[serde(default)]
    pub google_client_id: Option<String>,
    /// Refresh this many seconds before the access token expires
    #[serde(default = "default_refresh_buffer")]
    pub refresh_buffer_secs: u64,
    /// Give up on a refresh call after this many seconds
    #[serde(default = "default_refresh_timeout")]
    pub refresh_timeout_secs: u64,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Directory for remembered credentials; in-memory only when unset
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
}

fn default_api_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_refresh_buffer() -> u64 {
    60
}

fn default_refresh_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            google_client_id: None,
            refresh_buffer_secs: default_refresh_buffer(),
            refresh_timeout_secs: default_refresh_timeout(),
            request_timeout_secs: default_request_timeout(),
            storage_dir: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from `SHELF_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load configuration from a TOML file, with environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load(Some(path.as_ref()))
    }

    fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut defaults = Self::default();
        if let Ok(url) = std::env::var(LEGACY_BASE_URL_VAR) {
            defaults.api_base_url = url;
        }

        let mut builder = Config::builder().add_source(Config::try_from(&defaults)?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix("SHELF")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::Message("api_base_url must not be empty".into()));
        }
        if self.refresh_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "refresh_timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn refresh_buffer(&self) -> Duration {
        Duration::from_secs(self.refresh_buffer_secs)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Default credential directory under the user's data dir
    pub fn default_storage_dir() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join("shelf"))
    }
}
