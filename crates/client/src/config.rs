use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_ENDPOINT: &str = "https://iaeav.iuii.ua.es/api/v1/";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server: ServerConfig,
    pub upload: UploadDefaults,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub endpoint: String,
    /// Environment variable holding the long-lived user credential.
    pub token_env: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            token_env: "VOXDROP_TOKEN".into(),
            connect_timeout_secs: 20,
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct UploadDefaults {
    pub default_task_id: String,
    pub default_sample_rate: u32,
    pub default_channels: u16,
}

impl Default for UploadDefaults {
    fn default() -> Self {
        Self {
            default_task_id: "default".into(),
            default_sample_rate: 16_000,
            default_channels: 1,
        }
    }
}

impl ClientConfig {
    /// Load from `path` when given, otherwise from the platform config directory.
    ///
    /// An explicit path must exist; a missing default file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::read(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::read(&path),
                _ => {
                    tracing::debug!("no config file found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("es", "iuii", "voxdrop")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), endpoint = %config.server.endpoint, "loaded config");
        Ok(config)
    }
}
