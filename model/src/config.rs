use crate::listing::SortDirection;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "conductor.toml";
pub const DEFAULT_DATA_FILE: &str = "conductor.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorConfig {
    /// Snapshot file holding the registry
    pub data_file: PathBuf,
    /// Log filter used when RUST_LOG is unset
    pub log_level: String,
    /// Check the acting user's permissions before mutating
    pub enforce_permissions: bool,
    pub listing: ListingDefaults,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
            log_level: "info".to_string(),
            enforce_permissions: true,
            listing: ListingDefaults::default(),
        }
    }
}

impl ConductorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a TOML file; missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&contents)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(contents: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_data_file(mut self, data_file: impl Into<PathBuf>) -> Self {
        self.data_file = data_file.into();
        self
    }

    pub fn with_log_level(mut self, log_level: impl Into<String>) -> Self {
        self.log_level = log_level.into();
        self
    }

    pub fn with_enforce_permissions(mut self, enforce: bool) -> Self {
        self.enforce_permissions = enforce;
        self
    }

    pub fn with_default_sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.listing.sort_field = Some(field.into());
        self.listing.sort_direction = direction;
        self
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.data_file.as_os_str().is_empty() {
            return Err(invalid("data_file cannot be empty"));
        }

        const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
        if !LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(invalid(format!(
                "log_level must be one of {}",
                LEVELS.join(", ")
            )));
        }

        if let Some(field) = &self.listing.sort_field {
            if field.trim().is_empty() {
                return Err(invalid("listing.sort_field cannot be blank"));
            }
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        message: message.into(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingDefaults {
    pub sort_field: Option<String>,
    pub sort_direction: SortDirection,
}
