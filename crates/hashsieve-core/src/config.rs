//! Pipeline configuration types.

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::algorithm::HashAlgorithm;
use crate::error::PipelineError;

/// Maximum number of records hashed at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct Concurrency(usize);

impl Concurrency {
    /// Allowed ceiling values.
    pub const OPTIONS: [usize; 6] = [1, 2, 4, 8, 16, 32];

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for Concurrency {
    fn default() -> Self {
        Self(4)
    }
}

impl TryFrom<usize> for Concurrency {
    type Error = PipelineError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        if Self::OPTIONS.contains(&value) {
            Ok(Self(value))
        } else {
            Err(PipelineError::InvalidConcurrency { value })
        }
    }
}

impl From<Concurrency> for usize {
    fn from(value: Concurrency) -> Self {
        value.0
    }
}

impl std::fmt::Display for Concurrency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Configuration for a hashing pipeline.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum number of concurrent hash computations.
    #[builder(default)]
    pub concurrency: Concurrency,

    /// Algorithm captured by records at dispatch.
    #[builder(default)]
    pub algorithm: HashAlgorithm,

    /// Read buffer size for streaming file content.
    #[builder(default = "64 * 1024")]
    pub chunk_size: usize,

    /// Capacity of the event broadcast channel.
    #[builder(default = "1024")]
    pub event_capacity: usize,

    /// Follow symbolic links while expanding directories.
    #[builder(default = "false")]
    pub follow_symlinks: bool,
}

impl PipelineConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.chunk_size == Some(0) {
            return Err("Chunk size must be greater than zero".to_string());
        }
        if self.event_capacity == Some(0) {
            return Err("Event capacity must be greater than zero".to_string());
        }
        if self.algorithm == Some(HashAlgorithm::None) {
            return Err("An algorithm must be selected".to_string());
        }
        Ok(())
    }
}

impl PipelineConfig {
    /// Create a new config builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Default location of the config file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hashsieve")
            .join("config.toml")
    }

    /// Load a config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load the config at `path`, falling back to defaults when it is missing.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                message: "chunk_size must be greater than zero".to_string(),
            });
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid {
                message: "event_capacity must be greater than zero".to_string(),
            });
        }
        if !self.algorithm.is_selectable() {
            return Err(ConfigError::Invalid {
                message: "algorithm must be one of md5, sha1, sha256, sha384, sha512".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: Concurrency::default(),
            algorithm: HashAlgorithm::Md5,
            chunk_size: 64 * 1024,
            event_capacity: 1024,
            follow_symlinks: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_concurrency_options() {
        for value in Concurrency::OPTIONS {
            assert_eq!(Concurrency::try_from(value).unwrap().get(), value);
        }
        assert!(Concurrency::try_from(3).is_err());
        assert!(Concurrency::try_from(0).is_err());
        assert_eq!(Concurrency::default().get(), 4);
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::builder()
            .concurrency(Concurrency::try_from(8).unwrap())
            .algorithm(HashAlgorithm::Sha256)
            .chunk_size(4096usize)
            .build()
            .unwrap();

        assert_eq!(config.concurrency.get(), 8);
        assert_eq!(config.algorithm, HashAlgorithm::Sha256);
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.event_capacity, 1024);
    }

    #[test]
    fn test_config_builder_rejects_zero_chunk() {
        assert!(PipelineConfig::builder().chunk_size(0usize).build().is_err());
        assert!(
            PipelineConfig::builder()
                .algorithm(HashAlgorithm::None)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_load_partial_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "concurrency = 16\nalgorithm = \"sha512\"\n").unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.concurrency.get(), 16);
        assert_eq!(config.algorithm, HashAlgorithm::Sha512);
        assert_eq!(config.chunk_size, 64 * 1024);
    }

    #[test]
    fn test_load_rejects_bad_concurrency() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "concurrency = 3\n").unwrap();

        assert!(matches!(
            PipelineConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let temp = TempDir::new().unwrap();
        let config = PipelineConfig::load_or_default(&temp.path().join("absent.toml")).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }
}
