//! Configuration persistence for the rankpart CLI.
//!
//! Configuration is loaded with the following priority:
//! 1. CLI arguments (highest priority)
//! 2. Launcher environment (`WORLD_SIZE`, `LOCAL_WORLD_SIZE`)
//! 3. Config file (~/.config/rankpart/config.toml)
//! 4. Default values (lowest priority)

use std::fs;
use std::path::{Path, PathBuf};

use rankpart_core::ParallelConfig;
use serde::{Deserialize, Serialize};

/// Persistent configuration stored in TOML format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Total number of processes in the job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub world_size: Option<usize>,

    /// Tensor parallel size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tensor_parallel_size: Option<usize>,

    /// Pipeline parallel size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_parallel_size: Option<usize>,

    /// Context parallel size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_parallel_size: Option<usize>,

    /// Expert parallel size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expert_parallel_size: Option<usize>,

    /// Processes per host. Defaults to `world_size` (a single host).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_world_size: Option<usize>,

    /// Requested replicas per data-parallel group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replica_count: Option<usize>,

    /// Log level (trace, debug, info, warn, error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl PlannerConfig {
    /// Get the default config file path.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("rankpart").join("config.toml"))
    }

    /// Load configuration from the default path.
    ///
    /// A missing or unreadable file yields the empty config.
    pub fn load() -> Self {
        Self::default_path()
            .and_then(|path| Self::load_from(&path).ok())
            .unwrap_or_default()
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&content).map_err(ConfigError::Parse)
    }

    /// Sizes exported by a torchrun-style launcher.
    pub fn from_env() -> Self {
        Self {
            world_size: env_usize("WORLD_SIZE"),
            local_world_size: env_usize("LOCAL_WORLD_SIZE"),
            ..Default::default()
        }
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::default_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }

        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        fs::write(path, content).map_err(ConfigError::Io)?;
        Ok(())
    }

    /// Merge with another config, preferring values from `other`.
    pub fn merge(&mut self, other: &PlannerConfig) {
        if other.world_size.is_some() {
            self.world_size = other.world_size;
        }
        if other.tensor_parallel_size.is_some() {
            self.tensor_parallel_size = other.tensor_parallel_size;
        }
        if other.pipeline_parallel_size.is_some() {
            self.pipeline_parallel_size = other.pipeline_parallel_size;
        }
        if other.context_parallel_size.is_some() {
            self.context_parallel_size = other.context_parallel_size;
        }
        if other.expert_parallel_size.is_some() {
            self.expert_parallel_size = other.expert_parallel_size;
        }
        if other.local_world_size.is_some() {
            self.local_world_size = other.local_world_size;
        }
        if other.replica_count.is_some() {
            self.replica_count = other.replica_count;
        }
        if other.log_level.is_some() {
            self.log_level = other.log_level.clone();
        }
    }

    /// Resolve into a validated [`ParallelConfig`], filling gaps with defaults.
    pub fn to_parallel_config(&self) -> Result<ParallelConfig, ConfigError> {
        let world_size = self.world_size.unwrap_or(1);
        let cfg = ParallelConfig {
            world_size,
            tensor_parallel_size: self.tensor_parallel_size.unwrap_or(1),
            pipeline_parallel_size: self.pipeline_parallel_size.unwrap_or(1),
            context_parallel_size: self.context_parallel_size.unwrap_or(1),
            expert_parallel_size: self.expert_parallel_size.unwrap_or(1),
            local_world_size: self.local_world_size.unwrap_or(world_size),
            replica_count: self.replica_count.unwrap_or(1),
        };
        cfg.validate().map_err(ConfigError::Invalid)?;
        Ok(cfg)
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading/writing config file.
    Io(std::io::Error),
    /// Error parsing TOML.
    Parse(toml::de::Error),
    /// Error serializing to TOML.
    Serialize(toml::ser::Error),
    /// No config directory available.
    NoConfigDir,
    /// Sizes do not describe a valid job.
    Invalid(rankpart_core::ConfigError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Serialize(e) => write!(f, "Serialize error: {}", e),
            ConfigError::NoConfigDir => write!(f, "No config directory available"),
            ConfigError::Invalid(e) => write!(f, "Invalid config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = PlannerConfig {
            world_size: Some(64),
            tensor_parallel_size: Some(8),
            replica_count: Some(2),
            ..Default::default()
        };

        config.save_to(&path).unwrap();
        let loaded = PlannerConfig::load_from(&path).unwrap();

        assert_eq!(loaded, config);
        assert_eq!(loaded.pipeline_parallel_size, None);
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("rankpart").join("config.toml");

        PlannerConfig::default().save_to(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "world_size = \"lots\"").unwrap();

        let err = PlannerConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_merge() {
        let mut base = PlannerConfig {
            world_size: Some(16),
            replica_count: Some(2),
            ..Default::default()
        };

        let override_config = PlannerConfig {
            replica_count: Some(4),
            local_world_size: Some(4),
            ..Default::default()
        };

        base.merge(&override_config);

        assert_eq!(base.world_size, Some(16)); // Unchanged
        assert_eq!(base.replica_count, Some(4)); // Overridden
        assert_eq!(base.local_world_size, Some(4)); // Added
    }

    #[test]
    fn test_defaults_are_single_host() {
        let cfg = PlannerConfig {
            world_size: Some(8),
            ..Default::default()
        }
        .to_parallel_config()
        .unwrap();

        assert_eq!(cfg.local_world_size, 8);
        assert_eq!(cfg.num_hosts(), 1);
        assert_eq!(cfg.replica_count, 1);
    }

    #[test]
    fn test_invalid_sizes_rejected() {
        let err = PlannerConfig {
            world_size: Some(10),
            tensor_parallel_size: Some(4),
            ..Default::default()
        }
        .to_parallel_config()
        .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().starts_with("Invalid config:"));
    }
}
