//! Shell configuration loaded from YAML.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::policy::{SecurityPolicy, SecurityProfile};
use crate::shell::{DEFAULT_HOME, DEFAULT_HOSTNAME};
use crate::storage::{ProviderArgs, StorageError};

/// Errors loading configuration or building a shell from it.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// The configuration is not valid YAML for [`ShellConfig`]
    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// The configured provider could not be created
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Which storage provider to use and its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Registered provider name (`memory`, `sqlite`, `s3`)
    pub name: String,
    /// Provider-specific arguments
    pub args: ProviderArgs,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "memory".to_string(),
            args: ProviderArgs::new(),
        }
    }
}

/// A security profile plus per-field overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Base profile
    pub profile: SecurityProfile,
    /// Override of the per-file size limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_size: Option<u64>,
    /// Override of the total size limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_total_size: Option<u64>,
    /// Override of read-only mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
    /// Override of the allowed path prefixes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_paths: Option<Vec<String>>,
    /// Override of the denied path prefixes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denied_paths: Option<Vec<String>>,
    /// Override of the denied name patterns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denied_patterns: Option<Vec<String>>,
    /// Override of the maximum path depth
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_path_depth: Option<usize>,
}

impl SecurityConfig {
    /// The profile's policy with the overrides applied.
    pub fn to_policy(&self) -> SecurityPolicy {
        let mut policy = self.profile.policy();
        if let Some(bytes) = self.max_file_size {
            policy = policy.with_max_file_size(bytes);
        }
        if let Some(bytes) = self.max_total_size {
            policy = policy.with_max_total_size(bytes);
        }
        if let Some(read_only) = self.read_only {
            policy = policy.with_read_only(read_only);
        }
        if let Some(paths) = &self.allowed_paths {
            policy = policy.with_allowed_paths(paths);
        }
        if let Some(paths) = &self.denied_paths {
            policy = policy.with_denied_paths(paths);
        }
        if let Some(patterns) = &self.denied_patterns {
            policy = policy.with_denied_patterns(patterns);
        }
        if let Some(depth) = self.max_path_depth {
            policy = policy.with_max_path_depth(depth);
        }
        policy
    }
}

/// Settings for agent runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// Timeout for definitions that do not set one
    #[serde(
        rename = "default_timeout_ms",
        with = "optional_duration_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_timeout: Option<Duration>,
    /// Simulated generation latency of the mock model
    #[serde(rename = "mock_latency_ms", with = "duration_ms")]
    pub mock_latency: Duration,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            default_timeout: None,
            mock_latency: Duration::from_millis(100),
        }
    }
}

/// Complete shell configuration. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Storage provider
    pub provider: ProviderConfig,
    /// Security policy, none by default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityConfig>,
    /// Host name shown in the prompt
    pub hostname: String,
    /// Home directory; created if missing and entered at startup
    pub home: String,
    /// Variables merged over the default environment
    pub environment: BTreeMap<String, String>,
    /// Agent settings
    pub agents: AgentsConfig,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            security: None,
            hostname: DEFAULT_HOSTNAME.to_string(),
            home: DEFAULT_HOME.to_string(),
            environment: BTreeMap::new(),
            agents: AgentsConfig::default(),
        }
    }
}

impl ShellConfig {
    /// Parse configuration from YAML text. An empty document yields the
    /// defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Render as YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Helper for serializing Duration as milliseconds
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

mod optional_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration
            .map(|d| d.as_millis() as u64)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = Option::<u64>::deserialize(deserializer)?;
        Ok(ms.map(Duration::from_millis))
    }
}
