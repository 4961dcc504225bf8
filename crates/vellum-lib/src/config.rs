//! Repository configuration.
//!
//! The configuration is a TOML file with one `[[repositories]]` table per
//! repository. Every field has a default, so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::model::{Ace, Acl};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VellumConfig {
    pub locks: LockConfig,
    pub repositories: Vec<RepositoryConfig>,
}

impl Default for VellumConfig {
    fn default() -> Self {
        Self {
            locks: LockConfig::default(),
            repositories: vec![RepositoryConfig::default()],
        }
    }
}

impl VellumConfig {
    /// `<config dir>/vellum/config.toml`, e.g. `~/.config/vellum/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vellum")
            .join("config.toml")
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load `path` if it exists, the defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: VellumConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for repo in &self.repositories {
            if repo.id.trim().is_empty() {
                return Err(ConfigError::Invalid("repository id must not be empty".into()));
            }
            if !seen.insert(repo.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate repository id: {}",
                    repo.id
                )));
            }
            if repo.root_folder_id.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "{}: root_folder_id must not be empty",
                    repo.id
                )));
            }
            if repo.executor.thread_max == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{}: executor.thread_max must be at least 1",
                    repo.id
                )));
            }
        }
        Ok(())
    }

    pub fn repository(&self, id: &str) -> Option<&RepositoryConfig> {
        self.repositories.iter().find(|r| r.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Entry count above which idle per-object locks are evicted
    pub prune_threshold: usize,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            prune_threshold: 4096,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub id: String,
    pub root_folder_id: String,
    /// Display alias of unauthenticated callers
    pub principal_anonymous: String,
    /// Display alias matching every caller
    pub principal_anyone: String,
    pub admins: Vec<String>,
    /// Local ACL of the root folder, in display form
    pub root_acl: Vec<AceConfig>,
    pub executor: ExecutorConfig,
    pub capabilities: CapabilitiesConfig,
    pub cache: CacheConfig,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            root_folder_id: "root".to_string(),
            principal_anonymous: "anonymous".to_string(),
            principal_anyone: "anyone".to_string(),
            admins: vec!["admin".to_string()],
            root_acl: vec![AceConfig {
                principal: "anyone".to_string(),
                permissions: vec!["cmis:read".to_string()],
            }],
            executor: ExecutorConfig::default(),
            capabilities: CapabilitiesConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl RepositoryConfig {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    pub fn root_acl(&self) -> Acl {
        Acl::new(
            self.root_acl
                .iter()
                .map(|a| Ace::new(&a.principal, a.permissions.iter().cloned()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AceConfig {
    pub principal: String,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Worker count of bulk update and tree delete pools
    pub thread_max: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { thread_max: 8 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilitiesConfig {
    pub unique_name_check: bool,
    /// When false, children of the root start with their own ACL
    pub inherit_at_top_level: bool,
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            unique_name_check: true,
            inherit_at_top_level: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub view: FacetConfig,
    pub content: FacetConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacetConfig {
    pub enabled: bool,
    pub capacity: usize,
}

impl Default for FacetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 10_000,
        }
    }
}
