use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cask_hash::{HashAlgorithm, HashConfig};
use cask_refs::LayoutConfig;
use cask_types::Namespace;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

pub const ENV_STORAGE_MODE: &str = "CASK_STORAGE_MODE";
pub const ENV_ROOT_DIR: &str = "CASK_ROOT_DIR";
pub const ENV_DEFAULT_TTL_HOURS: &str = "CASK_DEFAULT_TTL_HOURS";
pub const ENV_HASH_ALGORITHM: &str = "CASK_HASH_ALGORITHM";
pub const ENV_HASH_LENGTH: &str = "CASK_HASH_LENGTH";

/// Which backend each namespace handler is built on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    Memory,
    LocalDisk,
}

impl std::str::FromStr for StorageMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "memory" => Ok(Self::Memory),
            "local_disk" | "disk" => Ok(Self::LocalDisk),
            other => Err(EngineError::Config(format!("unknown storage mode: {other}"))),
        }
    }
}

/// Per-namespace overrides.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    pub ttl_hours: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub storage_mode: StorageMode,
    pub root_dir: PathBuf,
    pub default_ttl_hours: u32,
    pub hash: HashConfig,
    pub layout: LayoutConfig,
    pub namespaces: BTreeMap<String, NamespaceConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_mode: StorageMode::Memory,
            root_dir: PathBuf::from("/tmp/cache"),
            default_ttl_hours: 24,
            hash: HashConfig::default(),
            layout: LayoutConfig::default(),
            namespaces: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml(text: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> EngineResult<String> {
        toml::to_string_pretty(self).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Apply `CASK_*` overrides from the process environment.
    pub fn with_env(self) -> EngineResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `CASK_*` overrides from an arbitrary lookup.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> EngineResult<Self> {
        if let Some(mode) = lookup(ENV_STORAGE_MODE) {
            self.storage_mode = mode.parse()?;
        }
        if let Some(root) = lookup(ENV_ROOT_DIR) {
            self.root_dir = PathBuf::from(root);
        }
        if let Some(ttl) = lookup(ENV_DEFAULT_TTL_HOURS) {
            self.default_ttl_hours = ttl
                .parse()
                .map_err(|_| EngineError::Config(format!("{ENV_DEFAULT_TTL_HOURS}: not a number: {ttl}")))?;
        }
        if let Some(algorithm) = lookup(ENV_HASH_ALGORITHM) {
            self.hash.algorithm = algorithm.parse::<HashAlgorithm>()?;
        }
        if let Some(length) = lookup(ENV_HASH_LENGTH) {
            self.hash.length = length
                .parse()
                .map_err(|_| EngineError::Config(format!("{ENV_HASH_LENGTH}: not a number: {length}")))?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> EngineResult<()> {
        self.hash
            .validate()
            .map_err(|e| EngineError::Config(e.to_string()))?;
        if self.layout.shard_width == 0 {
            return Err(EngineError::Config("layout.shard_width must be at least 1".into()));
        }
        for name in self.namespaces.keys() {
            Namespace::new(name.as_str())?;
        }
        Ok(())
    }

    /// TTL recorded for entries stored in `namespace`.
    pub fn ttl_hours(&self, namespace: &Namespace) -> u32 {
        self.namespaces
            .get(namespace.as_str())
            .and_then(|ns| ns.ttl_hours)
            .unwrap_or(self.default_ttl_hours)
    }
}
