//! Configuration persistence boundary.
//!
//! The engine loads its configuration once when it is constructed and saves
//! it once per stop through a [`ConfigStore`]; it never touches files directly.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::loader::{load_config, resolve_config_path, save_config, ConfigError};
use crate::config::schema::Config;

/// Where the configuration lives.
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<Config, ConfigError>;

    fn save(&self, config: &Config) -> Result<(), ConfigError>;

    /// Human-readable location for logs.
    fn location(&self) -> String;
}

/// A configuration file on disk, TOML or JSON by extension.
#[derive(Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Use `explicit` if given, otherwise search the default locations.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        resolve_config_path(explicit).map(Self::new)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Result<Config, ConfigError> {
        load_config(&self.path)
    }

    fn save(&self, config: &Config) -> Result<(), ConfigError> {
        save_config(&self.path, config)
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

impl fmt::Debug for FileConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FileConfigStore").field(&self.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("config.toml"));
        assert!(store.load().is_err());

        let mut config = Config::default();
        config.portfolio.summary_interval_secs = 5;
        store.save(&config).unwrap();

        assert_eq!(store.load().unwrap(), config);
        assert!(store.location().ends_with("config.toml"));
    }
}
