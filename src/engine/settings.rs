//! Process-level settings: what the command line says, layered over the
//! configuration file.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;
use crate::{communications, connectivity, database, dispatch, http, orders, portfolio};

/// Default bound on a single subsystem's `stop`.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Explicitly supplied boolean flags, keyed by subsystem name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSet {
    flags: HashMap<String, bool>,
}

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: bool) -> &mut Self {
        self.flags.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<bool> {
        self.flags.get(name).copied()
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.flags.contains_key(name)
    }

    /// The flag's value if it was supplied, otherwise `config_value`.
    pub fn with_bool(&self, name: &str, config_value: bool) -> bool {
        self.get(name).unwrap_or(config_value)
    }
}

/// Engine settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Configuration file; searched for when absent.
    pub config_path: Option<PathBuf>,
    /// Alternate data directory. Implies dry run.
    pub data_dir: Option<PathBuf>,
    pub dry_run: bool,
    pub verbose: bool,
    pub flags: FlagSet,
    /// Per-subsystem stop bound; `None` waits indefinitely.
    pub stop_timeout: Option<Duration>,
    /// Background drain bound; `None` waits indefinitely.
    pub drain_timeout: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_path: None,
            data_dir: None,
            dry_run: false,
            verbose: false,
            flags: FlagSet::default(),
            stop_timeout: Some(DEFAULT_STOP_TIMEOUT),
            drain_timeout: None,
        }
    }
}

impl Settings {
    /// No configuration is written back on shutdown.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run || self.data_dir.is_some()
    }

    /// The configuration the subsystems run with: `config` plus the
    /// command-line overlay. The file's copy is left untouched.
    pub fn apply(&self, config: &Config) -> Config {
        let mut effective = config.clone();

        if let Some(dir) = &self.data_dir {
            effective.data_directory = dir.display().to_string();
        }
        if self.verbose {
            effective.database.verbose = true;
            effective.order_manager.verbose = true;
        }

        let flags = &self.flags;
        effective.database.enabled = flags.with_bool(database::NAME, effective.database.enabled);
        effective.connection_monitor.enabled =
            flags.with_bool(connectivity::NAME, effective.connection_monitor.enabled);
        effective.dispatch.enabled = flags.with_bool(dispatch::NAME, effective.dispatch.enabled);
        effective.communications.enabled =
            flags.with_bool(communications::NAME, effective.communications.enabled);
        effective.portfolio.enabled = flags.with_bool(portfolio::NAME, effective.portfolio.enabled);
        effective.order_manager.enabled =
            flags.with_bool(orders::NAME, effective.order_manager.enabled);
        effective.remote_control.enabled =
            flags.with_bool(http::NAME, effective.remote_control.enabled);

        effective
    }
}
