//! Connectivity monitor subsystem.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;

use crate::config::ConnectionMonitorConfig;
use crate::connectivity::prober::{
    ProbeSettings, Prober, DEFAULT_CHECK_INTERVAL, DEFAULT_DNS_LIST, DEFAULT_DOMAIN_LIST,
    DEFAULT_TIMEOUT,
};
use crate::connectivity::state::{Connectivity, LinkStatus};
use crate::error::SubsystemError;
use crate::lifecycle::subsystem::{Lifecycle, Subsystem};
use crate::lifecycle::tracker::WorkTracker;

/// Subsystem name.
pub const NAME: &str = "internet_monitor";

/// Watches internet connectivity through a periodic [`Prober`].
pub struct ConnectionMonitor {
    lifecycle: Lifecycle<Prober>,
    settings: ProbeSettings,
    tracker: WorkTracker,
    link: ArcSwapOption<LinkStatus>,
}

impl ConnectionMonitor {
    /// Build a stopped monitor. Empty lists and zero durations take defaults.
    pub fn setup(
        config: Option<&ConnectionMonitorConfig>,
        tracker: &WorkTracker,
    ) -> Result<Self, SubsystemError> {
        let config = config.ok_or_else(|| SubsystemError::nil_config(NAME))?;

        let dns_list = if config.dns_list.is_empty() {
            DEFAULT_DNS_LIST.iter().map(|s| s.to_string()).collect()
        } else {
            config.dns_list.clone()
        };
        let domain_list = if config.domain_list.is_empty() {
            DEFAULT_DOMAIN_LIST.iter().map(|s| s.to_string()).collect()
        } else {
            config.domain_list.clone()
        };
        let interval = match config.check_interval_ms {
            0 => DEFAULT_CHECK_INTERVAL,
            ms => Duration::from_millis(ms),
        };
        let timeout = match config.probe_timeout_ms {
            0 => DEFAULT_TIMEOUT,
            ms => Duration::from_millis(ms),
        };

        Ok(Self {
            lifecycle: Lifecycle::configured(NAME),
            settings: ProbeSettings {
                dns_list,
                domain_list,
                interval,
                timeout,
                online_threshold: config.online_threshold,
                offline_threshold: config.offline_threshold,
            },
            tracker: tracker.clone(),
            link: ArcSwapOption::empty(),
        })
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// Last known connectivity. False, with a warning, when no prober exists.
    pub fn is_online(&self) -> bool {
        match self.link.load().as_ref() {
            Some(link) => link.is_online(),
            None => {
                tracing::warn!(subsystem = NAME, "is_online called but prober is not running");
                false
            }
        }
    }

    pub fn connectivity(&self) -> Connectivity {
        self.link
            .load()
            .as_ref()
            .map_or(Connectivity::Unknown, |link| link.current())
    }
}

impl Default for ConnectionMonitor {
    /// An unconfigured monitor: every lifecycle call fails with `NilSubsystem`.
    fn default() -> Self {
        Self {
            lifecycle: Lifecycle::unconfigured(NAME),
            settings: ProbeSettings {
                dns_list: Vec::new(),
                domain_list: Vec::new(),
                interval: DEFAULT_CHECK_INTERVAL,
                timeout: DEFAULT_TIMEOUT,
                online_threshold: 1,
                offline_threshold: 1,
            },
            tracker: WorkTracker::new(),
            link: ArcSwapOption::empty(),
        }
    }
}

#[async_trait]
impl Subsystem for ConnectionMonitor {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self) -> Result<(), SubsystemError> {
        self.lifecycle
            .start(|| async {
                match Prober::spawn(&self.settings, &self.tracker) {
                    Ok(prober) => {
                        self.link.store(Some(prober.status()));
                        Ok(prober)
                    }
                    Err(e) => Err(SubsystemError::resource(NAME, e)),
                }
            })
            .await
    }

    async fn stop(&self) -> Result<(), SubsystemError> {
        self.lifecycle
            .stop(|prober| async move {
                self.link.store(None);
                prober.shutdown().await;
            })
            .await
    }

    fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }
}

impl std::fmt::Debug for ConnectionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionMonitor")
            .field("lifecycle", &self.lifecycle)
            .field("settings", &self.settings)
            .finish()
    }
}
