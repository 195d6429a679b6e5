//! Shutdown sequencer.
//!
//! # Responsibilities
//! - Fold subsystem-owned state back into the configuration before anything stops
//! - Stop every running subsystem, best effort, in shutdown order
//! - Bound each `stop` so one stuck subsystem cannot hold the process hostage
//!
//! # Design Decisions
//! - Individual stop errors are logged and counted, never escalated
//! - Handles that are nil or not running are skipped without calling `stop`
//! - Persisting the configuration and draining background work belong to the
//!   engine, which owns the store and the tracker

use std::time::Duration;

use crate::config::Config;
use crate::lifecycle::subsystem::SubsystemHandle;
use crate::observability::metrics;

/// What happened during one shutdown pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub stopped: Vec<String>,
    pub failed: Vec<String>,
    pub timed_out: Vec<String>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.timed_out.is_empty()
    }
}

/// Let every configured subsystem write its persisted state into `config`.
pub fn capture_all<'a, I>(handles: I, config: &mut Config)
where
    I: IntoIterator<Item = &'a SubsystemHandle>,
{
    for handle in handles {
        if handle.is_configured() {
            handle.capture_state(config);
        }
    }
}

/// Stop each running handle in iteration order.
pub async fn stop_all<'a, I>(handles: I, stop_timeout: Option<Duration>) -> ShutdownReport
where
    I: IntoIterator<Item = &'a SubsystemHandle>,
{
    let mut report = ShutdownReport::default();

    for handle in handles {
        if !handle.is_running() {
            continue;
        }
        let name = handle.name().to_string();
        tracing::info!(subsystem = %name, "Stopping subsystem...");

        let result = match stop_timeout {
            Some(limit) => match tokio::time::timeout(limit, handle.stop()).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::error!(
                        subsystem = %name,
                        timeout_ms = limit.as_millis() as u64,
                        "Subsystem stop timed out"
                    );
                    metrics::record_subsystem_failure(&name, "stop", "timeout");
                    report.timed_out.push(name);
                    continue;
                }
            },
            None => handle.stop().await,
        };

        match result {
            Ok(()) => {
                metrics::record_subsystem_running(&name, false);
                tracing::info!(subsystem = %name, "Subsystem stopped");
                report.stopped.push(name);
            }
            Err(e) => {
                metrics::record_subsystem_failure(&name, "stop", e.as_label());
                tracing::error!(subsystem = %name, error = %e, "Subsystem failed to stop");
                report.failed.push(name);
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SubsystemError;
    use crate::lifecycle::subsystem::{Lifecycle, Subsystem};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Slow {
        lifecycle: Lifecycle<()>,
        teardown: Duration,
    }

    impl Slow {
        fn new(name: &'static str, teardown: Duration) -> Arc<Self> {
            Arc::new(Self {
                lifecycle: Lifecycle::configured(name),
                teardown,
            })
        }
    }

    #[async_trait]
    impl Subsystem for Slow {
        fn name(&self) -> &str {
            self.lifecycle.name()
        }

        async fn start(&self) -> Result<(), SubsystemError> {
            self.lifecycle.start(|| async { Ok(()) }).await
        }

        async fn stop(&self) -> Result<(), SubsystemError> {
            let teardown = self.teardown;
            self.lifecycle
                .stop(|_| async move { tokio::time::sleep(teardown).await })
                .await
        }

        fn is_running(&self) -> bool {
            self.lifecycle.is_running()
        }

        fn capture_state(&self, config: &mut Config) {
            config.name = format!("captured-by-{}", self.lifecycle.name());
        }
    }

    #[tokio::test]
    async fn test_stops_only_running_subsystems() {
        let a = Slow::new("a", Duration::ZERO);
        let b = Slow::new("b", Duration::ZERO);
        a.start().await.unwrap();

        let handles = vec![
            SubsystemHandle::new(a.clone()),
            SubsystemHandle::new(b.clone()),
            SubsystemHandle::nil("ghost"),
        ];
        let report = stop_all(handles.iter().rev(), None).await;

        assert_eq!(report.stopped, vec!["a"]);
        assert!(report.is_clean());
        assert!(handles.iter().all(|h| !h.is_running()));
    }

    #[tokio::test]
    async fn test_slow_stop_is_bounded() {
        let stuck = Slow::new("stuck", Duration::from_secs(60));
        let quick = Slow::new("quick", Duration::ZERO);
        stuck.start().await.unwrap();
        quick.start().await.unwrap();

        let handles = [SubsystemHandle::new(stuck), SubsystemHandle::new(quick.clone())];
        let report = stop_all(handles.iter(), Some(Duration::from_millis(50))).await;

        assert_eq!(report.timed_out, vec!["stuck"]);
        assert_eq!(report.stopped, vec!["quick"]);
        assert!(!quick.is_running());
    }

    #[test]
    fn test_capture_skips_nil_handles() {
        let mut config = Config::default();
        let handles = [SubsystemHandle::nil("ghost"), SubsystemHandle::new(Slow::new("p", Duration::ZERO))];
        capture_all(handles.iter(), &mut config);
        assert_eq!(config.name, "captured-by-p");
    }
}
