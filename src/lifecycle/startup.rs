//! Startup sequencer.
//!
//! # Responsibilities
//! - Walk the registry in dependency order
//! - Skip disabled entries, construct the rest, start them
//! - Isolate soft failures; abort on a required entry's setup failure
//! - Start background-mode entries from a tracked task
//!
//! # Design Decisions
//! - Every entry yields a handle, nil when disabled or setup failed, so the
//!   roster lists the whole declared set and status queries stay nil-safe
//! - Declared hard dependencies are checked before setup runs; a missing one
//!   fails the entry exactly like a setup error
//! - A dependency counts as available once its setup succeeded, even if its
//!   own start then failed; dependents observe that through `is_running`
//! - Background starts hand back their join handles so shutdown can wait for
//!   them before deciding what is running

use std::collections::HashMap;

use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::SubsystemError;
use crate::lifecycle::registry::{Registry, Roster, SetupContext, StartMode};
use crate::lifecycle::subsystem::SubsystemHandle;
use crate::lifecycle::tracker::WorkTracker;
use crate::observability::metrics;

/// Outcome of a startup pass that did not hit a fatal error.
#[derive(Debug, Default)]
pub struct StartupReport {
    /// One handle per declared entry, in startup order.
    pub handles: Vec<SubsystemHandle>,
    /// Names of enabled entries that failed setup or start.
    pub degraded: Vec<String>,
    /// Background starts still in flight.
    pub pending: Vec<JoinHandle<()>>,
}

/// A required entry failed setup.
#[derive(Debug)]
pub struct StartupFailure {
    /// Handles created before the failure; some may be running.
    pub handles: Vec<SubsystemHandle>,
    pub pending: Vec<JoinHandle<()>>,
    pub subsystem: String,
    pub source: SubsystemError,
}

/// Run the startup sequence.
pub async fn start_all(
    registry: &Registry,
    config: &Config,
    tracker: &WorkTracker,
    roster: &Roster,
) -> Result<StartupReport, StartupFailure> {
    let mut report = StartupReport::default();
    let mut built: HashMap<&'static str, SubsystemHandle> = HashMap::new();

    for entry in registry.ordered() {
        let name = entry.name();

        if !entry.is_enabled() {
            tracing::info!(subsystem = name, "Subsystem disabled");
            report.handles.push(SubsystemHandle::nil(name));
            continue;
        }

        let missing = entry
            .dependencies()
            .iter()
            .find(|dep| !built.contains_key(*dep));
        let setup = if let Some(dep) = missing {
            Err(SubsystemError::missing_dependency(name, *dep))
        } else {
            let ctx = SetupContext {
                config,
                tracker,
                roster,
                built: &built,
            };
            entry.setup(&ctx)
        };

        let handle = match setup {
            Ok(handle) => handle,
            Err(e) => {
                metrics::record_subsystem_failure(name, "setup", e.as_label());
                if entry.is_required() {
                    tracing::error!(subsystem = name, error = %e, "Required subsystem setup failed");
                    return Err(StartupFailure {
                        handles: report.handles,
                        pending: report.pending,
                        subsystem: name.to_string(),
                        source: e,
                    });
                }
                tracing::warn!(subsystem = name, error = %e, "Subsystem setup failed");
                report.handles.push(SubsystemHandle::nil(name));
                report.degraded.push(name.to_string());
                continue;
            }
        };

        built.insert(name, handle.clone());
        report.handles.push(handle.clone());

        match entry.mode() {
            StartMode::Inline => match handle.start().await {
                Ok(()) => {
                    metrics::record_subsystem_running(name, true);
                    tracing::info!(subsystem = name, "Subsystem started");
                }
                Err(e) => {
                    metrics::record_subsystem_failure(name, "start", e.as_label());
                    tracing::warn!(subsystem = name, error = %e, "Subsystem failed to start");
                    report.degraded.push(name.to_string());
                }
            },
            StartMode::Background => {
                let task = tracker.spawn(name, async move {
                    match handle.start().await {
                        Ok(()) => {
                            metrics::record_subsystem_running(name, true);
                            tracing::info!(subsystem = name, "Subsystem started");
                        }
                        Err(e) => {
                            metrics::record_subsystem_failure(name, "start", e.as_label());
                            tracing::warn!(subsystem = name, error = %e, "Subsystem failed to start");
                        }
                    }
                });
                report.pending.push(task);
            }
        }
    }

    if report.degraded.is_empty() {
        tracing::info!(subsystems = report.handles.len(), "Startup complete");
    } else {
        tracing::warn!(degraded = ?report.degraded, "Startup complete in degraded mode");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::lifecycle::registry::Entry;
    use crate::lifecycle::subsystem::{Lifecycle, Subsystem};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Stub {
        lifecycle: Lifecycle<()>,
        fail_start: bool,
    }

    impl Stub {
        fn handle(name: &'static str, fail_start: bool) -> SubsystemHandle {
            SubsystemHandle::new(Arc::new(Self {
                lifecycle: Lifecycle::configured(name),
                fail_start,
            }))
        }
    }

    #[async_trait]
    impl Subsystem for Stub {
        fn name(&self) -> &str {
            self.lifecycle.name()
        }

        async fn start(&self) -> Result<(), SubsystemError> {
            let name = self.lifecycle.name();
            let fail = self.fail_start;
            self.lifecycle
                .start(|| async move {
                    if fail {
                        Err(SubsystemError::resource(name, "refused"))
                    } else {
                        Ok(())
                    }
                })
                .await
        }

        async fn stop(&self) -> Result<(), SubsystemError> {
            self.lifecycle.stop(|_| async {}).await
        }

        fn is_running(&self) -> bool {
            self.lifecycle.is_running()
        }
    }

    fn stub(name: &'static str) -> Entry {
        Entry::new(name, move |_| Ok(Stub::handle(name, false)))
    }

    async fn run(entries: Vec<Entry>) -> Result<StartupReport, StartupFailure> {
        let registry = Registry::new(entries).unwrap();
        start_all(&registry, &Config::default(), &WorkTracker::new(), &Roster::new()).await
    }

    #[tokio::test]
    async fn test_soft_failures_do_not_stop_siblings() {
        let report = run(vec![
            stub("a"),
            Entry::new("broken", |_| Ok(Stub::handle("broken", true))),
            Entry::new("bad_setup", |_| Err(SubsystemError::nil_config("bad_setup"))),
            stub("b"),
        ])
        .await
        .unwrap();

        let running: Vec<_> = report
            .handles
            .iter()
            .filter(|h| h.is_running())
            .map(|h| h.name().to_string())
            .collect();
        assert_eq!(running, vec!["a", "b"]);
        assert_eq!(report.degraded, vec!["broken", "bad_setup"]);
        assert_eq!(report.handles.len(), 4);
    }

    #[tokio::test]
    async fn test_disabled_dependency_is_missing() {
        let report = run(vec![
            stub("a").enabled(false),
            Entry::new("b", |ctx| {
                ctx.dependency::<Stub>("a")
                    .ok_or_else(|| SubsystemError::missing_dependency("b", "a"))?;
                Ok(Stub::handle("b", false))
            })
            .depends_on(&["a"]),
        ])
        .await
        .unwrap();

        assert_eq!(report.degraded, vec!["b"]);
        assert!(report.handles.iter().all(|h| !h.is_running()));
        assert!(!report.handles[1].is_configured());
    }

    #[tokio::test]
    async fn test_required_setup_failure_is_fatal() {
        let failure = run(vec![
            stub("a"),
            Entry::new("db", |_| Err(SubsystemError::invalid_config("db", "no host"))).required(true),
            stub("c"),
        ])
        .await
        .unwrap_err();

        assert_eq!(failure.subsystem, "db");
        assert_eq!(failure.source.kind(), ErrorKind::InvalidConfig);
        assert_eq!(failure.handles.len(), 1);
        assert!(failure.handles[0].is_running());
    }

    #[tokio::test]
    async fn test_background_start_is_tracked() {
        let tracker = WorkTracker::new();
        let registry = Registry::new(vec![stub("server").start_mode(StartMode::Background)]).unwrap();
        let report = start_all(&registry, &Config::default(), &tracker, &Roster::new())
            .await
            .unwrap();

        assert_eq!(report.pending.len(), 1);
        for task in report.pending {
            task.await.unwrap();
        }
        assert!(report.handles[0].is_running());
        tracker.wait().await;
    }

    #[tokio::test]
    async fn test_declared_dependency_is_enforced() {
        let report = run(vec![
            stub("feed").enabled(false),
            stub("strategy").depends_on(&["feed"]),
            stub("reporter"),
        ])
        .await
        .unwrap();

        assert_eq!(report.degraded, vec!["strategy"]);
        let strategy = &report.handles[1];
        assert_eq!(strategy.name(), "strategy");
        assert!(!strategy.is_configured());
        assert!(report.handles[2].is_running());
    }

    #[tokio::test]
    async fn test_required_entry_with_missing_dependency_is_fatal() {
        let failure = run(vec![
            stub("feed").enabled(false),
            stub("core").depends_on(&["feed"]).required(true),
        ])
        .await
        .unwrap_err();

        assert_eq!(failure.subsystem, "core");
        assert_eq!(failure.source.kind(), ErrorKind::MissingDependency);
    }
}
