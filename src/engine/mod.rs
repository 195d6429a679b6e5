//! Engine supervisor.
//!
//! # Data Flow
//! ```text
//! Engine::new(settings)
//!     → ConfigStore::load (hard failure)
//!     → settings overlay → catalog registry
//!
//! start()  Idle → Starting → Up
//!     → startup::start_all (fatal: roll back, drain, back to Idle)
//!
//! stop()   Up → Stopping → Idle
//!     → await background starts
//!     → capture_state (reverse order)
//!     → stop_all (reverse order, bounded)
//!     → save config unless dry run
//!     → drain WorkTracker
//!     → release log sink
//! ```
//!
//! # Design Decisions
//! - One engine mutex serialises whole start/stop cycles; the engine state
//!   CAS rejects calls from the wrong state
//! - Subsystems run with the overlaid config; captured state is written into
//!   the file's copy, so command-line overrides never get persisted
//! - The log guard is released once, by the first stop

pub mod catalog;
pub mod settings;

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::{ArcSwap, ArcSwapOption};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::{Config, ConfigStore, FileConfigStore};
use crate::error::EngineError;
use crate::lifecycle::registry::{Registry, Roster, SubsystemStatus};
use crate::lifecycle::state::{AtomicState, EngineState};
use crate::lifecycle::subsystem::SubsystemHandle;
use crate::lifecycle::tracker::WorkTracker;
use crate::lifecycle::{shutdown, startup};
use crate::observability::{metrics, LogGuard};

pub use settings::{FlagSet, Settings, DEFAULT_STOP_TIMEOUT};

#[derive(Default)]
struct Session {
    handles: Vec<SubsystemHandle>,
    pending: Vec<JoinHandle<()>>,
}

/// Hosts the subsystems and drives their lifecycle.
pub struct Engine {
    settings: Settings,
    store: Arc<dyn ConfigStore>,
    registry: Registry,
    config: ArcSwap<Config>,
    state: AtomicState<EngineState>,
    session: Mutex<Session>,
    tracker: WorkTracker,
    roster: Roster,
    started_at: ArcSwapOption<Instant>,
    log_guard: ArcSwapOption<LogGuard>,
}

impl Engine {
    /// Engine over the configuration file named by (or discovered for) `settings`.
    pub fn new(settings: Settings) -> Result<Self, EngineError> {
        let store = FileConfigStore::discover(settings.config_path.as_deref())?;
        Self::with_store(settings, Arc::new(store))
    }

    /// Engine over an arbitrary store, with the standard subsystem catalog.
    pub fn with_store(settings: Settings, store: Arc<dyn ConfigStore>) -> Result<Self, EngineError> {
        let config = store.load()?;
        let registry = catalog::registry(&settings.apply(&config))?;
        Ok(Self::assemble(settings, store, registry, config))
    }

    /// Engine over a caller-supplied subsystem set.
    pub fn with_registry(
        settings: Settings,
        store: Arc<dyn ConfigStore>,
        registry: Registry,
    ) -> Result<Self, EngineError> {
        let config = store.load()?;
        Ok(Self::assemble(settings, store, registry, config))
    }

    fn assemble(
        settings: Settings,
        store: Arc<dyn ConfigStore>,
        registry: Registry,
        config: Config,
    ) -> Self {
        Self {
            settings,
            store,
            registry,
            config: ArcSwap::from_pointee(config),
            state: AtomicState::new(EngineState::Idle),
            session: Mutex::new(Session::default()),
            tracker: WorkTracker::new(),
            roster: Roster::new(),
            started_at: ArcSwapOption::empty(),
            log_guard: ArcSwapOption::empty(),
        }
    }

    /// Keep `guard` alive until the end of the next `stop`.
    pub fn attach_log_guard(&self, guard: LogGuard) {
        self.log_guard.store(Some(Arc::new(guard)));
    }

    pub async fn start(&self) -> Result<(), EngineError> {
        let mut session = self.session.lock().await;
        if let Err(state) = self.state.transition(EngineState::Idle, EngineState::Starting) {
            return Err(EngineError::InvalidState {
                operation: "start",
                state,
            });
        }
        metrics::record_engine_state(EngineState::Starting);

        let config = self.settings.apply(&self.config.load());
        tracing::info!(
            name = %config.name,
            config = %self.store.location(),
            subsystems = self.registry.len(),
            dry_run = self.settings.is_dry_run(),
            "Configuration loaded"
        );
        tracing::info!(name = %config.name, "Engine starting...");

        match startup::start_all(&self.registry, &config, &self.tracker, &self.roster).await {
            Ok(report) => {
                self.roster.publish(report.handles.clone());
                session.handles = report.handles;
                session.pending = report.pending;
                self.started_at.store(Some(Arc::new(Instant::now())));
                self.enter(EngineState::Starting, EngineState::Up);
                tracing::info!(degraded = report.degraded.len(), "Engine up");
                Ok(())
            }
            Err(failure) => {
                tracing::error!(
                    subsystem = %failure.subsystem,
                    error = %failure.source,
                    "Engine startup aborted, rolling back"
                );
                self.roster.publish(failure.handles.clone());
                await_pending(failure.pending).await;
                let report =
                    shutdown::stop_all(failure.handles.iter().rev(), self.settings.stop_timeout).await;
                if !report.is_clean() {
                    tracing::warn!(failed = ?report.failed, timed_out = ?report.timed_out, "Rollback incomplete");
                }
                self.drain().await;
                self.enter(EngineState::Starting, EngineState::Idle);
                Err(EngineError::Fatal {
                    subsystem: failure.subsystem,
                    source: failure.source,
                })
            }
        }
    }

    /// Stop every running subsystem and persist state. A no-op unless up.
    pub async fn stop(&self) {
        let mut session = self.session.lock().await;
        if let Err(state) = self.state.transition(EngineState::Up, EngineState::Stopping) {
            tracing::warn!(state = %state, "Engine stop ignored, engine is not up");
            return;
        }
        metrics::record_engine_state(EngineState::Stopping);
        tracing::info!("Engine shutting down...");

        await_pending(std::mem::take(&mut session.pending)).await;
        let handles = std::mem::take(&mut session.handles);

        let mut persisted = Config::clone(&self.config.load());
        shutdown::capture_all(handles.iter().rev(), &mut persisted);

        let report = shutdown::stop_all(handles.iter().rev(), self.settings.stop_timeout).await;
        if !report.is_clean() {
            tracing::warn!(failed = ?report.failed, timed_out = ?report.timed_out, "Shutdown incomplete");
        }

        if self.settings.is_dry_run() {
            tracing::info!("Dry run, configuration not saved");
        } else {
            match self.store.save(&persisted) {
                Ok(()) => tracing::info!(config = %self.store.location(), "Configuration saved"),
                Err(e) => tracing::error!(config = %self.store.location(), error = %e, "Failed to save configuration"),
            }
        }
        self.config.store(Arc::new(persisted));

        self.drain().await;
        self.started_at.store(None);
        self.enter(EngineState::Stopping, EngineState::Idle);
        tracing::info!(stopped = report.stopped.len(), "Engine stopped");

        drop(session);
        drop(self.log_guard.swap(None));
    }

    async fn drain(&self) {
        match self.settings.drain_timeout {
            Some(limit) => {
                if !self.tracker.wait_timeout(limit).await {
                    tracing::warn!(
                        active = self.tracker.active(),
                        timeout_ms = limit.as_millis() as u64,
                        "Background work still running after drain timeout"
                    );
                }
            }
            None => self.tracker.wait().await,
        }
    }

    fn enter(&self, from: EngineState, to: EngineState) {
        if let Err(actual) = self.state.transition(from, to) {
            tracing::error!(expected = %from, actual = %actual, "Engine state changed underneath");
        }
        metrics::record_engine_state(self.state.load());
    }

    pub fn state(&self) -> EngineState {
        self.state.load()
    }

    /// Time since the engine came up; `None` unless up.
    pub fn uptime(&self) -> Option<Duration> {
        self.started_at.load().as_deref().map(Instant::elapsed)
    }

    pub fn subsystem(&self, name: &str) -> Option<SubsystemHandle> {
        self.roster.get(name)
    }

    /// Typed access to a constructed subsystem.
    pub fn subsystem_as<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.roster.get(name)?.downcast::<T>()
    }

    pub fn statuses(&self) -> Vec<SubsystemStatus> {
        self.roster.statuses()
    }

    /// The persisted configuration, including state captured at the last stop.
    pub fn config(&self) -> Arc<Config> {
        self.config.load_full()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn tracker(&self) -> &WorkTracker {
        &self.tracker
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }
}

async fn await_pending(pending: Vec<JoinHandle<()>>) {
    for task in pending {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Background start ended abnormally");
        }
    }
}
