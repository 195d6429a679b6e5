//! The subsystem contract.
//!
//! # Responsibilities
//! - [`Subsystem`]: the start/stop/running-query surface the engine drives
//! - [`Lifecycle`]: the race-safe transition rules, implemented once and
//!   embedded by every concrete subsystem
//! - [`SubsystemHandle`]: a nil-safe reference the engine holds, which behaves
//!   like an unconfigured subsystem when nothing was ever constructed

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::SubsystemError;
use crate::lifecycle::state::{AtomicState, SubsystemState};

/// An independently lifecycled internal service hosted by the engine.
///
/// Construction ("setup") is an associated function on each implementor and
/// must not start background work. `start` and `stop` may block for the
/// duration of resource allocation and teardown.
#[async_trait]
pub trait Subsystem: Send + Sync + 'static {
    /// Stable name used for logging and lookup.
    fn name(&self) -> &str;

    /// Allocate resources and begin work.
    ///
    /// Fails with `AlreadyStarted` (no side effect) when running, and with
    /// `NilSubsystem` when setup never ran.
    async fn start(&self) -> Result<(), SubsystemError>;

    /// Release every resource before returning.
    ///
    /// Fails with `NotStarted` (no side effect) when not running, and with
    /// `NilSubsystem` when setup never ran.
    async fn stop(&self) -> Result<(), SubsystemError>;

    /// Lock-free running query.
    fn is_running(&self) -> bool;

    /// Copy state that belongs to the persisted configuration back into it.
    /// Called by the shutdown sequencer before `stop`.
    fn capture_state(&self, _config: &mut Config) {}
}

/// CAS-guarded lifecycle with an owned resource slot.
///
/// The slot mutex serialises start and stop against each other so teardown of
/// one run can never overlap allocation of the next; the atomic state decides
/// which caller wins and is what [`Lifecycle::is_running`] reads.
pub struct Lifecycle<R> {
    name: &'static str,
    state: AtomicState<SubsystemState>,
    resources: Mutex<Option<R>>,
}

impl<R: Send> Lifecycle<R> {
    /// A lifecycle for a subsystem whose setup never ran.
    pub fn unconfigured(name: &'static str) -> Self {
        Self {
            name,
            state: AtomicState::new(SubsystemState::Unconfigured),
            resources: Mutex::new(None),
        }
    }

    /// A lifecycle promoted to `Stopped` by a successful setup.
    pub fn configured(name: &'static str) -> Self {
        Self {
            name,
            state: AtomicState::new(SubsystemState::Stopped),
            resources: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> SubsystemState {
        self.state.load()
    }

    pub fn is_running(&self) -> bool {
        self.state.is(SubsystemState::Running)
    }

    /// Claim `Stopped → Running`, then run `build` to create the resources.
    ///
    /// On a build failure the state is rolled back to `Stopped` so a later
    /// start can retry.
    pub async fn start<F, Fut>(&self, build: F) -> Result<(), SubsystemError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, SubsystemError>>,
    {
        let mut slot = self.resources.lock().await;
        match self.state.transition(SubsystemState::Stopped, SubsystemState::Running) {
            Ok(()) => {}
            Err(SubsystemState::Unconfigured) => return Err(SubsystemError::nil_subsystem(self.name)),
            Err(_) => return Err(SubsystemError::already_started(self.name)),
        }

        tracing::debug!(subsystem = self.name, "Subsystem starting...");
        match build().await {
            Ok(resources) => {
                *slot = Some(resources);
                tracing::debug!(subsystem = self.name, "Subsystem started");
                Ok(())
            }
            Err(e) => {
                let _ = self
                    .state
                    .transition(SubsystemState::Running, SubsystemState::Stopped);
                Err(e)
            }
        }
    }

    /// Clear `Running → Stopped`, then hand the resources to `teardown`.
    pub async fn stop<F, Fut>(&self, teardown: F) -> Result<(), SubsystemError>
    where
        F: FnOnce(R) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut slot = self.resources.lock().await;
        match self.state.transition(SubsystemState::Running, SubsystemState::Stopped) {
            Ok(()) => {}
            Err(SubsystemState::Unconfigured) => return Err(SubsystemError::nil_subsystem(self.name)),
            Err(_) => return Err(SubsystemError::not_started(self.name)),
        }

        let resources = slot
            .take()
            .ok_or_else(|| SubsystemError::missing_resource(self.name, "resource handle"))?;

        tracing::debug!(subsystem = self.name, "Subsystem shutting down...");
        teardown(resources).await;
        tracing::debug!(subsystem = self.name, "Subsystem stopped");
        Ok(())
    }

    /// Run `f` against the live resources, if any.
    pub async fn with<T>(&self, f: impl FnOnce(&R) -> T) -> Option<T> {
        let slot = self.resources.lock().await;
        slot.as_ref().map(f)
    }
}

impl<R> fmt::Debug for Lifecycle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("name", &self.name)
            .field("state", &self.state.load())
            .finish()
    }
}

/// Engine-side reference to a subsystem.
///
/// A nil handle stands for a subsystem that was never constructed (disabled
/// or failed setup): start/stop fail with `NilSubsystem`, `is_running` is
/// false, nothing panics.
#[derive(Clone)]
pub struct SubsystemHandle {
    name: Arc<str>,
    inner: Option<Arc<dyn Subsystem>>,
    any: Option<Arc<dyn Any + Send + Sync>>,
}

impl SubsystemHandle {
    pub fn new<S: Subsystem>(subsystem: Arc<S>) -> Self {
        Self {
            name: Arc::from(subsystem.name()),
            inner: Some(subsystem.clone()),
            any: Some(subsystem),
        }
    }

    pub fn nil(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            inner: None,
            any: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.inner.as_ref().is_some_and(|s| s.is_running())
    }

    pub async fn start(&self) -> Result<(), SubsystemError> {
        match &self.inner {
            Some(s) => s.start().await,
            None => Err(SubsystemError::nil_subsystem(self.name.as_ref())),
        }
    }

    pub async fn stop(&self) -> Result<(), SubsystemError> {
        match &self.inner {
            Some(s) => s.stop().await,
            None => Err(SubsystemError::nil_subsystem(self.name.as_ref())),
        }
    }

    pub fn capture_state(&self, config: &mut Config) {
        if let Some(s) = &self.inner {
            s.capture_state(config);
        }
    }

    /// Typed access to the concrete subsystem.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.any.clone()?.downcast::<T>().ok()
    }

    pub fn state(&self) -> SubsystemState {
        match &self.inner {
            Some(s) if s.is_running() => SubsystemState::Running,
            Some(_) => SubsystemState::Stopped,
            None => SubsystemState::Unconfigured,
        }
    }
}

impl fmt::Debug for SubsystemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubsystemHandle")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        lifecycle: Lifecycle<usize>,
        allocations: AtomicUsize,
        fail_next: std::sync::atomic::AtomicBool,
    }

    impl Counter {
        fn setup() -> Arc<Self> {
            Arc::new(Self {
                lifecycle: Lifecycle::configured("counter"),
                allocations: AtomicUsize::new(0),
                fail_next: std::sync::atomic::AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl Subsystem for Counter {
        fn name(&self) -> &str {
            self.lifecycle.name()
        }

        async fn start(&self) -> Result<(), SubsystemError> {
            self.lifecycle
                .start(|| async {
                    if self.fail_next.swap(false, Ordering::SeqCst) {
                        return Err(SubsystemError::resource("counter", "boom"));
                    }
                    tokio::task::yield_now().await;
                    Ok(self.allocations.fetch_add(1, Ordering::SeqCst) + 1)
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

    #[tokio::test]
    async fn test_double_start_allocates_once() {
        let c = Counter::setup();
        c.start().await.unwrap();
        let err = c.start().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyStarted);
        assert_eq!(c.allocations.load(Ordering::SeqCst), 1);
        assert_eq!(c.lifecycle.with(|n| *n).await, Some(1));
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let c = Counter::setup();
        let err = c.stop().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotStarted);
        assert!(!c.is_running());
        assert_eq!(c.lifecycle.state(), SubsystemState::Stopped);
    }

    #[tokio::test]
    async fn test_failed_build_rolls_back() {
        let c = Counter::setup();
        c.fail_next.store(true, Ordering::SeqCst);
        assert_eq!(c.start().await.unwrap_err().kind(), ErrorKind::Resource);
        assert!(!c.is_running());

        c.start().await.unwrap();
        assert!(c.is_running());
    }

    #[tokio::test]
    async fn test_unconfigured_lifecycle() {
        let lifecycle: Lifecycle<()> = Lifecycle::unconfigured("ghost");
        let err = lifecycle.start(|| async { Ok(()) }).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NilSubsystem);
        let err = lifecycle.stop(|_| async {}).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NilSubsystem);
        assert!(!lifecycle.is_running());
    }

    #[tokio::test]
    async fn test_nil_handle_never_panics() {
        let handle = SubsystemHandle::nil("ghost");
        assert!(!handle.is_running());
        assert!(!handle.is_configured());
        assert_eq!(handle.state(), SubsystemState::Unconfigured);
        assert_eq!(handle.start().await.unwrap_err().kind(), ErrorKind::NilSubsystem);
        assert_eq!(handle.stop().await.unwrap_err().kind(), ErrorKind::NilSubsystem);
        assert!(handle.downcast::<Counter>().is_none());
    }

    #[tokio::test]
    async fn test_handle_downcast() {
        let c = Counter::setup();
        let handle = SubsystemHandle::new(c.clone());
        assert_eq!(handle.name(), "counter");
        let back = handle.downcast::<Counter>().unwrap();
        assert!(Arc::ptr_eq(&c, &back));
    }
}
