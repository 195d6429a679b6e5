//! Subsystem registry.
//!
//! # Responsibilities
//! - Declare every subsystem the engine knows: name, enablement, whether the
//!   process can run without it, how it is started, what it depends on
//! - Validate the declarations as a [`DependencyGraph`]
//! - [`SetupContext`]: what a setup function may see (config snapshot, tracker,
//!   roster, already constructed dependencies)
//! - [`Roster`]: the lock-free published list of handles, read by status queries

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::config::Config;
use crate::error::SubsystemError;
use crate::lifecycle::graph::{DependencyGraph, GraphError};
use crate::lifecycle::subsystem::SubsystemHandle;
use crate::lifecycle::tracker::WorkTracker;

/// Constructs a subsystem from the setup context.
pub type SetupFn =
    Box<dyn Fn(&SetupContext<'_>) -> Result<SubsystemHandle, SubsystemError> + Send + Sync>;

/// How the startup sequencer invokes `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Awaited in sequence.
    Inline,
    /// Run from a tracked background task; the sequencer moves on immediately.
    Background,
}

/// One declared subsystem.
pub struct Entry {
    name: &'static str,
    enabled: bool,
    required: bool,
    start_mode: StartMode,
    depends_on: Vec<&'static str>,
    after: Vec<&'static str>,
    setup: SetupFn,
}

impl Entry {
    /// An enabled, optional, inline-started entry with no dependencies.
    pub fn new<F>(name: &'static str, setup: F) -> Self
    where
        F: Fn(&SetupContext<'_>) -> Result<SubsystemHandle, SubsystemError> + Send + Sync + 'static,
    {
        Self {
            name,
            enabled: true,
            required: false,
            start_mode: StartMode::Inline,
            depends_on: Vec::new(),
            after: Vec::new(),
            setup: Box::new(setup),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// A setup failure of a required entry aborts engine startup.
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn start_mode(mut self, mode: StartMode) -> Self {
        self.start_mode = mode;
        self
    }

    /// Hard dependencies: constructed and started first, handed to setup.
    pub fn depends_on(mut self, names: &[&'static str]) -> Self {
        self.depends_on.extend_from_slice(names);
        self
    }

    /// Ordering-only dependencies: processed first when present.
    pub fn after(mut self, names: &[&'static str]) -> Self {
        self.after.extend_from_slice(names);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn mode(&self) -> StartMode {
        self.start_mode
    }

    pub fn dependencies(&self) -> &[&'static str] {
        &self.depends_on
    }

    pub(crate) fn setup(&self, ctx: &SetupContext<'_>) -> Result<SubsystemHandle, SubsystemError> {
        (self.setup)(ctx)
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("required", &self.required)
            .field("start_mode", &self.start_mode)
            .field("depends_on", &self.depends_on)
            .field("after", &self.after)
            .finish()
    }
}

/// Validated, ordered set of entries.
#[derive(Debug)]
pub struct Registry {
    entries: Vec<Entry>,
    graph: DependencyGraph,
}

impl Registry {
    pub fn new(entries: Vec<Entry>) -> Result<Self, GraphError> {
        let graph = DependencyGraph::new(entries.iter().map(|e| {
            (e.name, e.depends_on.iter().chain(e.after.iter()).copied())
        }))?;
        Ok(Self { entries, graph })
    }

    /// Entries in startup order.
    pub fn ordered(&self) -> impl DoubleEndedIterator<Item = &Entry> + '_ {
        self.graph.order().iter().map(move |&i| &self.entries[i])
    }

    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything a setup function may use.
pub struct SetupContext<'a> {
    pub(crate) config: &'a Config,
    pub(crate) tracker: &'a WorkTracker,
    pub(crate) roster: &'a Roster,
    pub(crate) built: &'a HashMap<&'static str, SubsystemHandle>,
}

impl<'a> SetupContext<'a> {
    /// Configuration snapshot taken when startup began.
    pub fn config(&self) -> &'a Config {
        self.config
    }

    pub fn tracker(&self) -> &'a WorkTracker {
        self.tracker
    }

    pub fn roster(&self) -> &'a Roster {
        self.roster
    }

    /// An already constructed subsystem, typed. `None` if it is disabled,
    /// failed setup, or is not a `T`.
    pub fn dependency<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.built.get(name)?.downcast::<T>()
    }
}

/// Point-in-time status of one subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubsystemStatus {
    pub name: String,
    pub state: String,
    pub running: bool,
}

/// Published subsystem handles, in startup order. Cheap to clone.
#[derive(Clone, Default)]
pub struct Roster {
    inner: Arc<ArcSwap<Vec<SubsystemHandle>>>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, handles: Vec<SubsystemHandle>) {
        self.inner.store(Arc::new(handles));
    }

    pub fn handles(&self) -> Arc<Vec<SubsystemHandle>> {
        self.inner.load_full()
    }

    pub fn get(&self, name: &str) -> Option<SubsystemHandle> {
        self.inner.load().iter().find(|h| h.name() == name).cloned()
    }

    pub fn statuses(&self) -> Vec<SubsystemStatus> {
        self.inner
            .load()
            .iter()
            .map(|h| SubsystemStatus {
                name: h.name().to_string(),
                state: h.state().to_string(),
                running: h.is_running(),
            })
            .collect()
    }
}

impl fmt::Debug for Roster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.inner.load().iter()).finish()
    }
}
