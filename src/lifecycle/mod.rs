//! Subsystem lifecycle management.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Registry (graph.rs order) → skip disabled → setup → start
//!         inline: awaited in order
//!         background: spawned through tracker.rs
//!
//! Shutdown (shutdown.rs):
//!     capture_state → stop running subsystems (reverse order, bounded)
//!     → engine persists config → tracker drains → log sink closed
//!
//! Signals (signals.rs):
//!     StopSignal → subsystem background loops exit
//!     SIGTERM/SIGINT → engine stop
//! ```
//!
//! # Design Decisions
//! - Per-subsystem transitions are atomic CAS (state.rs), never the engine lock
//! - One `Lifecycle<R>` implements the start/stop rules for every subsystem
//! - Soft failures are isolated; only required setups abort startup

pub mod graph;
pub mod registry;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;
pub mod subsystem;
pub mod tracker;

pub use registry::{Entry, Registry, Roster, SetupContext, StartMode, SubsystemStatus};
pub use signals::{StopListener, StopSignal};
pub use state::{AtomicState, EngineState, SubsystemState};
pub use subsystem::{Lifecycle, Subsystem, SubsystemHandle};
pub use tracker::{WorkGuard, WorkTracker};
