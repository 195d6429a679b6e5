//! Internet connectivity monitoring.
//!
//! # Data Flow
//! ```text
//! ConnectionMonitor::start
//!     → prober.rs parses DNS targets, spawns tracked probe loop
//!     → every interval: TCP connect DNS servers, else resolve domains
//!     → state.rs records result (hysteresis)
//!     → ConnectionMonitor::is_online reads it lock-free
//! ```
//!
//! # Design Decisions
//! - Invalid probe targets fail `start`, not setup, and roll the state back
//! - `is_online` on a monitor with no prober is false, never a fault

pub mod monitor;
pub mod prober;
pub mod state;

pub use monitor::{ConnectionMonitor, NAME};
pub use prober::{ProbeSettings, Prober, ProberError};
pub use state::{Connectivity, LinkStatus};
