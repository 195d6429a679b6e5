//! Trading engine supervisor library.

// Core
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod observability;

// Subsystems
pub mod communications;
pub mod connectivity;
pub mod database;
pub mod dispatch;
pub mod http;
pub mod orders;
pub mod portfolio;

pub use config::Config;
pub use engine::{Engine, Settings};
pub use error::{EngineError, ErrorKind, SubsystemError};
pub use lifecycle::{Subsystem, SubsystemHandle, WorkTracker};
