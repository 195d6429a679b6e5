//! Primary persistence layer.
//!
//! # Data Flow
//! ```text
//! setup: validate driver/host/port, copy config
//! start: TCP reachability check (rollback on failure)
//!     → tracked keep-alive loop flips `is_connected`
//! stop:  signal loop, await it, mark disconnected
//! ```
//!
//! # Design Decisions
//! - The engine treats a setup failure here as fatal when the database is enabled
//! - SQL access itself is out of scope; dependents only see `is_connected`

pub mod manager;

pub use manager::{DatabaseManager, NAME};
