//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Engine and subsystems produce:
//!     → logging.rs (structured log events, console + optional file sink)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout, file)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging with `subsystem` as the common field
//! - Metrics are cheap (atomic increments)
//! - The log sink is the last thing released on shutdown

pub mod logging;
pub mod metrics;

pub use logging::{LogGuard, LoggingError};
