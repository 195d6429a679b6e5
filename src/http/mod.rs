//! Remote status API.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum router, TraceLayer, graceful shutdown)
//!     → handlers.rs
//!         GET /health            engine name, uptime, running count
//!         GET /subsystems        roster statuses in startup order
//!         GET /subsystems/{name} one status, 404 if unknown
//! ```

pub mod handlers;
pub mod server;

pub use handlers::ApiState;
pub use server::{ApiServer, NAME};
