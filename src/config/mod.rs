//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML/JSON)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → Config (validated snapshot)
//!     → shared via Arc<ArcSwap<Config>> with the engine
//!     → each subsystem's setup reads its own section
//!
//! On engine stop:
//!     subsystems capture state back into the Config
//!     → store.rs persists it (unless dry run)
//! ```
//!
//! # Design Decisions
//! - A subsystem's section is copied at setup and never re-read while running
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod store;
pub mod validation;

pub use loader::{ConfigError, ConfigFormat};
pub use schema::{
    CommunicationsConfig, Config, ConnectionDetails, ConnectionMonitorConfig, DatabaseConfig,
    DispatchConfig, LoggingConfig, MetricsConfig, OrderManagerConfig, PortfolioAddress,
    PortfolioConfig, RelayerConfig, RemoteControlConfig,
};
pub use store::{ConfigStore, FileConfigStore};
pub use validation::ValidationError;
