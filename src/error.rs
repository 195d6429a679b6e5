//! Error types shared by the engine and every subsystem.
//!
//! - [`SubsystemError`]: raised by a single subsystem's setup or lifecycle calls.
//!   Every variant names the subsystem; [`SubsystemError::kind`] gives the tag to
//!   branch on.
//! - [`EngineError`]: raised by the engine itself (configuration, registry,
//!   engine-level state, fatal startup failures).

use thiserror::Error;

use crate::config::ConfigError;
use crate::lifecycle::graph::GraphError;
use crate::lifecycle::state::EngineState;

/// Boxed cause carried by [`SubsystemError::Resource`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Tag identifying the class of a [`SubsystemError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NilConfig,
    InvalidConfig,
    MissingDependency,
    AlreadyStarted,
    NotStarted,
    NilSubsystem,
    MissingResource,
    Resource,
}

impl ErrorKind {
    /// True for the contract-misuse errors (`AlreadyStarted`, `NotStarted`,
    /// `NilSubsystem`). These never leave a subsystem in a corrupt state.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            ErrorKind::AlreadyStarted | ErrorKind::NotStarted | ErrorKind::NilSubsystem
        )
    }
}

/// Errors produced by a subsystem.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SubsystemError {
    /// Setup was called without a configuration section.
    #[error("{subsystem}: received nil config")]
    NilConfig { subsystem: String },

    /// The configuration section was present but unusable.
    #[error("{subsystem}: invalid config: {reason}")]
    InvalidConfig { subsystem: String, reason: String },

    /// A dependency required at setup time is absent (disabled or failed setup).
    #[error("{subsystem}: cannot setup without {dependency}")]
    MissingDependency { subsystem: String, dependency: String },

    #[error("{subsystem}: subsystem already started")]
    AlreadyStarted { subsystem: String },

    #[error("{subsystem}: subsystem not started")]
    NotStarted { subsystem: String },

    /// Setup was never run for this subsystem.
    #[error("{subsystem}: subsystem not setup")]
    NilSubsystem { subsystem: String },

    /// State says running but an owned resource handle is gone.
    #[error("{subsystem}: {resource} is nil")]
    MissingResource { subsystem: String, resource: String },

    /// A resource could not be created or used.
    #[error("{subsystem}: {source}")]
    Resource {
        subsystem: String,
        #[source]
        source: BoxError,
    },
}

impl SubsystemError {
    pub fn nil_config(subsystem: impl Into<String>) -> Self {
        SubsystemError::NilConfig { subsystem: subsystem.into() }
    }

    pub fn invalid_config(subsystem: impl Into<String>, reason: impl Into<String>) -> Self {
        SubsystemError::InvalidConfig {
            subsystem: subsystem.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_dependency(subsystem: impl Into<String>, dependency: impl Into<String>) -> Self {
        SubsystemError::MissingDependency {
            subsystem: subsystem.into(),
            dependency: dependency.into(),
        }
    }

    pub fn already_started(subsystem: impl Into<String>) -> Self {
        SubsystemError::AlreadyStarted { subsystem: subsystem.into() }
    }

    pub fn not_started(subsystem: impl Into<String>) -> Self {
        SubsystemError::NotStarted { subsystem: subsystem.into() }
    }

    pub fn nil_subsystem(subsystem: impl Into<String>) -> Self {
        SubsystemError::NilSubsystem { subsystem: subsystem.into() }
    }

    pub fn missing_resource(subsystem: impl Into<String>, resource: impl Into<String>) -> Self {
        SubsystemError::MissingResource {
            subsystem: subsystem.into(),
            resource: resource.into(),
        }
    }

    pub fn resource(subsystem: impl Into<String>, source: impl Into<BoxError>) -> Self {
        SubsystemError::Resource {
            subsystem: subsystem.into(),
            source: source.into(),
        }
    }

    /// Returns the error tag.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SubsystemError::NilConfig { .. } => ErrorKind::NilConfig,
            SubsystemError::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            SubsystemError::MissingDependency { .. } => ErrorKind::MissingDependency,
            SubsystemError::AlreadyStarted { .. } => ErrorKind::AlreadyStarted,
            SubsystemError::NotStarted { .. } => ErrorKind::NotStarted,
            SubsystemError::NilSubsystem { .. } => ErrorKind::NilSubsystem,
            SubsystemError::MissingResource { .. } => ErrorKind::MissingResource,
            SubsystemError::Resource { .. } => ErrorKind::Resource,
        }
    }

    /// Name of the subsystem that raised the error.
    pub fn subsystem(&self) -> &str {
        match self {
            SubsystemError::NilConfig { subsystem }
            | SubsystemError::InvalidConfig { subsystem, .. }
            | SubsystemError::MissingDependency { subsystem, .. }
            | SubsystemError::AlreadyStarted { subsystem }
            | SubsystemError::NotStarted { subsystem }
            | SubsystemError::NilSubsystem { subsystem }
            | SubsystemError::MissingResource { subsystem, .. }
            | SubsystemError::Resource { subsystem, .. } => subsystem,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self.kind() {
            ErrorKind::NilConfig => "nil_config",
            ErrorKind::InvalidConfig => "invalid_config",
            ErrorKind::MissingDependency => "missing_dependency",
            ErrorKind::AlreadyStarted => "already_started",
            ErrorKind::NotStarted => "not_started",
            ErrorKind::NilSubsystem => "nil_subsystem",
            ErrorKind::MissingResource => "missing_resource",
            ErrorKind::Resource => "resource",
        }
    }
}

/// Errors produced by the engine.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration could not be found, parsed or validated.
    #[error("failed to load config: {0}")]
    Config(#[from] ConfigError),

    /// The declared subsystem graph is malformed.
    #[error("invalid subsystem registry: {0}")]
    Graph(#[from] GraphError),

    /// `start`/`stop` called from a state that does not allow it.
    #[error("engine cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: EngineState,
    },

    /// A subsystem the process cannot run without failed setup.
    #[error("required subsystem {subsystem} failed: {source}")]
    Fatal {
        subsystem: String,
        #[source]
        source: SubsystemError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_subsystem() {
        let err = SubsystemError::already_started("internet_monitor");
        assert_eq!(err.to_string(), "internet_monitor: subsystem already started");

        let err = SubsystemError::missing_dependency("order_manager", "communications");
        assert_eq!(
            err.to_string(),
            "order_manager: cannot setup without communications"
        );
    }

    #[test]
    fn test_kind_and_label() {
        let err = SubsystemError::not_started("dispatch");
        assert_eq!(err.kind(), ErrorKind::NotStarted);
        assert_eq!(err.as_label(), "not_started");
        assert_eq!(err.subsystem(), "dispatch");
        assert!(err.kind().is_lifecycle());

        let err = SubsystemError::resource(
            "database",
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        );
        assert_eq!(err.kind(), ErrorKind::Resource);
        assert!(!err.kind().is_lifecycle());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_engine_error_display() {
        let err = EngineError::InvalidState {
            operation: "start",
            state: EngineState::Up,
        };
        assert_eq!(err.to_string(), "engine cannot start while up");

        let err = EngineError::Fatal {
            subsystem: "database".into(),
            source: SubsystemError::nil_config("database"),
        };
        assert!(err.to_string().contains("required subsystem database failed"));
    }
}
