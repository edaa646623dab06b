//! Error taxonomy for the bootstrap pipeline.
//!
//! Every fatal failure aborts the whole bootstrap and surfaces as a
//! [`BootError`]. Navigation-local failures are [`GateError`]s and never
//! escape the navigation that produced them.

use std::time::Duration;

use thiserror::Error;

/// Fatal bootstrap failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BootError {
    /// Settings are missing or malformed
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A required subsystem failed to start
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// Two components were registered under the same name
    #[error("Registration conflict: '{0}' is already registered")]
    RegistrationConflict(String),
    /// Strict assembly found an undeclared or unresolved dependency
    #[error("Wiring error: {0}")]
    Wiring(String),
    /// The application could not be attached to the host document
    #[error("Bootstrap error: {0}")]
    Bootstrap(String),
}

impl BootError {
    /// Short name of the failure kind, used in logs and traces.
    pub fn kind(&self) -> &'static str {
        match self {
            BootError::Configuration(_) => "ConfigurationError",
            BootError::Initialization(_) => "InitializationError",
            BootError::RegistrationConflict(_) => "RegistrationConflict",
            BootError::Wiring(_) => "WiringError",
            BootError::Bootstrap(_) => "BootstrapError",
        }
    }
}

/// Result type for bootstrap operations
pub type BootResult<T> = std::result::Result<T, BootError>;

/// A resolve-gate precondition failed for one navigation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("Resolve gate '{precondition}' failed: {message}")]
    Failed {
        precondition: String,
        message: String,
    },
    #[error("Resolve gate '{precondition}' timed out after {after:?}")]
    TimedOut {
        precondition: String,
        after: Duration,
    },
}

impl GateError {
    /// Name of the precondition that failed.
    pub fn precondition(&self) -> &str {
        match self {
            GateError::Failed { precondition, .. } | GateError::TimedOut { precondition, .. } => {
                precondition
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_error_display() {
        let err = BootError::RegistrationConflict("session".to_string());
        assert_eq!(
            err.to_string(),
            "Registration conflict: 'session' is already registered"
        );
        assert_eq!(err.kind(), "RegistrationConflict");

        let err = BootError::Bootstrap("anchor missing".to_string());
        assert!(err.to_string().starts_with("Bootstrap error"));
    }

    #[test]
    fn test_gate_error_precondition() {
        let err = GateError::TimedOut {
            precondition: "sessionState".to_string(),
            after: Duration::from_secs(30),
        };
        assert_eq!(err.precondition(), "sessionState");
        assert!(err.to_string().contains("timed out"));
    }
}
