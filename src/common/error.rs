//! Error types for rust_autonav

use thiserror::Error;

/// Main error type for the navigation core
#[derive(Debug, Error)]
pub enum NavigationError {
    /// Input rejected by an algorithm (negative motion, zero-sum weights, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Invalid configuration parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// A prioritized controller failed while producing its channels
    #[error("Controller fault at priority {priority}: {reason}")]
    ControllerFault { priority: i32, reason: String },
    /// Numerical computation failed (distribution setup, etc.)
    #[error("Numerical error: {0}")]
    NumericalError(String),
    /// The flight link could not be used
    #[error("Link unavailable: {0}")]
    LinkUnavailable(String),
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration file could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),
}

/// Result type alias for navigation operations
pub type NavigationResult<T> = Result<T, NavigationError>;
