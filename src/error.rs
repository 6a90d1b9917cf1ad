//! Error types for the commit guard.
//!
//! Only two kinds of error ever escape the pipeline: a malformed
//! configuration (raised before any check runs) and an operator abort
//! (raised from a confirmation prompt). Everything a check does with
//! external tools is folded into a failed [`CheckResult`](crate::CheckResult)
//! inside the check itself.

use std::path::PathBuf;
use thiserror::Error;

/// Exit code reported when the operator interrupts the run.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Main error type for commit guard operations
#[derive(Error, Debug)]
pub enum GuardError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load or parse the configuration file
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    /// A check name passed on the command line does not exist
    #[error("Unknown check '{name}' (expected one of: {expected})")]
    UnknownCheck { name: String, expected: String },

    // =========================================================================
    // Session Errors
    // =========================================================================
    /// The operator refused to continue or closed the prompt
    #[error("Interrupted by operator: {reason}")]
    OperatorAbort { reason: String },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML error wrapper
    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GuardError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create an operator abort
    pub fn abort(reason: impl Into<String>) -> Self {
        Self::OperatorAbort {
            reason: reason.into(),
        }
    }

    /// Check if this error came from the operator rather than the tree.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::OperatorAbort { .. })
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::OperatorAbort { .. } => EXIT_INTERRUPTED,
            _ => 1,
        }
    }
}

/// Type alias for commit guard results
pub type Result<T> = std::result::Result<T, GuardError>;
