//! CLI-specific error types
//!
//! Every CLI error ends the process with a non-zero exit.

use std::fmt;
use std::io;

use crate::config::ConfigError;
use crate::error::OrchestratorError;
use crate::state::StateStoreError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (stdout)
    IoError,
    /// State record already exists
    AlreadyInitialized,
    /// State record missing
    NotInitialized,
    /// State backend failed or record unreadable
    StateError,
    /// Tokio runtime could not start
    RuntimeFailed,
    /// A failover operation could not complete
    OperationFailed,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "FAILOVER_CLI_CONFIG_ERROR",
            Self::IoError => "FAILOVER_CLI_IO_ERROR",
            Self::AlreadyInitialized => "FAILOVER_CLI_ALREADY_INITIALIZED",
            Self::NotInitialized => "FAILOVER_CLI_NOT_INITIALIZED",
            Self::StateError => "FAILOVER_CLI_STATE_ERROR",
            Self::RuntimeFailed => "FAILOVER_CLI_RUNTIME_FAILED",
            Self::OperationFailed => "FAILOVER_CLI_OPERATION_FAILED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn already_initialized(key: &str) -> Self {
        Self::new(
            CliErrorCode::AlreadyInitialized,
            format!("Failover state '{}' already exists", key),
        )
    }

    pub fn not_initialized(key: &str) -> Self {
        Self::new(
            CliErrorCode::NotInitialized,
            format!("No failover state under '{}'. Run 'failoverd init' first.", key),
        )
    }

    pub fn state_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::StateError, msg)
    }

    pub fn runtime_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::RuntimeFailed, msg)
    }

    pub fn operation_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::OperationFailed, msg)
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<StateStoreError> for CliError {
    fn from(e: StateStoreError) -> Self {
        match e {
            StateStoreError::NotInitialized(key) => Self::not_initialized(&key),
            other => Self::state_error(other.to_string()),
        }
    }
}

impl From<OrchestratorError> for CliError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::Config(e) => e.into(),
            OrchestratorError::State(e) => e.into(),
            other => Self::operation_failed(other.to_string()),
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_code() {
        let err = CliError::not_initialized("failover/state");
        assert_eq!(err.code(), &CliErrorCode::NotInitialized);
        assert!(err.to_string().starts_with("FAILOVER_CLI_NOT_INITIALIZED: "));
    }

    #[test]
    fn test_store_errors_mapped() {
        let err = CliError::from(OrchestratorError::State(StateStoreError::NotInitialized(
            "k".to_string(),
        )));
        assert_eq!(err.code_str(), "FAILOVER_CLI_NOT_INITIALIZED");

        let err = CliError::from(StateStoreError::Corrupt("bad".to_string()));
        assert_eq!(err.code_str(), "FAILOVER_CLI_STATE_ERROR");
    }
}
