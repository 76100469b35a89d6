//! Error types for modeldoc.
//!
//! Every fallible operation returns `Result<T, DocError>` instead of
//! panicking. Errors fall into the classes reported by [`DocError::class`]:
//! configuration and transport errors abort a documentation run, while
//! resolution, execution and skip errors stay local to one test and are
//! recovered by the suite composer.

use thiserror::Error;

/// Result type alias for modeldoc operations.
pub type DocResult<T> = Result<T, DocError>;

/// Coarse classification of a [`DocError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Missing credentials or ids, invalid configuration files.
    Configuration,
    /// Inputs, parameters or test ids could not be resolved.
    Resolution,
    /// A test unit failed while running.
    Execution,
    /// A test unit declined to run.
    Skip,
    /// Network failure or timeout.
    Transport,
    /// The remote service answered with a non-2xx status.
    Server,
    /// A payload could not be converted to the wire format.
    Serialization,
    /// Client lifecycle misuse (send before init, send after shutdown).
    Lifecycle,
}

/// Unified error type for all modeldoc operations.
#[derive(Debug, Error)]
pub enum DocError {
    // ===== Configuration Errors =====
    /// One or more API credentials are absent.
    #[error("Missing API credentials: {}", missing.join(", "))]
    MissingCredentials {
        /// Names of the missing credential fields.
        missing: Vec<String>,
    },

    /// No project/model identifier was supplied.
    #[error("Missing project identifier: a project (model) cuid is required")]
    MissingModelId,

    /// Invalid configuration parameter.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    // ===== Resolution Errors =====
    /// A required input was not provided, or a path segment did not resolve.
    #[error("Test '{test_id}': missing required input '{input}'")]
    MissingInput {
        /// Test that declared the requirement.
        test_id: String,
        /// First unresolved input name or path segment.
        input: String,
    },

    /// A declared input was provided with the wrong shape.
    #[error("Test '{test_id}': invalid input '{input}': {reason}")]
    InvalidInput {
        /// Test that declared the requirement.
        test_id: String,
        /// Input name.
        input: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A declared parameter has neither a default nor an override.
    #[error("Test '{test_id}': missing required parameter '{param}'")]
    MissingParameter {
        /// Test that declared the parameter.
        test_id: String,
        /// Parameter name.
        param: String,
    },

    /// No test is registered (or loadable) under this id.
    #[error("Test not found: '{test_id}'")]
    TestNotFound {
        /// The id that failed to resolve.
        test_id: String,
    },

    /// A different test unit is already registered under this id.
    #[error("Duplicate test id: '{test_id}' is already registered")]
    DuplicateTest {
        /// The conflicting id.
        test_id: String,
    },

    // ===== Execution Errors =====
    /// A test unit failed while running.
    #[error("Test '{test_id}' failed (inputs: [{}]): {message}", inputs.join(", "))]
    TestExecution {
        /// Failing test.
        test_id: String,
        /// Logical names of the inputs it was run against.
        inputs: Vec<String>,
        /// Original failure message.
        message: String,
    },

    /// A test unit signalled that its preconditions are not met.
    #[error("Test '{test_id}' skipped: {reason}")]
    TestSkipped {
        /// Skipped test.
        test_id: String,
        /// Reason given by the test.
        reason: String,
    },

    // ===== API Client Errors =====
    /// The client has not completed a handshake (or was shut down).
    #[error("API client is not ready (state: {state})")]
    NotReady {
        /// Lifecycle state at the time of the call.
        state: String,
    },

    /// Network failure or timeout.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-2xx response. Displays the response body verbatim.
    #[error("{body}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ===== I/O Errors =====
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DocError {
    /// Create a configuration error with a message.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Create a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a missing-input error.
    #[must_use]
    pub fn missing_input(test_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self::MissingInput {
            test_id: test_id.into(),
            input: input.into(),
        }
    }

    /// Create a test-not-found error.
    #[must_use]
    pub fn not_found(test_id: impl Into<String>) -> Self {
        Self::TestNotFound {
            test_id: test_id.into(),
        }
    }

    /// Classify this error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::MissingCredentials { .. }
            | Self::MissingModelId
            | Self::Config { .. }
            | Self::YamlParse(_)
            | Self::Validation(_)
            | Self::Io(_) => ErrorClass::Configuration,
            Self::MissingInput { .. }
            | Self::InvalidInput { .. }
            | Self::MissingParameter { .. }
            | Self::TestNotFound { .. }
            | Self::DuplicateTest { .. } => ErrorClass::Resolution,
            Self::TestExecution { .. } => ErrorClass::Execution,
            Self::TestSkipped { .. } => ErrorClass::Skip,
            Self::NotReady { .. } => ErrorClass::Lifecycle,
            Self::Transport(_) => ErrorClass::Transport,
            Self::Server { .. } => ErrorClass::Server,
            Self::Serialization(_) => ErrorClass::Serialization,
        }
    }

    /// Whether the error is local to a single test and must not abort a suite.
    #[must_use]
    pub const fn is_test_local(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::Resolution | ErrorClass::Execution | ErrorClass::Skip
        )
    }

    /// Whether retrying the same call may succeed.
    ///
    /// Execution failures are never cached, so a later call with the same
    /// fingerprint runs the test again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.class(), ErrorClass::Transport | ErrorClass::Execution)
    }

    /// The test id this error refers to, if any.
    #[must_use]
    pub fn test_id(&self) -> Option<&str> {
        match self {
            Self::MissingInput { test_id, .. }
            | Self::InvalidInput { test_id, .. }
            | Self::MissingParameter { test_id, .. }
            | Self::TestNotFound { test_id }
            | Self::DuplicateTest { test_id }
            | Self::TestExecution { test_id, .. }
            | Self::TestSkipped { test_id, .. } => Some(test_id),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let missing = DocError::MissingCredentials {
            missing: vec!["api_key".to_string()],
        };
        assert_eq!(missing.class(), ErrorClass::Configuration);
        assert!(!missing.is_test_local());

        let input = DocError::missing_input("t", "model");
        assert_eq!(input.class(), ErrorClass::Resolution);
        assert!(input.is_test_local());

        let skipped = DocError::TestSkipped {
            test_id: "t".to_string(),
            reason: "wrong framework".to_string(),
        };
        assert_eq!(skipped.class(), ErrorClass::Skip);
        assert!(skipped.is_test_local());
        assert!(!skipped.is_retryable());

        let transport = DocError::transport("connection reset");
        assert!(transport.is_retryable());
        assert!(!transport.is_test_local());
    }

    #[test]
    fn test_server_error_displays_body_verbatim() {
        let err = DocError::Server {
            status: 500,
            body: "Internal Server Error".to_string(),
        };
        assert_eq!(err.to_string(), "Internal Server Error");
        assert_eq!(err.class(), ErrorClass::Server);
    }

    #[test]
    fn test_missing_credentials_display() {
        let err = DocError::MissingCredentials {
            missing: vec!["api_key".to_string(), "api_secret".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("api_key, api_secret"));
    }

    #[test]
    fn test_execution_error_names_inputs() {
        let err = DocError::TestExecution {
            test_id: "modeldoc.data_validation.Zeros".to_string(),
            inputs: vec!["dataset".to_string(), "model".to_string()],
            message: "division by zero".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("modeldoc.data_validation.Zeros"));
        assert!(msg.contains("dataset, model"));
        assert!(msg.contains("division by zero"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_error_test_id() {
        assert_eq!(DocError::not_found("a.b").test_id(), Some("a.b"));
        assert_eq!(DocError::transport("x").test_id(), None);
    }

    #[test]
    fn test_error_config() {
        let err = DocError::config("invalid parameter");
        let msg = err.to_string();
        assert!(msg.contains("Configuration error"));
        assert!(msg.contains("invalid parameter"));
    }

    #[test]
    fn test_error_debug() {
        let err = DocError::config("test");
        let debug = format!("{err:?}");
        assert!(debug.contains("Config"));
    }
}
