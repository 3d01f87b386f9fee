//! Error types for treenav operations

use thiserror::Error;

/// Remote fetch and cache layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Request {operation} failed: {reason}")]
    RequestFailed { operation: String, reason: String },

    #[error("Fetch returned no entry for key {key}")]
    MissingEntry { key: String },
}

/// Data context errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("Context not found: {context}")]
    NotFound { context: String },

    #[error("No contributor registered for context {context}")]
    ContributorMissing { context: String },
}

/// Navigation pipeline errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NavigationError {
    #[error("Authentication failed for connection {connection_id}: {reason}")]
    AuthenticationFailed {
        connection_id: String,
        reason: String,
    },

    #[error("Connection not established: {connection_id}")]
    ConnectionNotEstablished { connection_id: String },

    #[error("Navigation handler {handler} failed: {reason}")]
    HandlerFailed { handler: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all treenav errors.
///
/// `Clone` so a single failure can be handed to every caller that awaited the
/// same coalesced fetch or navigation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NavError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Navigation error: {0}")]
    Navigation(#[from] NavigationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl NavError {
    /// Shorthand for a failed remote request.
    pub fn request_failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        NavError::Fetch(FetchError::RequestFailed {
            operation: operation.into(),
            reason: reason.into(),
        })
    }

    /// True for failures that came from the remote side or the cache.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, NavError::Fetch(_))
    }
}

/// Result type alias for treenav operations.
pub type NavResult<T> = Result<T, NavError>;

// =============================================================================
// TESTS
// =============================================================================
