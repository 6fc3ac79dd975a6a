//! Error types for provisioning and reaping

/// Every failure the lifecycle core can surface.
///
/// Helpers log and return these unchanged; nothing in the crate retries or
/// suppresses them.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LifecycleError {
    #[error("Discovery failed: {message}")]
    Discovery { message: String },

    #[error("{service} {operation} failed: {message}")]
    RemoteCall {
        service: &'static str,
        operation: &'static str,
        message: String,
    },

    #[error("Malformed {operation} response: missing {field}")]
    MalformedResponse {
        operation: &'static str,
        field: &'static str,
    },

    #[error("Invalid http status code from {operation}: {status}")]
    UnexpectedStatus { operation: &'static str, status: u16 },

    #[error("Invalid value for {field}: {value:?}")]
    InvalidValue { field: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl LifecycleError {
    pub fn remote(
        service: &'static str,
        operation: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::RemoteCall {
            service,
            operation,
            message: message.into(),
        }
    }

    pub fn malformed(operation: &'static str, field: &'static str) -> Self {
        Self::MalformedResponse { operation, field }
    }
}

/// Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, LifecycleError>;
