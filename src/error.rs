use std::fmt;
use thiserror::Error;

/// A single problem found while validating configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Unified error type for prize-pool.
#[derive(Error, Debug, Clone)]
pub enum PoolError {
    /// Reward, code or key not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A store operation exceeded its deadline
    #[error("Operation timed out: {0}")]
    TimedOut(String),

    /// Counter/set store failure (connection refused, command error, ...)
    #[error("Store error: {0}")]
    Store(String),

    /// Storage collaborator failure
    #[error("Repository error: {0}")]
    Repository(String),

    /// Parse/serialization error
    #[error("Parse error: {0}")]
    Parse(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Validation error with every issue found
    #[error("Validation error: {}", .0.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("; "))]
    ValidationError(Vec<ValidationIssue>),
}

impl PoolError {
    /// Check if this error is transient and the whole operation may be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, PoolError::TimedOut(_) | PoolError::Store(_))
    }
}

// === Conversion Implementations ===

macro_rules! impl_from_error {
    ($err_type:ty, $arm:pat => $body:expr) => {
        impl From<$err_type> for PoolError {
            fn from(err: $err_type) -> Self {
                match err {
                    $arm => $body,
                }
            }
        }
    };
}

impl_from_error!(std::io::Error, e => match e.kind() {
    std::io::ErrorKind::NotFound => PoolError::NotFound(e.to_string()),
    std::io::ErrorKind::TimedOut => PoolError::TimedOut(e.to_string()),
    std::io::ErrorKind::InvalidInput => PoolError::InvalidArgument(e.to_string()),
    _ => PoolError::Io(e.to_string()),
});

impl_from_error!(redis::RedisError, e => if e.is_timeout() {
    PoolError::TimedOut(e.to_string())
} else {
    PoolError::Store(e.to_string())
});

impl_from_error!(serde_json::Error, e => PoolError::Parse(e.to_string()));
impl_from_error!(toml::de::Error, e => PoolError::Parse(e.to_string()));

/// Result type alias for operations that can fail with PoolError.
pub type PoolResult<T> = Result<T, PoolError>;
