use std::fmt;
use std::path::PathBuf;

/// Result type alias for swipe operations
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of object store failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// The object (or its tag set) does not exist
    NotFound,
    /// The store rejected the request because of request rate
    Throttled,
    /// Any other error reported by the store for this request
    Client,
    /// The request never produced a response from the store
    Transport,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StoreErrorKind::NotFound => "not found",
            StoreErrorKind::Throttled => "throttled",
            StoreErrorKind::Client => "client error",
            StoreErrorKind::Transport => "transport error",
        };
        f.write_str(label)
    }
}

/// Core error type for swipe operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File system operations
    #[error("file system {operation} operation failed for '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration errors
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// A task output slot whose directory layout matches no known output shape
    #[error("unrecognized output layout at '{path}': {message}")]
    InvalidOutputLayout { path: PathBuf, message: String },

    /// The transfer tool exited unsuccessfully
    #[error("{}", format_transfer_error(.local, .uri, .exit_code, .stderr))]
    Transfer {
        local: PathBuf,
        uri: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Object store request errors
    #[error("object store {operation} failed for '{uri}' ({kind}): {message}")]
    ObjectStore {
        uri: String,
        operation: String,
        kind: StoreErrorKind,
        message: String,
    },

    /// Remote compute API errors
    #[error("compute API {operation} failed: {message}")]
    Compute { operation: String, message: String },

    /// A remote job was terminated because the engine requested cancellation
    #[error("remote job '{job_id}' terminated on request")]
    Cancelled { job_id: String },

    /// Call cache errors
    #[error("call cache error for key '{key}': {message}")]
    Cache { key: String, message: String },

    /// A value did not match the type it was decoded against
    #[error("value error: {message}")]
    Value { message: String },
}

fn format_transfer_error(
    local: &std::path::Path,
    uri: &str,
    exit_code: &Option<i32>,
    stderr: &str,
) -> String {
    let stderr = stderr.trim();
    match (exit_code, stderr.is_empty()) {
        (Some(code), true) => {
            format!("failed uploading '{}' to '{uri}': exit status {code}", local.display())
        }
        (Some(code), false) => format!(
            "failed uploading '{}' to '{uri}': exit status {code}: {stderr}",
            local.display()
        ),
        (None, _) => format!(
            "failed uploading '{}' to '{uri}': transfer tool terminated by signal",
            local.display()
        ),
    }
}

// Conversion implementations
impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::FileSystem {
            path: PathBuf::new(),
            operation: "unknown".to_string(),
            source: error,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Json {
            message: error.to_string(),
            source: error,
        }
    }
}

// Helper methods for creating errors with context
impl Error {
    /// Create a file system error with context
    #[must_use]
    pub fn file_system(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Error::FileSystem {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    /// Create a JSON error with a description of what was being processed
    #[must_use]
    pub fn json(message: impl Into<String>, source: serde_json::Error) -> Self {
        Error::Json {
            message: message.into(),
            source,
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Create an output layout error
    #[must_use]
    pub fn invalid_output_layout(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::InvalidOutputLayout {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a transfer failure
    #[must_use]
    pub fn transfer(
        local: impl Into<PathBuf>,
        uri: impl Into<String>,
        exit_code: Option<i32>,
        stderr: impl Into<String>,
    ) -> Self {
        Error::Transfer {
            local: local.into(),
            uri: uri.into(),
            exit_code,
            stderr: stderr.into(),
        }
    }

    /// Create an object store error
    #[must_use]
    pub fn object_store(
        uri: impl Into<String>,
        operation: impl Into<String>,
        kind: StoreErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Error::ObjectStore {
            uri: uri.into(),
            operation: operation.into(),
            kind,
            message: message.into(),
        }
    }

    /// Create a not-found object store error
    #[must_use]
    pub fn not_found(uri: impl Into<String>, operation: impl Into<String>) -> Self {
        Error::object_store(uri, operation, StoreErrorKind::NotFound, "no such key")
    }

    /// Create a compute API error
    #[must_use]
    pub fn compute(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Compute {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a cancellation error for a remote job
    #[must_use]
    pub fn cancelled(job_id: impl Into<String>) -> Self {
        Error::Cancelled {
            job_id: job_id.into(),
        }
    }

    /// Create a call cache error
    #[must_use]
    pub fn cache(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Cache {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a value decoding error
    #[must_use]
    pub fn value(message: impl Into<String>) -> Self {
        Error::Value {
            message: message.into(),
        }
    }

    /// Whether this error reports a missing remote object
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::ObjectStore {
                kind: StoreErrorKind::NotFound,
                ..
            }
        )
    }

    /// Whether this error reports request throttling by the object store
    pub fn is_throttled(&self) -> bool {
        matches!(
            self,
            Error::ObjectStore {
                kind: StoreErrorKind::Throttled,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_error_includes_stderr() {
        let err = Error::transfer("/tmp/a.txt", "s3://bucket/a.txt", Some(2), "AccessDenied\n");
        let msg = err.to_string();
        assert!(msg.contains("exit status 2"));
        assert!(msg.contains("AccessDenied"));
        assert!(!msg.ends_with('\n'));
    }

    #[test]
    fn test_store_error_classification() {
        assert!(Error::not_found("s3://b/k", "get").is_not_found());
        let throttled =
            Error::object_store("s3://b/k", "put_tags", StoreErrorKind::Throttled, "SlowDown");
        assert!(throttled.is_throttled());
        assert!(!throttled.is_not_found());
    }
}
