//! Central error types for the IndieStream operator
//!
//! Uses `thiserror` for ergonomic, type-safe error handling with
//! automatic `Display` and `Error` trait implementations.

use std::time::Duration;

use thiserror::Error;

/// Central error type for the IndieStream operator
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error from kube-rs
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Resource not found in the cluster
    #[error("Resource not found: {kind}/{name} in namespace {namespace}")]
    NotFound {
        kind: String,
        name: String,
        namespace: String,
    },

    /// A load-balancer address was not assigned within the polling window
    #[error("Timed out after {after:?} waiting for an address on {namespace}/{name}")]
    Timeout {
        namespace: String,
        name: String,
        after: Duration,
    },

    /// Optimistic concurrency conflict that survived re-fetch and re-apply
    #[error("Conflicting update on {kind}/{name} in namespace {namespace}")]
    Conflict {
        kind: String,
        name: String,
        namespace: String,
    },

    /// The Game spec cannot produce a child resource
    #[error("Invalid Game spec: {0}")]
    InvalidSpec(String),

    /// An external object the reconciler depends on is absent
    #[error("Missing dependency: {0}")]
    DependencyMissing(String),

    /// The reconcile was cancelled while waiting
    #[error("Operation cancelled")]
    Cancelled,

    /// Operator configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type alias for operator operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Check if this error type should trigger a fast retry
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Error::KubeError(_)
                | Error::Timeout { .. }
                | Error::Conflict { .. }
                | Error::DependencyMissing(_)
                | Error::NotFound { .. }
        )
    }

    /// Convert to a human-readable message for status updates
    pub fn status_message(&self) -> String {
        match self {
            Error::KubeError(e) => format!("Kubernetes error: {}", e),
            Error::Timeout { name, after, .. } => {
                format!("Waiting for {} to receive an address ({:?})", name, after)
            }
            Error::InvalidSpec(msg) => format!("Validation failed: {}", msg),
            Error::DependencyMissing(msg) => format!("Dependency unavailable: {}", msg),
            _ => self.to_string(),
        }
    }

    pub(crate) fn not_found(kind: &str, namespace: &str, name: &str) -> Self {
        Error::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }

    pub(crate) fn conflict(kind: &str, namespace: &str, name: &str) -> Self {
        Error::Conflict {
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }
}

/// True when a kube-rs error is an API response with the given HTTP status
pub(crate) fn is_api_status(err: &kube::Error, code: u16) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == code)
}
