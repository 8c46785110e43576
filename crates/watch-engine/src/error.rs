//! Engine error types.
//!
//! Only sync timeouts and authorization failures are meant to reach the
//! request boundary. Per-item and per-group faults are recovered locally and
//! reported through [`TransformSkip`] and [`DiscoveryPartial`] log entries.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the watch-and-stream engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The watch session never completed its initial list within the bound
    #[error("Initial sync for {session} did not complete within {timeout:?}")]
    SyncTimeout {
        /// Rendered session key
        session: String,
        /// Bound that elapsed
        timeout: Duration,
    },

    /// The tenant credential lacks permission for the watched resource
    #[error("Authorization denied for {resource}: {reason}")]
    AuthorizationDenied {
        /// Rendered session key
        resource: String,
        /// Message returned by the cluster
        reason: String,
    },

    /// The watch session was torn down before it became ready
    #[error("Watch session stopped: {0}")]
    SessionStopped(String),

    /// No client is registered for the tenant
    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    /// The requested resource kind is not served by the cluster
    #[error("Unknown resource kind: {0}")]
    UnknownResource(String),

    /// A discovery endpoint could not be queried
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Returns true when the caller may retry the same request later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SyncTimeout { .. } | Self::SessionStopped(_))
    }
}

/// A single raw object that could not be projected into a view model.
#[derive(Debug, Clone, Error)]
#[error("Skipped {object}: {reason}")]
pub struct TransformSkip {
    /// `namespace/name` of the offending object
    pub object: String,
    /// Why the projection failed
    pub reason: String,
}

impl TransformSkip {
    /// Creates a skip record.
    pub fn new(object: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            object: object.into(),
            reason: reason.to_string(),
        }
    }
}

/// Discovery of one API group failed while the rest succeeded.
#[derive(Debug, Clone, Error)]
#[error("Discovery failed for API group {group}: {reason}")]
pub struct DiscoveryPartial {
    /// `group/version` that failed
    pub group: String,
    /// Underlying error message
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let timeout = EngineError::SyncTimeout {
            session: "a-b-PodInformer".to_string(),
            timeout: Duration::from_secs(10),
        };
        assert!(timeout.is_retryable());

        let denied = EngineError::AuthorizationDenied {
            resource: "a-b-SecretInformer".to_string(),
            reason: "forbidden".to_string(),
        };
        assert!(!denied.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::TenantNotFound("cfg-cluster".to_string());
        assert_eq!(err.to_string(), "Tenant not found: cfg-cluster");

        let skip = TransformSkip::new("default/pod-1", "missing spec");
        assert_eq!(skip.to_string(), "Skipped default/pod-1: missing spec");
    }
}
