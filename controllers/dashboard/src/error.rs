//! Server error types and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use watch_engine::EngineError;

/// Errors that can occur in the dashboard server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Engine error
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Malformed request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Tenant file could not be loaded
    #[error("Tenant configuration error: {0:#}")]
    Tenants(#[from] anyhow::Error),

    /// Listener bind or serve failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ServerError {
    /// HTTP status and machine-readable code for the error.
    #[must_use]
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Engine(EngineError::SyncTimeout { .. }) => {
                (StatusCode::SERVICE_UNAVAILABLE, "sync_timeout")
            }
            Self::Engine(EngineError::SessionStopped(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "session_stopped")
            }
            Self::Engine(EngineError::AuthorizationDenied { .. }) => {
                (StatusCode::FORBIDDEN, "forbidden")
            }
            Self::Engine(EngineError::TenantNotFound(_)) => {
                (StatusCode::NOT_FOUND, "tenant_not_found")
            }
            Self::Engine(EngineError::UnknownResource(_)) => {
                (StatusCode::NOT_FOUND, "unknown_resource")
            }
            Self::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            Self::Engine(_) | Self::InvalidConfig(_) | Self::Tenants(_) | Self::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, error) = self.status();
        if status.is_server_error() {
            tracing::warn!("Request failed: {}", self);
        }
        let body = ErrorBody {
            error,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_engine_error_status() {
        let timeout = ServerError::from(EngineError::SyncTimeout {
            session: "cfg-dev-PodInformer".to_string(),
            timeout: Duration::from_secs(10),
        });
        assert_eq!(timeout.status(), (StatusCode::SERVICE_UNAVAILABLE, "sync_timeout"));

        let denied = ServerError::from(EngineError::AuthorizationDenied {
            resource: "cfg-dev-SecretInformer".to_string(),
            reason: "secrets is forbidden".to_string(),
        });
        assert_eq!(denied.status().0, StatusCode::FORBIDDEN);

        let missing = ServerError::from(EngineError::TenantNotFound("cfg-dev".to_string()));
        assert_eq!(missing.status().0, StatusCode::NOT_FOUND);

        let discovery = ServerError::from(EngineError::Discovery("apps/v1".to_string()));
        assert_eq!(discovery.status().0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_engine_message_is_transparent() {
        let err = ServerError::from(EngineError::UnknownResource("widgets".to_string()));
        assert_eq!(err.to_string(), "Unknown resource kind: widgets");
    }
}
