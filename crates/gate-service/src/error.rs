use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Error taxonomy for the gate service.
///
/// Per-frame evaluation failures never surface here; they degrade to a
/// DENIED decision with a specific reason. These variants cover setup-time
/// failures, session state violations, and request problems.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("face recognition model is not trained")]
    ModelNotTrained,

    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("session '{0}' not found")]
    SessionNotFound(String),

    #[error("session '{0}' has passed its deadline")]
    SessionExpired(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("external service timed out: {0}")]
    ExternalServiceTimeout(String),

    #[error("external service error: {0}")]
    ExternalService(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = match &self {
            GateError::ModelNotTrained | GateError::CameraUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GateError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            GateError::SessionExpired(_) => StatusCode::GONE,
            GateError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GateError::ExternalServiceTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GateError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            GateError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_are_specific() {
        assert_eq!(
            GateError::ModelNotTrained.to_string(),
            "face recognition model is not trained"
        );
        assert!(GateError::SessionExpired("s-1".into())
            .to_string()
            .contains("s-1"));
        assert!(GateError::CameraUnavailable("/dev/video0".into())
            .to_string()
            .contains("/dev/video0"));
    }
}
