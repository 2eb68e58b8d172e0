//! Error responses: every failure becomes `{"ok": false, "error": "..."}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

use crate::error::Error;

/// Error returned by API handlers.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl<E> From<E> for ApiError
where
    E: Into<Error>,
{
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Delivery(_) => StatusCode::BAD_GATEWAY,
            Error::Config(_)
            | Error::Personalize(_)
            | Error::Message(_)
            | Error::Credential(_)
            | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Operator-facing message, without the category prefix.
    pub fn message(&self) -> String {
        match &self.0 {
            Error::Config(e) => e.to_string(),
            Error::Validation(e) => e.to_string(),
            Error::Personalize(e) => e.to_string(),
            Error::Message(e) => e.to_string(),
            Error::Delivery(e) => e.to_string(),
            Error::Credential(e) => e.to_string(),
            Error::Io(e) => e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %message, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %message, "Request rejected");
        }
        (
            status,
            Json(serde_json::json!({ "ok": false, "error": message })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, DeliveryError, ValidationError};

    #[test]
    fn statuses_by_category() {
        assert_eq!(
            ApiError::from(ValidationError::MissingSender).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ConfigError::FontNotFound { checked: "x".into() }).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(DeliveryError::RequestFailed {
                provider: "gmail".into(),
                reason: "timeout".into(),
            })
            .status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn message_is_unprefixed() {
        assert_eq!(
            ApiError::from(ValidationError::NotConnected).message(),
            "Not connected to Gmail. Click Connect Google first."
        );
    }
}
