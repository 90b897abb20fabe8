use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;

use crate::error::Error;
use crate::upstream::UpstreamError;

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    #[must_use]
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }
}

/// API error that converts to a proper HTTP response
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match &err {
            Error::NotFound(name) => {
                Self::new(StatusCode::NOT_FOUND, format!("Repository not found: {name}"))
            }
            Error::Conflict(msg) => Self::new(StatusCode::CONFLICT, msg.clone()),
            Error::BadRequest(msg) => Self::new(StatusCode::BAD_REQUEST, msg.clone()),
            Error::Upstream(UpstreamError::Unauthorized) => {
                Self::new(StatusCode::UNAUTHORIZED, "Provider rejected the token")
            }
            e if e.is_retryable() => {
                tracing::warn!("Dependency unavailable: {err}");
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "Service temporarily unavailable")
            }
            _ => {
                tracing::error!("Request failed: {err}");
                Self::internal("Internal server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "data": null, "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: Error) -> StatusCode {
        ApiError::from(err).status
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(status_of(Error::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(Error::Conflict("x".into())), StatusCode::CONFLICT);
        assert_eq!(status_of(Error::BadRequest("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(Error::Upstream(UpstreamError::Unauthorized)),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(Error::Timeout {
                service: "search backend"
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(Error::Upstream(UpstreamError::Network("reset".into()))),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(Error::backend("search", "boom")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let err = ApiError::from(Error::backend("search", "secret detail"));
        assert_eq!(err.message, "Internal server error");
    }
}
