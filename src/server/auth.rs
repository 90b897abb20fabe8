use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{
        HeaderValue, StatusCode,
        header::{AUTHORIZATION, COOKIE, WWW_AUTHENTICATE},
        request::Parts,
    },
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::server::AppState;

const TOKEN_COOKIE: &str = "token";

/// The provider access token presented by the caller.
pub struct RequireToken(pub String);

#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    MissingAuth,
    InvalidScheme,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match self {
            AuthError::MissingAuth => "Authentication required",
            AuthError::InvalidScheme => "Invalid authorization scheme",
        };

        let body = json!({ "data": null, "error": message });
        let mut response = (StatusCode::UNAUTHORIZED, Json(body)).into_response();
        response.headers_mut().insert(
            WWW_AUTHENTICATE,
            HeaderValue::from_static("Bearer realm=\"gitsift\""),
        );
        response
    }
}

impl FromRequestParts<Arc<AppState>> for RequireToken {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok());
        if let Some(token) = extract_token_from_header(auth_header)? {
            return Ok(RequireToken(token));
        }

        parts
            .headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|h| h.to_str().ok())
            .find_map(token_from_cookie)
            .map(RequireToken)
            .ok_or(AuthError::MissingAuth)
    }
}

/// Reads a bearer token. A header with another scheme is rejected rather than
/// falling back to the cookie.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Result<Option<String>, AuthError> {
    match auth_header {
        Some(header) => match header.strip_prefix("Bearer ") {
            Some(token) if !token.trim().is_empty() => Ok(Some(token.trim().to_string())),
            _ => Err(AuthError::InvalidScheme),
        },
        None => Ok(None),
    }
}

fn token_from_cookie(header: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == TOKEN_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}
