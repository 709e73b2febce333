//! HTTP error mapping

use axum::{
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::domains::auth::errors::ceil_seconds;
use crate::domains::auth::AuthError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {message}")]
    BadRequest { code: &'static str, message: String },

    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            code,
            message: message.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request("INVALID_REQUEST", rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts_remaining: Option<u32>,
    /// Seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<i64>,
}

fn auth_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidIdentity(_)
        | AuthError::NotFound
        | AuthError::Expired
        | AuthError::InvalidCode { .. }
        | AuthError::UnsupportedChannel => StatusCode::BAD_REQUEST,
        AuthError::Blocked { .. } | AuthError::Throttled { .. } => StatusCode::TOO_MANY_REQUESTS,
        AuthError::TokenInvalid | AuthError::TokenExpired | AuthError::RefreshReused => {
            StatusCode::UNAUTHORIZED
        }
        AuthError::AccountDisabled => StatusCode::FORBIDDEN,
        AuthError::DeliveryFailed(_) => StatusCode::BAD_GATEWAY,
        AuthError::PersistenceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::BadRequest { code, message } => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: code.to_string(),
                    message: message.clone(),
                    attempts_remaining: None,
                    retry_after: None,
                },
            ),
            ApiError::Unauthorized { message } => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "UNAUTHORIZED".to_string(),
                    message: message.clone(),
                    attempts_remaining: None,
                    retry_after: None,
                },
            ),
            ApiError::Auth(err) => {
                let status = auth_status(err);
                let message = match err {
                    AuthError::PersistenceUnavailable(e) => {
                        tracing::error!(error = %e, "Credential store error");
                        "service temporarily unavailable".to_string()
                    }
                    AuthError::Signing(e) => {
                        tracing::error!(error = %e, "Token signing failed");
                        "internal error".to_string()
                    }
                    other => other.to_string(),
                };
                let attempts_remaining = match err {
                    AuthError::InvalidCode { attempts_remaining } => Some(*attempts_remaining),
                    _ => None,
                };
                (
                    status,
                    ErrorBody {
                        code: err.code().to_string(),
                        message,
                        attempts_remaining,
                        retry_after: err.retry_after().map(|d| ceil_seconds(&d)),
                    },
                )
            }
        };

        let retry_after = body.retry_after;
        let mut response = (status, Json(ErrorResponse { error: body })).into_response();

        if let Some(seconds) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            auth_status(&AuthError::InvalidCode {
                attempts_remaining: 3
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            auth_status(&AuthError::Blocked {
                retry_after: Duration::minutes(15)
            }),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            auth_status(&AuthError::RefreshReused),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            auth_status(&AuthError::AccountDisabled),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            auth_status(&AuthError::DeliveryFailed("down".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            auth_status(&AuthError::UnsupportedChannel),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_blocked_sets_retry_after_header() {
        let response = ApiError::from(AuthError::Blocked {
            retry_after: Duration::milliseconds(899_500),
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "900");
    }

    #[test]
    fn test_token_errors_challenge_bearer() {
        let response = ApiError::from(AuthError::TokenExpired).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }
}
