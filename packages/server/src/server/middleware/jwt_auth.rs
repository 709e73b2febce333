use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::debug;
use uuid::Uuid;

use crate::domains::auth::AccessClaims;
use crate::server::app::AxumAppState;
use crate::server::error::ApiError;

/// Authenticated caller, from a valid access token
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub account_id: Uuid,
    pub identity: String,
    pub is_admin: bool,
    pub claims: AccessClaims,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let app_state = parts
            .extensions
            .get::<AxumAppState>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized {
                message: "authentication unavailable".to_string(),
            })?;

        let token = bearer_token(&parts.headers).ok_or_else(|| ApiError::Unauthorized {
            message: "missing bearer token".to_string(),
        })?;

        let claims = app_state.deps.tokens.validate_access(token)?;
        debug!(
            account_id = %claims.account_id,
            is_admin = claims.is_admin,
            "Authenticated request"
        );

        Ok(AuthUser {
            account_id: claims.account_id,
            identity: claims.identity.clone(),
            is_admin: claims.is_admin,
            claims,
        })
    }
}

/// Token from the Authorization header (handles both "Bearer <token>" and raw token)
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth_str = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = auth_str.strip_prefix("Bearer ").unwrap_or(auth_str).trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_extract_token_with_bearer() {
        assert_eq!(bearer_token(&headers("Bearer abc.def")), Some("abc.def"));
    }

    #[test]
    fn test_extract_token_without_bearer() {
        assert_eq!(bearer_token(&headers("abc.def")), Some("abc.def"));
    }

    #[test]
    fn test_no_auth_header() {
        assert_eq!(bearer_token(&HeaderMap::new()), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
    }
}
