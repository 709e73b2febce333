//! Auth routes
//!
//! POST /auth/send-code, /auth/verify-code, /auth/refresh, /auth/logout
//! GET  /auth/me

use axum::{extract::rejection::JsonRejection, extract::Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domains::auth::actions::{send_otp, sign_in};
use crate::domains::auth::models::{is_well_formed_code, Identity, OTP_CODE_LENGTH};
use crate::domains::auth::{AuthError, TokenPair};
use crate::server::app::AxumAppState;
use crate::server::error::ApiError;
use crate::server::middleware::AuthUser;

#[derive(Debug, Deserialize)]
pub struct SendCodeRequest {
    pub identity: String,
}

#[derive(Debug, Serialize)]
pub struct SendCodeResponse {
    pub sent: bool,
    pub expires_in: i64,
    pub resend_after: i64,
}

#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    pub identity: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_new_user: Option<bool>,
}

impl TokenResponse {
    fn new(tokens: TokenPair, is_new_user: Option<bool>) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: tokens.token_type,
            expires_in: tokens.expires_in,
            is_new_user,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub revoked: u64,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: Uuid,
    pub identity: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

pub async fn send_code_handler(
    Extension(state): Extension<AxumAppState>,
    payload: Result<Json<SendCodeRequest>, JsonRejection>,
) -> Result<Json<SendCodeResponse>, ApiError> {
    let Json(request) = payload?;
    let identity = Identity::parse(&request.identity)?;

    let sent = send_otp(&identity, &state.deps).await?;
    Ok(Json(SendCodeResponse {
        sent: true,
        expires_in: sent.expires_in,
        resend_after: sent.resend_after,
    }))
}

pub async fn verify_code_handler(
    Extension(state): Extension<AxumAppState>,
    payload: Result<Json<VerifyCodeRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Json(request) = payload?;
    let identity = Identity::parse(&request.identity)?;

    let code = request.code.trim();
    if !is_well_formed_code(code) {
        return Err(ApiError::bad_request(
            "INVALID_CODE_FORMAT",
            format!("code must be {OTP_CODE_LENGTH} digits"),
        ));
    }

    let signed_in = sign_in(&identity, code, &state.deps).await?;
    Ok(Json(TokenResponse::new(
        signed_in.tokens,
        Some(signed_in.is_new_user),
    )))
}

pub async fn refresh_handler(
    Extension(state): Extension<AxumAppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Json(request) = payload?;
    let tokens = state.deps.tokens.refresh(request.refresh_token.trim()).await?;
    Ok(Json(TokenResponse::new(tokens, None)))
}

pub async fn logout_handler(
    Extension(state): Extension<AxumAppState>,
    user: AuthUser,
) -> Result<Json<LogoutResponse>, ApiError> {
    let revoked = state.deps.tokens.revoke(&user.identity).await?;
    Ok(Json(LogoutResponse { revoked }))
}

pub async fn me_handler(
    Extension(state): Extension<AxumAppState>,
    user: AuthUser,
) -> Result<Json<MeResponse>, ApiError> {
    let account = state
        .deps
        .store
        .find_account(&user.identity)
        .await
        .map_err(AuthError::from)?
        .ok_or(AuthError::TokenInvalid)?;

    if !account.is_active {
        return Err(AuthError::AccountDisabled.into());
    }

    Ok(Json(MeResponse {
        id: account.id,
        identity: account.identity,
        is_admin: account.is_admin,
        is_active: account.is_active,
        created_at: account.created_at,
    }))
}
