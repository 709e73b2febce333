use chrono::Duration;
use thiserror::Error;

use crate::domains::auth::store::StoreError;

/// Authentication failures surfaced by the OTP and token services.
///
/// `NotFound` and `Expired` deliberately render the same message so a
/// response never reveals whether an identity was seen before.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("no active code for this identity or it has expired")]
    NotFound,

    #[error("no active code for this identity or it has expired")]
    Expired,

    #[error("invalid code, {attempts_remaining} attempts remaining")]
    InvalidCode { attempts_remaining: u32 },

    #[error("too many failed attempts, retry in {} seconds", ceil_seconds(.retry_after))]
    Blocked { retry_after: Duration },

    #[error("a code was sent recently, retry in {} seconds", ceil_seconds(.retry_after))]
    Throttled { retry_after: Duration },

    #[error("codes cannot be delivered to this kind of identity")]
    UnsupportedChannel,

    #[error("failed to deliver code: {0}")]
    DeliveryFailed(String),

    #[error("invalid token")]
    TokenInvalid,

    #[error("token expired")]
    TokenExpired,

    #[error("refresh token reuse detected, all sessions revoked")]
    RefreshReused,

    #[error("account is disabled")]
    AccountDisabled,

    #[error("credential store unavailable: {0}")]
    PersistenceUnavailable(#[from] StoreError),

    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

impl AuthError {
    /// Machine-readable error code used in HTTP responses.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidIdentity(_) => "INVALID_IDENTITY",
            AuthError::NotFound => "OTP_NOT_FOUND",
            AuthError::Expired => "OTP_EXPIRED",
            AuthError::InvalidCode { .. } => "INVALID_CODE",
            AuthError::Blocked { .. } => "OTP_BLOCKED",
            AuthError::Throttled { .. } => "OTP_THROTTLED",
            AuthError::UnsupportedChannel => "UNSUPPORTED_CHANNEL",
            AuthError::DeliveryFailed(_) => "DELIVERY_FAILED",
            AuthError::TokenInvalid => "TOKEN_INVALID",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::RefreshReused => "REFRESH_REUSED",
            AuthError::AccountDisabled => "ACCOUNT_DISABLED",
            AuthError::PersistenceUnavailable(_) => "SERVICE_UNAVAILABLE",
            AuthError::Signing(_) => "INTERNAL_ERROR",
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AuthError::Blocked { retry_after } | AuthError::Throttled { retry_after } => {
                Some(*retry_after)
            }
            _ => None,
        }
    }

    /// Whether the same request may succeed if simply repeated later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuthError::DeliveryFailed(_)
                | AuthError::PersistenceUnavailable(_)
                | AuthError::Blocked { .. }
                | AuthError::Throttled { .. }
        )
    }
}

/// Round a duration up to whole seconds (never below zero).
pub fn ceil_seconds(duration: &Duration) -> i64 {
    let millis = duration.num_milliseconds().max(0);
    (millis + 999) / 1000
}
