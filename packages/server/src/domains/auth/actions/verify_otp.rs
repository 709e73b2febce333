//! Verify OTP action

use tracing::{info, warn};

use crate::domains::auth::errors::AuthError;
use crate::domains::auth::models::{Identity, LockState};
use crate::kernel::ServerDeps;

/// Check `code` against the identity's challenge and consume it on success.
///
/// Order of checks: missing, expired, blocked, then the constant-time code
/// comparison. Every mismatch counts toward the lockout; reaching the limit
/// blocks the identity in the same write.
pub async fn verify_otp(identity: &Identity, code: &str, deps: &ServerDeps) -> Result<(), AuthError> {
    let now = deps.now();
    let config = &deps.auth;
    let key = identity.as_str();

    let mut challenge = deps
        .store
        .get_challenge(key)
        .await?
        .ok_or(AuthError::NotFound)?;

    if challenge.is_expired(now) {
        return Err(AuthError::Expired);
    }

    match challenge.lock_state(now) {
        LockState::Locked { until } => {
            return Err(AuthError::Blocked {
                retry_after: until - now,
            });
        }
        LockState::Elapsed => {
            challenge = match deps.store.clear_challenge_block(key, challenge.id, now).await? {
                Some(cleared) => cleared,
                None => deps
                    .store
                    .get_challenge(key)
                    .await?
                    .filter(|c| c.id == challenge.id && c.lock_state(now) == LockState::Open)
                    .ok_or(AuthError::NotFound)?,
            };
        }
        LockState::Open => {}
    }

    if challenge.matches(code) {
        if !deps.store.consume_challenge(key, challenge.id, now).await? {
            // Consumed, replaced or blocked by a concurrent request
            return Err(concurrent_outcome(deps, key, now).await?);
        }
        info!(identity = %identity.masked(), "OTP verified");
        return Ok(());
    }

    let max_attempts = i32::try_from(config.otp_max_attempts).unwrap_or(i32::MAX);
    let block_until = now + config.otp_block;
    let updated = deps
        .store
        .record_failed_attempt(key, challenge.id, max_attempts, block_until, now)
        .await?;

    let Some(updated) = updated else {
        return Err(concurrent_outcome(deps, key, now).await?);
    };

    if let Some(until) = updated.blocked_until {
        warn!(
            identity = %identity.masked(),
            attempts = updated.attempt_count,
            "Too many failed OTP attempts, identity blocked"
        );
        return Err(AuthError::Blocked {
            retry_after: until - now,
        });
    }

    let attempts_remaining = (max_attempts - updated.attempt_count).max(0) as u32;
    info!(
        identity = %identity.masked(),
        attempts_remaining,
        "Invalid OTP code"
    );
    Err(AuthError::InvalidCode { attempts_remaining })
}

/// Error for a guarded write that lost to another request
async fn concurrent_outcome(
    deps: &ServerDeps,
    key: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<AuthError, AuthError> {
    Ok(match deps.store.get_challenge(key).await? {
        Some(current) => match current.lock_state(now) {
            LockState::Locked { until } => AuthError::Blocked {
                retry_after: until - now,
            },
            _ => AuthError::NotFound,
        },
        None => AuthError::NotFound,
    })
}
