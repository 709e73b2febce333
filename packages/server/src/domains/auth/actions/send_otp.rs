//! Send OTP action

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domains::auth::errors::AuthError;
use crate::domains::auth::models::{generate_code, Identity, LockState, OtpChallenge};
use crate::kernel::{DeliveryError, ServerDeps};

/// Result of sending an OTP
#[derive(Debug, Clone, Serialize)]
pub struct OtpSent {
    /// Seconds until the code expires
    pub expires_in: i64,
    /// Seconds until another code may be requested
    pub resend_after: i64,
}

/// Generate a code for `identity`, replace its challenge and deliver it.
///
/// Refused up front when no configured channel can reach the identity, and
/// while the identity is locked out or a code was delivered less than the
/// resend interval ago. A delivery failure leaves the new challenge
/// in place (undelivered, so an immediate retry is allowed).
pub async fn send_otp(identity: &Identity, deps: &ServerDeps) -> Result<OtpSent, AuthError> {
    let now = deps.now();
    let config = &deps.auth;

    if !deps.delivery.supports(identity.kind()) {
        info!(identity = %identity.masked(), "No delivery channel for identity kind");
        return Err(AuthError::UnsupportedChannel);
    }

    let existing = deps.store.get_challenge(identity.as_str()).await?;
    if let Some(current) = &existing {
        if let LockState::Locked { until } = current.lock_state(now) {
            info!(identity = %identity.masked(), "OTP requested while blocked");
            return Err(AuthError::Blocked {
                retry_after: until - now,
            });
        }
        if let Some(wait) = current.resend_wait(now, config.otp_resend_interval) {
            debug!(identity = %identity.masked(), "OTP resend throttled");
            return Err(AuthError::Throttled { retry_after: wait });
        }
    }

    let code = generate_code();
    let challenge = OtpChallenge::new(identity, &code, now, config.otp_ttl);

    let written = deps
        .store
        .replace_challenge(&challenge, existing.as_ref().map(|c| c.id), now)
        .await?;
    if !written {
        // A concurrent request replaced or blocked the challenge first
        return Err(match deps.store.get_challenge(identity.as_str()).await? {
            Some(current) => match current.lock_state(now) {
                LockState::Locked { until } => AuthError::Blocked {
                    retry_after: until - now,
                },
                _ => AuthError::Throttled {
                    retry_after: config.otp_resend_interval,
                },
            },
            None => AuthError::Throttled {
                retry_after: config.otp_resend_interval,
            },
        });
    }

    match deps.delivery.send(identity, &code).await {
        Ok(()) => {}
        Err(DeliveryError::UnsupportedChannel(_)) => return Err(AuthError::UnsupportedChannel),
        Err(e) => {
            warn!(identity = %identity.masked(), error = %e, "Failed to deliver OTP");
            return Err(AuthError::DeliveryFailed(e.to_string()));
        }
    }

    deps.store
        .mark_challenge_delivered(identity.as_str(), challenge.id, deps.now())
        .await?;

    info!(identity = %identity.masked(), "OTP sent");
    Ok(OtpSent {
        expires_in: config.otp_ttl.num_seconds(),
        resend_after: config.otp_resend_interval.num_seconds(),
    })
}
