use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, Rng};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use super::identifier::{hash_secret, Identity};

pub const OTP_CODE_LENGTH: usize = 6;

/// OTP challenge - the single pending code for an identity
///
/// The raw code only exists in memory long enough to be delivered; the store
/// sees `code_hash`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct OtpChallenge {
    pub id: Uuid,
    pub identity: String,
    pub code_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempt_count: i32,
    pub blocked_until: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Lockout state of a challenge at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Open,
    Locked { until: DateTime<Utc> },
    /// `blocked_until` has passed but the attempt counter was not reset yet
    Elapsed,
}

impl OtpChallenge {
    pub fn new(identity: &Identity, code: &str, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity: identity.as_str().to_string(),
            code_hash: hash_secret(code),
            created_at: now,
            expires_at: now + ttl,
            attempt_count: 0,
            blocked_until: None,
            delivered_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn lock_state(&self, now: DateTime<Utc>) -> LockState {
        match self.blocked_until {
            None => LockState::Open,
            Some(until) if now < until => LockState::Locked { until },
            Some(_) => LockState::Elapsed,
        }
    }

    /// Constant-time comparison of the submitted code against the stored hash.
    pub fn matches(&self, submitted: &str) -> bool {
        let submitted_hash = hash_secret(submitted);
        submitted_hash
            .as_bytes()
            .ct_eq(self.code_hash.as_bytes())
            .into()
    }

    /// Time left before another code may be sent, if the current one was
    /// delivered less than `interval` ago.
    pub fn resend_wait(&self, now: DateTime<Utc>, interval: Duration) -> Option<Duration> {
        let delivered_at = self.delivered_at?;
        let available_at = delivered_at + interval;
        (now < available_at).then(|| available_at - now)
    }
}

/// Generate a uniformly random numeric code from the OS CSPRNG
pub fn generate_code() -> String {
    let code: u32 = OsRng.gen_range(0..10u32.pow(OTP_CODE_LENGTH as u32));
    format!("{:0width$}", code, width = OTP_CODE_LENGTH)
}

/// Syntactic check applied before a submission reaches the verifier
pub fn is_well_formed_code(code: &str) -> bool {
    code.len() == OTP_CODE_LENGTH && code.chars().all(|c| c.is_ascii_digit())
}
