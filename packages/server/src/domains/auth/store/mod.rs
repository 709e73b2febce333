//! Credential store - persistence seam for OTP challenges, accounts and
//! refresh tokens.
//!
//! Every mutation that guards a security invariant is a conditional update
//! (keyed by challenge id or refresh-token generation) so that correctness
//! holds with concurrent requests and multiple service instances.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domains::auth::models::{Account, NewRefreshToken, OtpChallenge, RefreshTokenRecord};

pub use memory::InMemoryCredentialStore;
pub use postgres::PgCredentialStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    // -------------------------------------------------------------------------
    // OTP challenges (one row per identity)
    // -------------------------------------------------------------------------

    async fn get_challenge(&self, identity: &str) -> Result<Option<OtpChallenge>, StoreError>;

    /// Replace the identity's challenge with `challenge`.
    ///
    /// `previous` is the id the caller observed (`None` = no challenge). The
    /// write only happens if that is still the current challenge and it is
    /// not under an active block at `now`. Returns whether it was written.
    async fn replace_challenge(
        &self,
        challenge: &OtpChallenge,
        previous: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn mark_challenge_delivered(
        &self,
        identity: &str,
        challenge_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Atomically increment `attempt_count`; when it reaches `max_attempts`
    /// set `blocked_until` in the same write. Skipped (returns `None`) when
    /// the challenge changed or is blocked at `now`.
    async fn record_failed_attempt(
        &self,
        identity: &str,
        challenge_id: Uuid,
        max_attempts: i32,
        block_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpChallenge>, StoreError>;

    /// Reset attempts and clear an elapsed block. `None` when there was no
    /// elapsed block to clear on that challenge.
    async fn clear_challenge_block(
        &self,
        identity: &str,
        challenge_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpChallenge>, StoreError>;

    /// Delete the challenge if it is still `challenge_id` and not blocked at
    /// `now`. Only one caller can observe `true`.
    async fn consume_challenge(
        &self,
        identity: &str,
        challenge_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    // -------------------------------------------------------------------------
    // Accounts
    // -------------------------------------------------------------------------

    async fn find_account(&self, identity: &str) -> Result<Option<Account>, StoreError>;

    /// Insert `account` unless one exists for its identity. Returns the stored
    /// account and whether it was created by this call.
    async fn find_or_create_account(&self, account: Account)
        -> Result<(Account, bool), StoreError>;

    // -------------------------------------------------------------------------
    // Refresh tokens
    // -------------------------------------------------------------------------

    /// Advance the identity's generation, revoke any active token and insert
    /// `token` as the new active generation. Revoked and expired tokens of
    /// the identity left from earlier sessions are deleted.
    async fn insert_refresh_token(
        &self,
        token: NewRefreshToken,
    ) -> Result<RefreshTokenRecord, StoreError>;

    async fn find_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Compare-and-swap rotation: succeeds only if `current.generation` is
    /// still the identity's generation and `current` is still active. The old
    /// record becomes `Superseded` and is kept until it expires, so a replay
    /// is still recognized as reuse. Revoked and expired tokens of the
    /// identity are deleted. `None` means the race was lost.
    async fn rotate_refresh_token(
        &self,
        current: &RefreshTokenRecord,
        next: NewRefreshToken,
    ) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Revoke every active refresh token of the identity and advance its
    /// generation. Returns the number of tokens revoked.
    async fn revoke_refresh_tokens(&self, identity: &str) -> Result<u64, StoreError>;

    // -------------------------------------------------------------------------
    // Housekeeping
    // -------------------------------------------------------------------------

    /// Delete challenges that expired and are not under a block, and refresh
    /// tokens that are revoked or expired. Returns how many records went.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Run `purge_expired` every `every` until the task is aborted
pub fn spawn_purge_task(
    store: Arc<dyn CredentialStore>,
    every: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match store.purge_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "Purged expired credentials"),
                Err(e) => warn!(error = %e, "Credential purge failed"),
            }
        }
    })
}
