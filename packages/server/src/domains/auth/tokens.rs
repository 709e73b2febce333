//! Token lifecycle: issue, validate, rotate and revoke.
//!
//! Access tokens are stateless JWTs. Refresh tokens are opaque random strings
//! stored only as hashes, one active generation per identity. Rotation is a
//! compare-and-swap on that generation; presenting a token that has already
//! been rotated is treated as theft and revokes every session of the
//! identity.

use chrono::Duration;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::errors::AuthError;
use super::jwt::{AccessClaims, JwtService};
use super::models::{
    generate_refresh_token, hash_refresh_token, Account, NewRefreshToken, RefreshTokenStatus,
};
use super::store::CredentialStore;
use crate::kernel::BaseClock;

pub const TOKEN_TYPE_BEARER: &str = "bearer";

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

pub struct TokenService {
    store: Arc<dyn CredentialStore>,
    jwt: Arc<JwtService>,
    clock: Arc<dyn BaseClock>,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        jwt: Arc<JwtService>,
        clock: Arc<dyn BaseClock>,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            store,
            jwt,
            clock,
            refresh_ttl,
        }
    }

    /// Mint a fresh pair after a successful verification. The identity's
    /// previous session (if any) is revoked.
    pub async fn issue(&self, account: &Account) -> Result<TokenPair, AuthError> {
        let now = self.clock.now();
        let access_token = self.jwt.create_access_token(account, now)?;

        let refresh_token = generate_refresh_token();
        let record = self
            .store
            .insert_refresh_token(NewRefreshToken {
                token_hash: hash_refresh_token(&refresh_token),
                identity: account.identity.clone(),
                account_id: account.id,
                issued_at: now,
                expires_at: now + self.refresh_ttl,
            })
            .await?;

        debug!(
            account_id = %account.id,
            generation = record.generation,
            "Issued token pair"
        );
        Ok(self.pair(access_token, refresh_token))
    }

    /// Stateless access token check
    pub fn validate_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        self.jwt.verify_access_token(token)
    }

    /// Exchange a refresh token for a new pair. Single use.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let now = self.clock.now();
        let token_hash = hash_refresh_token(refresh_token);

        let current = self
            .store
            .find_refresh_token(&token_hash)
            .await?
            .ok_or(AuthError::TokenInvalid)?;

        match current.status {
            RefreshTokenStatus::Revoked => return Err(AuthError::TokenInvalid),
            RefreshTokenStatus::Superseded => {
                return Err(self.contain_reuse(&current.identity).await);
            }
            RefreshTokenStatus::Active => {}
        }

        if current.is_expired(now) {
            return Err(AuthError::TokenExpired);
        }

        let account = self
            .store
            .find_account(&current.identity)
            .await?
            .ok_or(AuthError::TokenInvalid)?;
        if !account.is_active {
            return Err(AuthError::AccountDisabled);
        }

        let next_token = generate_refresh_token();
        let rotated = self
            .store
            .rotate_refresh_token(
                &current,
                NewRefreshToken {
                    token_hash: hash_refresh_token(&next_token),
                    identity: current.identity.clone(),
                    account_id: account.id,
                    issued_at: now,
                    expires_at: now + self.refresh_ttl,
                },
            )
            .await?;

        let Some(rotated) = rotated else {
            // Someone else rotated (or revoked) this generation first
            return Err(self.contain_reuse(&current.identity).await);
        };

        debug!(
            account_id = %account.id,
            generation = rotated.generation,
            "Rotated refresh token"
        );
        let access_token = self.jwt.create_access_token(&account, now)?;
        Ok(self.pair(access_token, next_token))
    }

    /// Revoke every refresh token of the identity. Outstanding access tokens
    /// stay valid until they expire.
    pub async fn revoke(&self, identity: &str) -> Result<u64, AuthError> {
        let revoked = self.store.revoke_refresh_tokens(identity).await?;
        info!(revoked, "Revoked refresh tokens");
        Ok(revoked)
    }

    async fn contain_reuse(&self, identity: &str) -> AuthError {
        warn!("Refresh token reuse detected, revoking all sessions");
        if let Err(e) = self.store.revoke_refresh_tokens(identity).await {
            return AuthError::PersistenceUnavailable(e);
        }
        AuthError::RefreshReused
    }

    fn pair(&self, access_token: String, refresh_token: String) -> TokenPair {
        TokenPair {
            access_token,
            refresh_token,
            token_type: TOKEN_TYPE_BEARER,
            expires_in: self.jwt.access_ttl().num_seconds(),
        }
    }
}
