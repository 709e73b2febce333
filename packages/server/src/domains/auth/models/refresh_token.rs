use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::identifier::hash_secret;

const REFRESH_TOKEN_PREFIX: &str = "rt_";

/// Lifecycle of one refresh-token generation. `Superseded` and `Revoked`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "refresh_token_status", rename_all = "snake_case")]
pub enum RefreshTokenStatus {
    Active,
    Superseded,
    Revoked,
}

/// Persisted refresh token (hash only)
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub token_hash: String,
    pub identity: String,
    pub account_id: Uuid,
    pub generation: i64,
    pub status: RefreshTokenStatus,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A refresh token about to be persisted; the store assigns the generation.
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub token_hash: String,
    pub identity: String,
    pub account_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewRefreshToken {
    pub fn into_record(self, generation: i64) -> RefreshTokenRecord {
        RefreshTokenRecord {
            token_hash: self.token_hash,
            identity: self.identity,
            account_id: self.account_id,
            generation,
            status: RefreshTokenStatus::Active,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
        }
    }
}

/// Opaque refresh token: prefix + 32 random bytes, hex encoded
pub fn generate_refresh_token() -> String {
    let bytes: [u8; 32] = rand::random();
    format!("{REFRESH_TOKEN_PREFIX}{}", hex::encode(bytes))
}

pub fn hash_refresh_token(token: &str) -> String {
    hash_secret(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_refresh_token_is_unique() {
        let a = generate_refresh_token();
        let b = generate_refresh_token();
        assert!(a.starts_with("rt_"));
        assert_eq!(a.len(), 3 + 64);
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_is_stable() {
        let token = generate_refresh_token();
        assert_eq!(hash_refresh_token(&token), hash_refresh_token(&token));
        assert_ne!(hash_refresh_token(&token), token);
    }
}
