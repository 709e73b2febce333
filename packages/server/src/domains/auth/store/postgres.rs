use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{CredentialStore, StoreError};
use crate::domains::auth::models::{Account, NewRefreshToken, OtpChallenge, RefreshTokenRecord};

/// Postgres-backed credential store
///
/// Guarded mutations are single conditional statements (or one transaction
/// for refresh-token rotation), so several server instances can share one
/// database safely.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn get_challenge(&self, identity: &str) -> Result<Option<OtpChallenge>, StoreError> {
        let challenge = sqlx::query_as::<_, OtpChallenge>(
            "SELECT * FROM otp_challenges WHERE identity = $1",
        )
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?;
        Ok(challenge)
    }

    async fn replace_challenge(
        &self,
        challenge: &OtpChallenge,
        previous: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = match previous {
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO otp_challenges
                        (identity, id, code_hash, created_at, expires_at, attempt_count, blocked_until, delivered_at)
                    VALUES ($1, $2, $3, $4, $5, 0, NULL, NULL)
                    ON CONFLICT (identity) DO NOTHING
                    "#,
                )
                .bind(&challenge.identity)
                .bind(challenge.id)
                .bind(&challenge.code_hash)
                .bind(challenge.created_at)
                .bind(challenge.expires_at)
                .execute(&self.pool)
                .await?
            }
            Some(previous) => {
                sqlx::query(
                    r#"
                    UPDATE otp_challenges
                    SET id = $2,
                        code_hash = $3,
                        created_at = $4,
                        expires_at = $5,
                        attempt_count = 0,
                        blocked_until = NULL,
                        delivered_at = NULL
                    WHERE identity = $1
                      AND id = $6
                      AND (blocked_until IS NULL OR blocked_until <= $7)
                    "#,
                )
                .bind(&challenge.identity)
                .bind(challenge.id)
                .bind(&challenge.code_hash)
                .bind(challenge.created_at)
                .bind(challenge.expires_at)
                .bind(previous)
                .bind(now)
                .execute(&self.pool)
                .await?
            }
        };
        Ok(result.rows_affected() > 0)
    }

    async fn mark_challenge_delivered(
        &self,
        identity: &str,
        challenge_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE otp_challenges SET delivered_at = $3 WHERE identity = $1 AND id = $2",
        )
        .bind(identity)
        .bind(challenge_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_failed_attempt(
        &self,
        identity: &str,
        challenge_id: Uuid,
        max_attempts: i32,
        block_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpChallenge>, StoreError> {
        let challenge = sqlx::query_as::<_, OtpChallenge>(
            r#"
            UPDATE otp_challenges
            SET attempt_count = attempt_count + 1,
                blocked_until = CASE
                    WHEN attempt_count + 1 >= $3 THEN $4
                    ELSE blocked_until
                END
            WHERE identity = $1
              AND id = $2
              AND (blocked_until IS NULL OR blocked_until <= $5)
            RETURNING *
            "#,
        )
        .bind(identity)
        .bind(challenge_id)
        .bind(max_attempts)
        .bind(block_until)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(challenge)
    }

    async fn clear_challenge_block(
        &self,
        identity: &str,
        challenge_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpChallenge>, StoreError> {
        let challenge = sqlx::query_as::<_, OtpChallenge>(
            r#"
            UPDATE otp_challenges
            SET attempt_count = 0, blocked_until = NULL
            WHERE identity = $1
              AND id = $2
              AND blocked_until IS NOT NULL
              AND blocked_until <= $3
            RETURNING *
            "#,
        )
        .bind(identity)
        .bind(challenge_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(challenge)
    }

    async fn consume_challenge(
        &self,
        identity: &str,
        challenge_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM otp_challenges
            WHERE identity = $1
              AND id = $2
              AND (blocked_until IS NULL OR blocked_until <= $3)
            "#,
        )
        .bind(identity)
        .bind(challenge_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_account(&self, identity: &str) -> Result<Option<Account>, StoreError> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE identity = $1")
            .bind(identity)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn find_or_create_account(
        &self,
        account: Account,
    ) -> Result<(Account, bool), StoreError> {
        let inserted = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (id, identity, is_admin, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (identity) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(account.id)
        .bind(&account.identity)
        .bind(account.is_admin)
        .bind(account.is_active)
        .bind(account.created_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(created) = inserted {
            return Ok((created, true));
        }

        let existing = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE identity = $1")
            .bind(&account.identity)
            .fetch_one(&self.pool)
            .await?;
        Ok((existing, false))
    }

    async fn insert_refresh_token(
        &self,
        token: NewRefreshToken,
    ) -> Result<RefreshTokenRecord, StoreError> {
        let mut tx = self.pool.begin().await?;

        let generation = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO refresh_token_generations (identity, generation)
            VALUES ($1, 1)
            ON CONFLICT (identity)
            DO UPDATE SET generation = refresh_token_generations.generation + 1
            RETURNING generation
            "#,
        )
        .bind(&token.identity)
        .fetch_one(&mut *tx)
        .await?;

        prune_dead_tokens(&mut tx, &token.identity, token.issued_at).await?;

        sqlx::query(
            "UPDATE refresh_tokens SET status = 'revoked' WHERE identity = $1 AND status = 'active'",
        )
        .bind(&token.identity)
        .execute(&mut *tx)
        .await?;

        let record = insert_token_row(&mut tx, &token, generation).await?;

        tx.commit().await?;
        Ok(record)
    }

    async fn find_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            "SELECT * FROM refresh_tokens WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn rotate_refresh_token(
        &self,
        current: &RefreshTokenRecord,
        next: NewRefreshToken,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // The row lock on the generation serializes concurrent rotations;
        // the loser re-reads the advanced generation and matches nothing.
        let generation = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE refresh_token_generations
            SET generation = generation + 1
            WHERE identity = $1 AND generation = $2
            RETURNING generation
            "#,
        )
        .bind(&current.identity)
        .bind(current.generation)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(generation) = generation else {
            return Ok(None);
        };

        let superseded = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET status = 'superseded'
            WHERE token_hash = $1 AND status = 'active'
            "#,
        )
        .bind(&current.token_hash)
        .execute(&mut *tx)
        .await?;

        if superseded.rows_affected() != 1 {
            // Dropping the transaction rolls back the generation bump
            return Ok(None);
        }

        prune_dead_tokens(&mut tx, &current.identity, next.issued_at).await?;

        let record = insert_token_row(&mut tx, &next, generation).await?;

        tx.commit().await?;
        Ok(Some(record))
    }

    async fn revoke_refresh_tokens(&self, identity: &str) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Generation row first, same lock order as insert and rotate
        sqlx::query(
            r#"
            INSERT INTO refresh_token_generations (identity, generation)
            VALUES ($1, 1)
            ON CONFLICT (identity)
            DO UPDATE SET generation = refresh_token_generations.generation + 1
            "#,
        )
        .bind(identity)
        .execute(&mut *tx)
        .await?;

        let revoked = sqlx::query(
            "UPDATE refresh_tokens SET status = 'revoked' WHERE identity = $1 AND status = 'active'",
        )
        .bind(identity)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(revoked)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let challenges = sqlx::query(
            r#"
            DELETE FROM otp_challenges
            WHERE expires_at <= $1
              AND (blocked_until IS NULL OR blocked_until <= $1)
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let tokens = sqlx::query(
            "DELETE FROM refresh_tokens WHERE status = 'revoked' OR expires_at <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(challenges + tokens)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

/// Delete the identity's revoked and expired tokens. Superseded tokens stay
/// until they expire so a replay still reads as reuse.
async fn prune_dead_tokens(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    identity: &str,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM refresh_tokens
        WHERE identity = $1
          AND (status = 'revoked' OR expires_at <= $2)
        "#,
    )
    .bind(identity)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

async fn insert_token_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    token: &NewRefreshToken,
    generation: i64,
) -> Result<RefreshTokenRecord, sqlx::Error> {
    sqlx::query_as::<_, RefreshTokenRecord>(
        r#"
        INSERT INTO refresh_tokens
            (token_hash, identity, account_id, generation, status, issued_at, expires_at)
        VALUES ($1, $2, $3, $4, 'active', $5, $6)
        RETURNING *
        "#,
    )
    .bind(&token.token_hash)
    .bind(&token.identity)
    .bind(token.account_id)
    .bind(generation)
    .bind(token.issued_at)
    .bind(token.expires_at)
    .fetch_one(&mut **tx)
    .await
}
