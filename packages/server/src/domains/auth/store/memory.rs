use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{CredentialStore, StoreError};
use crate::domains::auth::models::{
    Account, LockState, NewRefreshToken, OtpChallenge, RefreshTokenRecord, RefreshTokenStatus,
};

/// Everything owned by one identity. Mutated only under its own mutex.
#[derive(Default)]
struct IdentitySlot {
    challenge: Option<OtpChallenge>,
    account: Option<Account>,
    generation: i64,
    refresh_tokens: HashMap<String, RefreshTokenRecord>,
}

impl IdentitySlot {
    /// Drop revoked and expired tokens, returning their hashes
    fn prune_tokens(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let dead: Vec<String> = self
            .refresh_tokens
            .values()
            .filter(|r| r.status == RefreshTokenStatus::Revoked || r.is_expired(now))
            .map(|r| r.token_hash.clone())
            .collect();
        for hash in &dead {
            self.refresh_tokens.remove(hash);
        }
        dead
    }

    /// Drop a challenge that expired and is not holding a block
    fn prune_challenge(&mut self, now: DateTime<Utc>) -> bool {
        let stale = self.challenge.as_ref().is_some_and(|c| {
            c.is_expired(now) && !matches!(c.lock_state(now), LockState::Locked { .. })
        });
        if stale {
            self.challenge = None;
        }
        stale
    }

    fn is_empty(&self) -> bool {
        self.challenge.is_none() && self.account.is_none() && self.refresh_tokens.is_empty()
    }
}

/// In-memory credential store
///
/// Used when no database is configured (development) and in tests. Each
/// identity has its own mutex, so requests for different identities never
/// wait on each other beyond the brief outer map lookup.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    slots: RwLock<HashMap<String, Arc<Mutex<IdentitySlot>>>>,
    /// refresh token hash -> identity
    token_index: RwLock<HashMap<String, String>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, identity: &str) -> Arc<Mutex<IdentitySlot>> {
        if let Some(slot) = self.slots.read().await.get(identity) {
            return slot.clone();
        }
        self.slots
            .write()
            .await
            .entry(identity.to_string())
            .or_default()
            .clone()
    }

    async fn existing_slot(&self, identity: &str) -> Option<Arc<Mutex<IdentitySlot>>> {
        self.slots.read().await.get(identity).cloned()
    }

    /// Swap pruned hashes out of the index and add the new one
    async fn reindex(&self, removed: Vec<String>, added: &RefreshTokenRecord) {
        let mut index = self.token_index.write().await;
        for hash in removed {
            index.remove(&hash);
        }
        index.insert(added.token_hash.clone(), added.identity.clone());
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get_challenge(&self, identity: &str) -> Result<Option<OtpChallenge>, StoreError> {
        let Some(slot) = self.existing_slot(identity).await else {
            return Ok(None);
        };
        let slot = slot.lock().await;
        Ok(slot.challenge.clone())
    }

    async fn replace_challenge(
        &self,
        challenge: &OtpChallenge,
        previous: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let slot = self.slot(&challenge.identity).await;
        let mut slot = slot.lock().await;

        let may_write = match (&slot.challenge, previous) {
            (None, None) => true,
            (Some(current), Some(previous)) => {
                current.id == previous
                    && !matches!(current.lock_state(now), LockState::Locked { .. })
            }
            _ => false,
        };
        if may_write {
            slot.challenge = Some(challenge.clone());
        }
        Ok(may_write)
    }

    async fn mark_challenge_delivered(
        &self,
        identity: &str,
        challenge_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let Some(slot) = self.existing_slot(identity).await else {
            return Ok(false);
        };
        let mut slot = slot.lock().await;
        match slot.challenge.as_mut() {
            Some(challenge) if challenge.id == challenge_id => {
                challenge.delivered_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_failed_attempt(
        &self,
        identity: &str,
        challenge_id: Uuid,
        max_attempts: i32,
        block_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpChallenge>, StoreError> {
        let Some(slot) = self.existing_slot(identity).await else {
            return Ok(None);
        };
        let mut slot = slot.lock().await;
        let Some(challenge) = slot.challenge.as_mut() else {
            return Ok(None);
        };
        if challenge.id != challenge_id
            || matches!(challenge.lock_state(now), LockState::Locked { .. })
        {
            return Ok(None);
        }

        challenge.attempt_count += 1;
        if challenge.attempt_count >= max_attempts {
            challenge.blocked_until = Some(block_until);
        }
        Ok(Some(challenge.clone()))
    }

    async fn clear_challenge_block(
        &self,
        identity: &str,
        challenge_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpChallenge>, StoreError> {
        let Some(slot) = self.existing_slot(identity).await else {
            return Ok(None);
        };
        let mut slot = slot.lock().await;
        match slot.challenge.as_mut() {
            Some(challenge)
                if challenge.id == challenge_id
                    && challenge.lock_state(now) == LockState::Elapsed =>
            {
                challenge.attempt_count = 0;
                challenge.blocked_until = None;
                Ok(Some(challenge.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn consume_challenge(
        &self,
        identity: &str,
        challenge_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let Some(slot) = self.existing_slot(identity).await else {
            return Ok(false);
        };
        let mut slot = slot.lock().await;
        let consumable = slot.challenge.as_ref().is_some_and(|c| {
            c.id == challenge_id && !matches!(c.lock_state(now), LockState::Locked { .. })
        });
        if consumable {
            slot.challenge = None;
        }
        Ok(consumable)
    }

    async fn find_account(&self, identity: &str) -> Result<Option<Account>, StoreError> {
        let Some(slot) = self.existing_slot(identity).await else {
            return Ok(None);
        };
        let slot = slot.lock().await;
        Ok(slot.account.clone())
    }

    async fn find_or_create_account(
        &self,
        account: Account,
    ) -> Result<(Account, bool), StoreError> {
        let slot = self.slot(&account.identity).await;
        let mut slot = slot.lock().await;
        if let Some(existing) = &slot.account {
            return Ok((existing.clone(), false));
        }
        slot.account = Some(account.clone());
        Ok((account, true))
    }

    async fn insert_refresh_token(
        &self,
        token: NewRefreshToken,
    ) -> Result<RefreshTokenRecord, StoreError> {
        let slot = self.slot(&token.identity).await;
        let mut slot = slot.lock().await;

        let pruned = slot.prune_tokens(token.issued_at);
        slot.generation += 1;
        for record in slot.refresh_tokens.values_mut() {
            if record.status == RefreshTokenStatus::Active {
                record.status = RefreshTokenStatus::Revoked;
            }
        }

        let record = token.into_record(slot.generation);
        slot.refresh_tokens
            .insert(record.token_hash.clone(), record.clone());
        self.reindex(pruned, &record).await;
        Ok(record)
    }

    async fn find_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let identity = match self.token_index.read().await.get(token_hash) {
            Some(identity) => identity.clone(),
            None => return Ok(None),
        };
        let Some(slot) = self.existing_slot(&identity).await else {
            return Ok(None);
        };
        let slot = slot.lock().await;
        Ok(slot.refresh_tokens.get(token_hash).cloned())
    }

    async fn rotate_refresh_token(
        &self,
        current: &RefreshTokenRecord,
        next: NewRefreshToken,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let Some(slot) = self.existing_slot(&current.identity).await else {
            return Ok(None);
        };
        let mut slot = slot.lock().await;

        if slot.generation != current.generation {
            return Ok(None);
        }
        match slot.refresh_tokens.get_mut(&current.token_hash) {
            Some(record) if record.status == RefreshTokenStatus::Active => {
                record.status = RefreshTokenStatus::Superseded;
            }
            _ => return Ok(None),
        }

        let pruned = slot.prune_tokens(next.issued_at);
        slot.generation += 1;
        let record = next.into_record(slot.generation);
        slot.refresh_tokens
            .insert(record.token_hash.clone(), record.clone());
        self.reindex(pruned, &record).await;
        Ok(Some(record))
    }

    async fn revoke_refresh_tokens(&self, identity: &str) -> Result<u64, StoreError> {
        let Some(slot) = self.existing_slot(identity).await else {
            return Ok(0);
        };
        let mut slot = slot.lock().await;

        let mut revoked = 0;
        for record in slot.refresh_tokens.values_mut() {
            if record.status == RefreshTokenStatus::Active {
                record.status = RefreshTokenStatus::Revoked;
                revoked += 1;
            }
        }
        slot.generation += 1;
        Ok(revoked)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut removed = 0u64;
        let mut dead_hashes = Vec::new();

        {
            let mut slots = self.slots.write().await;
            slots.retain(|_, slot| {
                // A slot someone else holds is in use; leave it for the next sweep
                if Arc::strong_count(slot) > 1 {
                    return true;
                }
                let Ok(mut slot) = slot.try_lock() else {
                    return true;
                };
                if slot.prune_challenge(now) {
                    removed += 1;
                }
                let dead = slot.prune_tokens(now);
                removed += dead.len() as u64;
                dead_hashes.extend(dead);
                !slot.is_empty()
            });
        }

        if !dead_hashes.is_empty() {
            let mut index = self.token_index.write().await;
            for hash in dead_hashes {
                index.remove(&hash);
            }
        }
        Ok(removed)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
