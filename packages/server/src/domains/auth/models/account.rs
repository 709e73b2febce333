use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::identifier::Identity;

/// Account - created on the first successful verification of an identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Account {
    pub id: Uuid,
    pub identity: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(identity: &Identity, is_admin: bool, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity: identity.as_str().to_string(),
            is_admin,
            is_active: true,
            created_at: now,
        }
    }
}
