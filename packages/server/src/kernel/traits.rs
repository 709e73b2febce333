// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Naming convention: Base* for trait names (e.g., BaseCodeDelivery, BaseClock)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domains::auth::models::{Identity, IdentityKind};

// =============================================================================
// Code Delivery Trait (Infrastructure - out-of-band OTP transport)
// =============================================================================

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("channel not supported for {0}")]
    UnsupportedChannel(String),

    #[error("provider rejected message: {0}")]
    Provider(String),

    #[error("transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait BaseCodeDelivery: Send + Sync {
    /// Whether this channel can reach identities of `kind`
    fn supports(&self, kind: IdentityKind) -> bool;

    /// Deliver a one-time code to the identity (SMS, email, log...)
    async fn send(&self, identity: &Identity, code: &str) -> Result<(), DeliveryError>;
}

// =============================================================================
// Clock Trait
// =============================================================================

/// Source of "now" for every expiry and lockout decision
pub trait BaseClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
