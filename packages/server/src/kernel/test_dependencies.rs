// TestDependencies - mock implementations for testing
//
// Provides mock services that can be injected into ServerDeps for tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::{BaseClock, BaseCodeDelivery, DeliveryError, ServerDeps};
use crate::config::AuthConfig;
use crate::domains::auth::models::{Identity, IdentityKind};
use crate::domains::auth::store::{CredentialStore, InMemoryCredentialStore};

// =============================================================================
// Mock Code Delivery
// =============================================================================

/// A code handed to the delivery channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCode {
    pub identity: String,
    pub code: String,
}

#[derive(Clone, Default)]
pub struct MockCodeDelivery {
    sent: Arc<Mutex<Vec<SentCode>>>,
    fail: Arc<AtomicBool>,
    unsupported: Arc<Mutex<Vec<IdentityKind>>>,
}

impl MockCodeDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail (or succeed again)
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Stop accepting identities of `kind`, like an SMS-only provider
    pub fn set_unsupported(&self, kind: IdentityKind) {
        self.unsupported.lock().unwrap().push(kind);
    }

    pub fn sent(&self) -> Vec<SentCode> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Most recent code delivered to `identity`
    pub fn last_code_for(&self, identity: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| s.identity == identity)
            .map(|s| s.code.clone())
    }
}

#[async_trait]
impl BaseCodeDelivery for MockCodeDelivery {
    fn supports(&self, kind: IdentityKind) -> bool {
        !self.unsupported.lock().unwrap().contains(&kind)
    }

    async fn send(&self, identity: &Identity, code: &str) -> Result<(), DeliveryError> {
        if !self.supports(identity.kind()) {
            return Err(DeliveryError::UnsupportedChannel(identity.masked()));
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeliveryError::Transport("mock delivery failure".to_string()));
        }
        self.sent.lock().unwrap().push(SentCode {
            identity: identity.as_str().to_string(),
            code: code.to_string(),
        });
        Ok(())
    }
}

// =============================================================================
// Manual Clock
// =============================================================================

#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap() = to;
    }
}

/// Starts at the current wall-clock second; access tokens are checked
/// against real time by the JWT library.
impl Default for ManualClock {
    fn default() -> Self {
        let now = Utc::now();
        Self::new(Utc.timestamp_opt(now.timestamp(), 0).unwrap())
    }
}

impl BaseClock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// =============================================================================
// TestDependencies
// =============================================================================

/// ServerDeps wired to an in-memory store, mock delivery and manual clock.
/// The mocks are kept here so tests can inspect and steer them.
pub struct TestDependencies {
    pub deps: ServerDeps,
    pub store: Arc<dyn CredentialStore>,
    pub delivery: MockCodeDelivery,
    pub clock: ManualClock,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self::with_config(Self::auth_config())
    }

    pub fn with_admins(admin_identifiers: Vec<String>) -> Self {
        Self::build(
            Arc::new(InMemoryCredentialStore::new()),
            Self::auth_config(),
            admin_identifiers,
        )
    }

    pub fn with_config(auth: AuthConfig) -> Self {
        Self::build(Arc::new(InMemoryCredentialStore::new()), auth, Vec::new())
    }

    /// Same mocks on top of a caller-provided store (e.g. Postgres)
    pub fn with_store(store: Arc<dyn CredentialStore>) -> Self {
        Self::build(store, Self::auth_config(), Vec::new())
    }

    fn build(
        store: Arc<dyn CredentialStore>,
        auth: AuthConfig,
        admin_identifiers: Vec<String>,
    ) -> Self {
        let delivery = MockCodeDelivery::new();
        let clock = ManualClock::default();
        let deps = ServerDeps::new(
            store.clone(),
            Arc::new(delivery.clone()),
            Arc::new(clock.clone()),
            auth,
            admin_identifiers,
        );
        Self {
            deps,
            store,
            delivery,
            clock,
        }
    }

    /// Default tunables with a fixed signing secret
    pub fn auth_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test_secret_key".to_string(),
            ..AuthConfig::default()
        }
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
