// Server dependencies and infrastructure adapters
//
// ServerDeps is the bundle every action and handler receives. All external
// collaborators are trait objects so tests can swap in mocks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use resend_rs::{types::CreateEmailBaseOptions, Resend};
use std::sync::Arc;
use tracing::info;
use twilio::{TwilioError, TwilioService};

use crate::config::{AuthConfig, EmailOptions};
use crate::domains::auth::models::{Identity, IdentityKind};
use crate::domains::auth::store::CredentialStore;
use crate::domains::auth::{JwtService, TokenService};
use crate::kernel::{BaseClock, BaseCodeDelivery, DeliveryError};

// =============================================================================
// TwilioService Adapter (implements BaseCodeDelivery trait)
// =============================================================================

/// Wrapper around TwilioService that delivers codes by SMS
pub struct TwilioAdapter(pub Arc<TwilioService>);

impl TwilioAdapter {
    pub fn new(service: Arc<TwilioService>) -> Self {
        Self(service)
    }
}

#[async_trait]
impl BaseCodeDelivery for TwilioAdapter {
    fn supports(&self, kind: IdentityKind) -> bool {
        kind == IdentityKind::Phone
    }

    async fn send(&self, identity: &Identity, code: &str) -> Result<(), DeliveryError> {
        if !self.supports(identity.kind()) {
            return Err(DeliveryError::UnsupportedChannel(identity.masked()));
        }

        let body = format!("Your CyberPitch verification code is {code}");
        let message = self
            .0
            .send_sms(identity.as_str(), &body)
            .await
            .map_err(|e| match e {
                TwilioError::Transport(err) => DeliveryError::Transport(err.to_string()),
                TwilioError::Api { status, message } => {
                    DeliveryError::Provider(format!("{status}: {message}"))
                }
            })?;

        info!(sid = %message.sid, status = %message.status, "SMS queued");
        Ok(())
    }
}

// =============================================================================
// Resend Adapter (email)
// =============================================================================

/// Delivers codes by email through Resend
pub struct ResendAdapter {
    client: Resend,
    from: String,
}

impl ResendAdapter {
    pub fn new(options: &EmailOptions) -> Self {
        Self {
            client: Resend::new(&options.api_key),
            from: options.from.clone(),
        }
    }
}

#[async_trait]
impl BaseCodeDelivery for ResendAdapter {
    fn supports(&self, kind: IdentityKind) -> bool {
        kind == IdentityKind::Email
    }

    async fn send(&self, identity: &Identity, code: &str) -> Result<(), DeliveryError> {
        if !self.supports(identity.kind()) {
            return Err(DeliveryError::UnsupportedChannel(identity.masked()));
        }

        let content = VerificationEmail::new(code);
        let email = CreateEmailBaseOptions::new(
            self.from.clone(),
            vec![identity.as_str().to_string()],
            content.subject,
        )
        .with_text(&content.text)
        .with_html(&content.html);

        let sent = self
            .client
            .emails
            .send(email)
            .await
            .map_err(|e| DeliveryError::Provider(e.to_string()))?;

        info!(id = ?sent.id, "Verification email queued");
        Ok(())
    }
}

/// Subject and bodies of the verification email
pub struct VerificationEmail {
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl VerificationEmail {
    pub fn new(code: &str) -> Self {
        Self {
            subject: format!("CyberPitch verification code: {code}"),
            text: format!(
                "Your CyberPitch verification code is {code}\n\n\
                 If you did not request it, ignore this email."
            ),
            html: format!(
                r#"<!DOCTYPE html>
<html>
<body style="font-family: sans-serif; background: #0a0a0a; color: #ddd; padding: 40px 20px;">
    <h1 style="color: #00ff88; text-align: center;">CyberPitch</h1>
    <p style="text-align: center;">Enter this code to sign in:</p>
    <p style="font-size: 36px; letter-spacing: 10px; text-align: center; color: #00ff88; font-family: monospace;">{code}</p>
    <p style="text-align: center; font-size: 12px; color: #666;">If you did not request it, ignore this email.</p>
</body>
</html>"#
            ),
        }
    }
}

// =============================================================================
// Channel routing
// =============================================================================

/// Hands each code to the first channel that can reach the identity
pub struct ChannelRouter {
    channels: Vec<Arc<dyn BaseCodeDelivery>>,
}

impl ChannelRouter {
    pub fn new(channels: Vec<Arc<dyn BaseCodeDelivery>>) -> Self {
        Self { channels }
    }
}

#[async_trait]
impl BaseCodeDelivery for ChannelRouter {
    fn supports(&self, kind: IdentityKind) -> bool {
        self.channels.iter().any(|c| c.supports(kind))
    }

    async fn send(&self, identity: &Identity, code: &str) -> Result<(), DeliveryError> {
        match self.channels.iter().find(|c| c.supports(identity.kind())) {
            Some(channel) => channel.send(identity, code).await,
            None => Err(DeliveryError::UnsupportedChannel(identity.masked())),
        }
    }
}

// =============================================================================
// Log delivery (development)
// =============================================================================

/// Writes the code to the log instead of sending it. Never use in production.
pub struct LogDelivery;

#[async_trait]
impl BaseCodeDelivery for LogDelivery {
    fn supports(&self, _kind: IdentityKind) -> bool {
        true
    }

    async fn send(&self, identity: &Identity, code: &str) -> Result<(), DeliveryError> {
        info!(identity = %identity.masked(), code = %code, "OTP code (log delivery)");
        Ok(())
    }
}

// =============================================================================
// Clock
// =============================================================================

pub struct SystemClock;

impl BaseClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// =============================================================================
// ServerDeps
// =============================================================================

/// Server dependencies accessible to actions and handlers (using traits for testability)
#[derive(Clone)]
pub struct ServerDeps {
    pub store: Arc<dyn CredentialStore>,
    pub delivery: Arc<dyn BaseCodeDelivery>,
    pub clock: Arc<dyn BaseClock>,
    pub tokens: Arc<TokenService>,
    pub auth: AuthConfig,
    pub admin_identifiers: Vec<String>,
}

impl ServerDeps {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        delivery: Arc<dyn BaseCodeDelivery>,
        clock: Arc<dyn BaseClock>,
        auth: AuthConfig,
        admin_identifiers: Vec<String>,
    ) -> Self {
        let jwt_service = Arc::new(JwtService::new(
            &auth.jwt_secret,
            auth.jwt_issuer.clone(),
            auth.access_token_ttl,
        ));
        let tokens = Arc::new(TokenService::new(
            store.clone(),
            jwt_service,
            clock.clone(),
            auth.refresh_token_ttl,
        ));

        Self {
            store,
            delivery,
            clock,
            tokens,
            auth,
            admin_identifiers,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
