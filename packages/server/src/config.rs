use anyhow::{bail, Context, Result};
use chrono::Duration;
use dotenvy::dotenv;
use std::env;
use std::fmt;
use std::str::FromStr;
use twilio::TwilioOptions;

use crate::domains::auth::models::Identity;

/// Tunables for OTP issuance, lockout and token lifetimes
#[derive(Clone)]
pub struct AuthConfig {
    pub otp_max_attempts: u32,
    pub otp_block: Duration,
    pub otp_ttl: Duration,
    pub otp_resend_interval: Duration,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub jwt_secret: String,
    pub jwt_issuer: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            otp_max_attempts: 5,
            otp_block: Duration::minutes(15),
            otp_ttl: Duration::seconds(120),
            otp_resend_interval: Duration::seconds(60),
            access_token_ttl: Duration::minutes(1440),
            refresh_token_ttl: Duration::days(7),
            jwt_secret: generate_secret(),
            jwt_issuer: "cyberpitch".to_string(),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("otp_max_attempts", &self.otp_max_attempts)
            .field("otp_block", &self.otp_block)
            .field("otp_ttl", &self.otp_ttl)
            .field("otp_resend_interval", &self.otp_resend_interval)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("jwt_secret", &"<redacted>")
            .field("jwt_issuer", &self.jwt_issuer)
            .finish()
    }
}

/// Resend credentials for email delivery
#[derive(Clone)]
pub struct EmailOptions {
    pub api_key: String,
    /// Sender, e.g. `CyberPitch <noreply@cyberpitch.uz>`
    pub from: String,
}

impl fmt::Debug for EmailOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailOptions")
            .field("api_key", &"<redacted>")
            .field("from", &self.from)
            .finish()
    }
}

/// How one-time codes leave the building
#[derive(Debug, Clone)]
pub enum DeliveryConfig {
    /// Phones go by SMS, emails by Resend; an unconfigured kind is refused
    Providers {
        sms: Option<TwilioOptions>,
        email: Option<EmailOptions>,
    },
    /// Development only: the code is written to the log
    Log,
}

/// Per-IP limit on the auth routes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Sustained requests per second
    pub per_second: u64,
    pub burst: u32,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// `None` runs with the in-memory credential store
    pub database_url: Option<String>,
    pub port: u16,
    pub auth: AuthConfig,
    /// True when JWT_SECRET was not provided and a random one was generated
    pub jwt_secret_generated: bool,
    pub admin_identifiers: Vec<String>,
    pub delivery: DeliveryConfig,
    pub rate_limit: Option<RateLimitConfig>,
    /// How often expired challenges and dead refresh tokens are swept
    pub purge_interval: Option<std::time::Duration>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();
        Self::from_source(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_source<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AuthConfig::default();

        let (jwt_secret, jwt_secret_generated) = match get("JWT_SECRET") {
            Some(secret) if !secret.trim().is_empty() => (secret, false),
            _ => (defaults.jwt_secret.clone(), true),
        };

        let auth = AuthConfig {
            otp_max_attempts: parse_or(&get, "OTP_MAX_ATTEMPTS", defaults.otp_max_attempts)?,
            otp_block: Duration::minutes(parse_or(&get, "OTP_BLOCK_MINUTES", 15)?),
            otp_ttl: Duration::seconds(parse_or(&get, "OTP_TTL_SECONDS", 120)?),
            otp_resend_interval: Duration::seconds(parse_or(
                &get,
                "OTP_RESEND_INTERVAL_SECONDS",
                60,
            )?),
            access_token_ttl: Duration::minutes(parse_or(&get, "ACCESS_TOKEN_TTL_MINUTES", 1440)?),
            refresh_token_ttl: Duration::days(parse_or(&get, "REFRESH_TOKEN_TTL_DAYS", 7)?),
            jwt_secret,
            jwt_issuer: get("JWT_ISSUER").unwrap_or(defaults.jwt_issuer),
        };

        if auth.otp_max_attempts == 0 || auth.otp_max_attempts > i32::MAX as u32 {
            bail!("OTP_MAX_ATTEMPTS must be between 1 and {}", i32::MAX);
        }

        let delivery = delivery_from(&get)?;

        let per_second: u64 = parse_or(&get, "RATE_LIMIT_PER_SECOND", 10)?;
        let burst: u32 = parse_or(&get, "RATE_LIMIT_BURST", 20)?;
        let rate_limit = (per_second > 0 && burst > 0).then_some(RateLimitConfig { per_second, burst });

        let purge_seconds: u64 = parse_or(&get, "STORE_PURGE_INTERVAL_SECONDS", 300)?;
        let purge_interval =
            (purge_seconds > 0).then(|| std::time::Duration::from_secs(purge_seconds));

        Ok(Self {
            database_url: get("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            port: parse_or(&get, "PORT", 8080)?,
            auth,
            jwt_secret_generated,
            admin_identifiers: admin_identifiers_from(get("ADMIN_IDENTIFIERS"))?,
            delivery,
            rate_limit,
            purge_interval,
        })
    }
}

/// `OTP_DELIVERY` is `log` or a comma-separated list of `twilio` and `resend`
fn delivery_from<F>(get: &F) -> Result<DeliveryConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = get("OTP_DELIVERY").unwrap_or_else(|| "twilio".to_string());
    if raw.trim() == "log" {
        return Ok(DeliveryConfig::Log);
    }

    let mut sms = None;
    let mut email = None;
    for channel in raw.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        match channel {
            "twilio" => {
                sms = Some(TwilioOptions {
                    account_sid: get("TWILIO_ACCOUNT_SID")
                        .context("TWILIO_ACCOUNT_SID must be set")?,
                    auth_token: get("TWILIO_AUTH_TOKEN").context("TWILIO_AUTH_TOKEN must be set")?,
                    from_number: get("TWILIO_FROM_NUMBER")
                        .context("TWILIO_FROM_NUMBER must be set")?,
                })
            }
            "resend" => {
                email = Some(EmailOptions {
                    api_key: get("RESEND_API_KEY").context("RESEND_API_KEY must be set")?,
                    from: get("RESEND_FROM_EMAIL").context("RESEND_FROM_EMAIL must be set")?,
                })
            }
            other => bail!("OTP_DELIVERY channels are 'twilio', 'resend' or 'log', got '{other}'"),
        }
    }

    if sms.is_none() && email.is_none() {
        bail!("OTP_DELIVERY must name at least one channel");
    }
    Ok(DeliveryConfig::Providers { sms, email })
}

/// Normalize each entry the same way sign-in normalizes identities
fn admin_identifiers_from(raw: Option<String>) -> Result<Vec<String>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            Identity::parse(id)
                .map(String::from)
                .with_context(|| format!("ADMIN_IDENTIFIERS entry '{id}' is not a valid identity"))
        })
        .collect()
}

fn parse_or<F, T>(get: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a valid number")),
        None => Ok(default),
    }
}

/// 32 random bytes, hex encoded
fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}
