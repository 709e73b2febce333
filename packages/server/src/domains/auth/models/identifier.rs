use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domains::auth::errors::AuthError;

lazy_static! {
    static ref PHONE_RE: Regex = Regex::new(r"^\+[1-9][0-9]{7,14}$").expect("valid phone regex");
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex");
}

const MAX_IDENTITY_LEN: usize = 254;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    Phone,
    Email,
}

/// Identity - the external account key an OTP and tokens are bound to
///
/// Either an E.164 phone number or an email address, always stored in
/// normalized form (emails lowercased, phone separators stripped).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Parse and normalize a raw identity
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AuthError::InvalidIdentity("identity is required".into()));
        }
        if trimmed.len() > MAX_IDENTITY_LEN {
            return Err(AuthError::InvalidIdentity("identity is too long".into()));
        }

        if trimmed.contains('@') {
            let email = trimmed.to_lowercase();
            if !EMAIL_RE.is_match(&email) {
                return Err(AuthError::InvalidIdentity(
                    "email address is not valid".into(),
                ));
            }
            return Ok(Self(email));
        }

        let phone: String = trimmed
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
            .collect();
        if !PHONE_RE.is_match(&phone) {
            return Err(AuthError::InvalidIdentity(
                "phone number must include country code (e.g., +998901112233)".into(),
            ));
        }
        Ok(Self(phone))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> IdentityKind {
        if self.0.contains('@') {
            IdentityKind::Email
        } else {
            IdentityKind::Phone
        }
    }

    /// Masked form for logs: `+99890*****33`, `j***@example.com`
    pub fn masked(&self) -> String {
        match self.kind() {
            IdentityKind::Email => {
                let (local, domain) = self.0.split_once('@').unwrap_or((&self.0, ""));
                let first: String = local.chars().take(1).collect();
                format!("{first}***@{domain}")
            }
            IdentityKind::Phone => {
                let chars: Vec<char> = self.0.chars().collect();
                let keep_head = 6.min(chars.len());
                let keep_tail = 2.min(chars.len() - keep_head);
                let hidden = chars.len() - keep_head - keep_tail;
                let head: String = chars[..keep_head].iter().collect();
                let tail: String = chars[chars.len() - keep_tail..].iter().collect();
                format!("{head}{}{tail}", "*".repeat(hidden))
            }
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identity {
    type Error = AuthError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Identity::parse(&value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Hash a secret (OTP code or refresh token) using SHA256
///
/// Secrets are hashed before they reach the credential store - we never
/// persist raw codes or refresh tokens.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Check if an identity should be granted admin privileges
///
/// - For emails: case-insensitive matching
/// - For phone numbers: exact match (E.164 format)
pub fn is_admin_identifier(identity: &Identity, admin_identifiers: &[String]) -> bool {
    let identity = identity.as_str();
    admin_identifiers.iter().any(|admin_id| {
        let admin_id = admin_id.trim();
        if identity.contains('@') && admin_id.contains('@') {
            admin_id.eq_ignore_ascii_case(identity)
        } else {
            admin_id == identity
        }
    })
}
