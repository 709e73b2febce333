//! Auth domain - OTP sign-in and token lifecycle
//!
//! Responsibilities:
//! - One-time code issuance, delivery and verification with lockout
//! - Access token (JWT) minting and validation
//! - Refresh token rotation with reuse detection

pub mod actions;
pub mod errors;
pub mod jwt;
pub mod models;
pub mod store;
pub mod tokens;

pub use errors::AuthError;
pub use jwt::{AccessClaims, JwtService};
pub use tokens::{TokenPair, TokenService};
