// CyberPitch - authentication core
//
// OTP sign-in, access/refresh token lifecycle and the HTTP surface that
// exposes them. The binary in server/main.rs wires these together.

pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
