//! Auth domain actions - business logic functions
//!
//! Actions are async functions called directly from the HTTP handlers. They
//! take `ServerDeps` so tests can run them against mocks.

mod send_otp;
mod sign_in;
mod verify_otp;

pub use send_otp::{send_otp, OtpSent};
pub use sign_in::{sign_in, SignedIn};
pub use verify_otp::verify_otp;
