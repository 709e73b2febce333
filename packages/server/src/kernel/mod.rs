//! Kernel module - server infrastructure and dependencies.

pub mod deps;
pub mod test_dependencies;
pub mod traits;

pub use deps::{
    ChannelRouter, LogDelivery, ResendAdapter, ServerDeps, SystemClock, TwilioAdapter,
    VerificationEmail,
};
pub use test_dependencies::{ManualClock, MockCodeDelivery, SentCode, TestDependencies};
pub use traits::*;
