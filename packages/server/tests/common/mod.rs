// Common test utilities

pub mod harness;
pub mod http;

pub use harness::*;
pub use http::*;

/// A phone identity no other test uses
pub fn unique_phone() -> String {
    let n: u32 = rand::random::<u32>() % 10_000_000;
    format!("+99890{n:07}")
}
