pub mod context;
mod error;

pub use context::Context;
pub use error::Error;

/// Commands handed off for execution always resolve against this PATH,
/// never the caller's environment.
pub const SECURE_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";
