//! Request middleware: rate limiting and panic recovery.

pub mod panic;
pub mod rate_limit;

pub use panic::create_panic_handler;
pub use rate_limit::{rate_limit_middleware, RateLimitConfig, RateLimitLayer};
