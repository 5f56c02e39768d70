//! HTTP middleware: rate limiting and security headers.

pub mod rate_limit;
pub mod security_headers;

pub use rate_limit::{FixedWindowLimiter, Limiters};
