//! Cross-cutting request middleware.
//!
//! ARCHITECTURE
//! ============
//! The chain is assembled in `routes::app` in this fixed order, outermost
//! first:
//!
//! 1. `security_headers`  helmet-style response headers
//! 2. CORS                single allowed origin, credentials on
//! 3. compression         gzip negotiation
//! 4. access log          `TraceLayer`, one line per response
//! 5. `body_limit`        buffer bodies up to 10 MB, 413 beyond
//! 6. `rate_limit`        sliding window per client IP, 429 beyond
//!
//! A rejecting step returns its response directly, so nothing downstream
//! (including the router) runs.

pub mod access_log;
pub mod body_limit;
pub mod rate_limit;
pub mod security_headers;

/// Hard ceiling for JSON and URL-encoded request bodies.
pub const BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;
