//! Upload pacing
//!
//! - Durable per-window byte budget
//! - Dispatcher feeding finished artifacts to the upload transport

pub mod dispatcher;
pub mod rate_limit;

pub use dispatcher::{DispatchOutcome, UploadDispatcher, UploadTransport};
pub use rate_limit::{RateLimitConfig, RateWindow, UploadRateLimiter};
