//! Shared utilities
//!
//! Error types and the clock abstraction used by time-windowed components.

pub mod clock;
pub mod error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{TelemetryError, TelemetryResult};
