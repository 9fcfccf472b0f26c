//! On-disk storage management
//!
//! - Quota enforcement over recording output directories
//! - Durable counters backing the upload rate limiter

pub mod quota;
pub mod store;

pub use quota::{dir_size_recursive, QuotaEnforcer, QuotaScanEntry};
pub use store::{CounterStore, JsonFileStore, MemoryStore, StoreError};
