//! Session recording module
//!
//! This module drives the camera and the native engine through sessions:
//! - BufferRotator hands out reusable recording targets
//! - SessionWriter serializes session transitions on a background worker
//! - SessionManager switches between continuous capture and user recordings

pub mod manager;
pub mod rotator;
pub mod state;
pub mod traits;
pub mod writer;

pub use manager::{CaptureLayout, SessionManager};
pub use rotator::BufferRotator;
pub use state::{RecordingSession, SessionCompleted, SessionPolicy, SessionState};
pub use traits::{NativeSession, SessionListener, VideoRecorder};
pub use writer::{SessionComponents, SessionError, SessionWriter};
