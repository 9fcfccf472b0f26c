//! Collaborator trait definitions
//!
//! The vision engine and the video recorder live outside this crate; the
//! session writer only drives them through these seams.

use crate::clips::types::ClipRequest;
use crate::recorder::state::SessionCompleted;
use std::path::Path;
use tokio::sync::mpsc;

/// Telemetry-saving session of the native vision engine
pub trait NativeSession: Send + Sync {
    /// Start saving telemetry into `output_dir`
    fn start_session(&self, output_dir: &Path);

    /// Stop saving telemetry
    fn stop_session(&self);

    /// Engine clock in seconds; event timestamps use the same clock
    fn current_clock_seconds(&self) -> f64;

    /// Clip boundaries reported since the last reset
    fn pending_clip_boundaries(&self) -> Vec<ClipRequest>;

    fn reset_clip_boundaries(&self);
}

/// Device video recorder
pub trait VideoRecorder: Send + Sync {
    fn start_recording(&self, dest: &Path) -> anyhow::Result<()>;
    fn stop_recording(&self) -> anyhow::Result<()>;
}

/// Receives finished sessions
pub trait SessionListener: Send + Sync {
    fn on_session_complete(&self, event: SessionCompleted);
}

impl SessionListener for mpsc::UnboundedSender<SessionCompleted> {
    fn on_session_complete(&self, event: SessionCompleted) {
        if self.send(event).is_err() {
            tracing::warn!("Session listener channel closed, dropping completion event");
        }
    }
}

impl<L: SessionListener + ?Sized> SessionListener for std::sync::Arc<L> {
    fn on_session_complete(&self, event: SessionCompleted) {
        (**self).on_session_complete(event)
    }
}
