//! Recording state management
//!
//! Defines the session state machine, the scheduling policies and the event
//! emitted when a session's artifacts are ready.

use crate::clips::types::{ClipArtifact, SessionOrigin};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default length of an auto-rotated session
pub const DEFAULT_SESSION_LENGTH: Duration = Duration::from_secs(5 * 60);

/// Current state of a session writer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No session in progress
    Idle,
    /// Native session and recorder are running
    Recording,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}

/// How a writer bounds its sessions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPolicy {
    /// One session into `output_dir`, bounded by explicit start/stop
    Bounded { output_dir: PathBuf },

    /// Back-to-back sessions of `period`, each in a fresh directory under
    /// `root_dir`, split into clips when they end
    Rotating { root_dir: PathBuf, period: Duration },
}

impl SessionPolicy {
    pub fn rotating(root_dir: impl Into<PathBuf>) -> Self {
        Self::Rotating {
            root_dir: root_dir.into(),
            period: DEFAULT_SESSION_LENGTH,
        }
    }

    pub fn bounded(output_dir: impl Into<PathBuf>) -> Self {
        Self::Bounded {
            output_dir: output_dir.into(),
        }
    }

    /// Rotation period, if any
    pub fn period(&self) -> Option<Duration> {
        match self {
            Self::Bounded { .. } => None,
            Self::Rotating { period, .. } => Some(*period),
        }
    }
}

/// Information about the session being recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSession {
    /// Session index (0, 1, 2, ...) for this writer
    pub index: u64,

    /// Wall clock time at start
    pub start_wall_clock: DateTime<Utc>,

    /// Device clock reading (seconds) at start
    pub start_device_clock_secs: f64,

    /// Buffer slot the recorder writes into
    pub target_slot: PathBuf,

    /// Directory receiving native telemetry and clips
    pub output_dir: PathBuf,
}

impl RecordingSession {
    pub fn origin(&self) -> SessionOrigin {
        SessionOrigin {
            device_clock_secs: self.start_device_clock_secs,
            wall_clock: self.start_wall_clock,
        }
    }
}

/// Artifacts of a finished auto-rotated session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCompleted {
    /// Clips cut from the recording
    pub clips: Vec<ClipArtifact>,

    /// The full session recording (a buffer slot)
    pub raw_recording_path: PathBuf,

    /// Session output directory
    pub output_dir: PathBuf,

    /// Manifest path, `None` if it could not be written
    pub manifest_path: Option<PathBuf>,

    /// Wall clock time the session started
    pub session_start_wall_clock: DateTime<Utc>,

    /// Device clock reading (seconds) the session started at
    pub session_start_device_clock_secs: f64,
}
