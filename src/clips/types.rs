//! Clip types and errors
//!
//! Types shared by the splitter, the video cutter and the session writer's
//! completion events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Span of interest reported by the vision engine, in absolute device-clock
/// seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipRequest {
    pub start_secs: f64,
    pub end_secs: f64,
}

impl ClipRequest {
    pub fn new(start_secs: f64, end_secs: f64) -> Self {
        Self {
            start_secs,
            end_secs,
        }
    }
}

/// Where a recording started, on both clocks
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOrigin {
    /// Device clock reading (seconds) when the recording started
    pub device_clock_secs: f64,

    /// Wall clock time when the recording started
    pub wall_clock: DateTime<Utc>,
}

/// Span actually written by the cutter, in seconds relative to the source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutClip {
    pub start_secs: f64,
    pub end_secs: f64,
}

/// A clip file produced from a session recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipArtifact {
    /// Path of the clip file
    pub path: PathBuf,

    /// Start offset relative to the source recording (seconds)
    pub start_secs: f64,

    /// End offset relative to the source recording (seconds)
    pub end_secs: f64,

    /// Wall clock start (session start + start offset)
    pub wall_start: DateTime<Utc>,

    /// Wall clock end (session start + end offset)
    pub wall_end: DateTime<Utc>,

    /// Size of the clip file in bytes
    pub size_bytes: u64,
}

impl ClipArtifact {
    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }
}

/// One entry of a session's `videos.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Clip file name
    pub name: String,

    /// Absolute device-clock start (seconds, 2 decimals)
    pub start: f64,

    /// Absolute device-clock end (seconds, 2 decimals)
    pub end: f64,
}

/// Result of splitting one recording
#[derive(Debug, Clone)]
pub struct SplitReport {
    pub manifest_path: PathBuf,
    pub clips: Vec<ClipArtifact>,
}

/// Video cut errors
#[derive(Error, Debug)]
pub enum CutError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    #[error("Invalid clip range: {start_ms}ms..{end_ms}ms")]
    InvalidRange { start_ms: u64, end_ms: u64 },
}

/// Manifest write errors
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Split errors
///
/// Cutting is best-effort per clip, so the only failure surfaced here is the
/// manifest. The clips that were cut are handed back so the manifest can be
/// regenerated without cutting the video again.
#[derive(Error, Debug)]
pub enum SplitError {
    #[error("Clips were cut but the manifest could not be written: {source}")]
    Manifest {
        clips: Vec<ClipArtifact>,
        #[source]
        source: ManifestError,
    },
}

impl SplitError {
    /// Clips produced before the failure
    pub fn clips(&self) -> &[ClipArtifact] {
        match self {
            SplitError::Manifest { clips, .. } => clips,
        }
    }

    pub fn into_clips(self) -> Vec<ClipArtifact> {
        match self {
            SplitError::Manifest { clips, .. } => clips,
        }
    }
}
