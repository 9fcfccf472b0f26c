//! Clip splitting module
//!
//! Cuts event-bounded clips out of a finished session recording:
//! - `VideoCutter` trait and the ffmpeg-backed implementation
//! - `ClipSplitter` that translates engine timestamps and writes `videos.json`

pub mod ffmpeg;
pub mod splitter;
pub mod types;

pub use ffmpeg::{FfmpegCutter, VideoCutter};
pub use splitter::{clip_file_name, read_manifest, write_manifest, ClipSplitter, MANIFEST_FILE_NAME};
pub use types::{
    ClipArtifact, ClipRequest, CutClip, CutError, ManifestEntry, ManifestError, SessionOrigin,
    SplitError, SplitReport,
};
