//! Dashcam telemetry - session recording, clip extraction and paced upload.
//!
//! This is the main library crate. The host supplies the native vision
//! engine, the camera recorder and the upload transport; this crate drives
//! them through sessions, cuts event clips out of finished recordings, keeps
//! disk usage under quota and meters uploads per time window.

pub mod clips;
pub mod config;
pub mod recorder;
pub mod storage;
pub mod sync;
pub mod utils;

pub use clips::{ClipArtifact, ClipRequest, ClipSplitter, FfmpegCutter, VideoCutter};
pub use config::TelemetryConfig;
pub use recorder::{
    BufferRotator, CaptureLayout, NativeSession, SessionCompleted, SessionComponents,
    SessionListener, SessionManager, SessionPolicy, SessionState, SessionWriter, VideoRecorder,
};
pub use storage::{CounterStore, JsonFileStore, QuotaEnforcer};
pub use sync::{DispatchOutcome, UploadDispatcher, UploadRateLimiter, UploadTransport};
pub use utils::{TelemetryError, TelemetryResult};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the tracing subscriber.
///
/// Honors `RUST_LOG`, defaulting to debug output for this crate. Safe to call
/// more than once; later calls leave the first subscriber in place.
pub fn init_logging() {
    let result = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dashcam_telemetry=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    match result {
        Ok(()) => tracing::info!("Dashcam telemetry v{}", env!("CARGO_PKG_VERSION")),
        Err(e) => tracing::debug!("Logging already initialised: {}", e),
    }
}
