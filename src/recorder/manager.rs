//! Session manager
//!
//! Switches between continuous capture (auto-rotating sessions feeding the
//! clip pipeline) and an explicit user recording into a given directory.

use crate::recorder::rotator::BufferRotator;
use crate::recorder::state::SessionPolicy;
use crate::recorder::writer::{SessionComponents, SessionError, SessionWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Where continuous capture keeps its files
#[derive(Debug, Clone)]
pub struct CaptureLayout {
    /// Directory of the rotating buffer slots
    pub buffers_dir: PathBuf,
    /// Number of buffer slots
    pub buffer_count: usize,
    /// Root of per-session output directories
    pub cache_dir: PathBuf,
    /// Length of one auto-rotated session
    pub session_length: Duration,
}

#[derive(Default)]
struct ManagerInner {
    writer: Option<SessionWriter>,
    started: bool,
    recording: bool,
}

/// Facade over the writer currently in charge of the camera
pub struct SessionManager {
    layout: CaptureLayout,
    components: SessionComponents,
    /// Shared by every rotating writer so resumed capture continues the ring
    capture_rotator: Arc<BufferRotator>,
    inner: Mutex<ManagerInner>,
}

impl SessionManager {
    pub fn new(layout: CaptureLayout, components: SessionComponents) -> Self {
        let capture_rotator = Arc::new(BufferRotator::with_count(
            &layout.buffers_dir,
            layout.buffer_count,
        ));
        Self {
            layout,
            components,
            capture_rotator,
            inner: Mutex::new(ManagerInner::default()),
        }
    }

    /// Start continuous capture
    pub async fn start(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.started {
            tracing::debug!("Session manager already started");
            return Ok(());
        }
        inner.started = true;
        if inner.recording {
            // capture resumes when the user recording ends
            return Ok(());
        }
        self.resume_capture(&mut inner).await
    }

    /// Stop whatever is capturing
    pub async fn stop(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        inner.started = false;
        inner.recording = false;
        retire_writer(&mut inner).await
    }

    /// Pause continuous capture and record into `dir` until
    /// [`stop_recording`](Self::stop_recording)
    ///
    /// If the recording cannot start, continuous capture is restored before
    /// the error is returned.
    pub async fn start_recording(&self, dir: impl AsRef<Path>) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.recording {
            tracing::warn!("Recording already in progress, ignoring start_recording");
            return Ok(());
        }

        let dir = dir.as_ref();
        tracing::info!("Starting user recording into {:?}", dir);
        retire_writer(&mut inner).await?;

        let writer = SessionWriter::spawn(
            SessionPolicy::bounded(dir),
            BufferRotator::with_count(dir, 1),
            self.components.clone(),
        );
        if let Err(e) = writer.start().await {
            tracing::error!("User recording into {:?} failed to start: {}", dir, e);
            writer.shutdown().await;
            if inner.started {
                if let Err(resume) = self.resume_capture(&mut inner).await {
                    tracing::error!("Continuous capture could not be restored: {}", resume);
                }
            }
            return Err(e);
        }

        inner.writer = Some(writer);
        inner.recording = true;
        Ok(())
    }

    /// End the user recording and resume continuous capture if it was running
    pub async fn stop_recording(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        if !inner.recording {
            tracing::warn!("No recording in progress, ignoring stop_recording");
            return Ok(());
        }
        inner.recording = false;
        retire_writer(&mut inner).await?;

        if inner.started {
            self.resume_capture(&mut inner).await
        } else {
            Ok(())
        }
    }

    pub async fn is_recording(&self) -> bool {
        self.inner.lock().await.recording
    }

    /// Paths the current session is writing to
    pub async fn active_paths(&self) -> Vec<PathBuf> {
        self.inner
            .lock()
            .await
            .writer
            .as_ref()
            .map(SessionWriter::active_paths)
            .unwrap_or_default()
    }

    /// Start a rotating writer in place of the (already retired) current one.
    ///
    /// On failure the manager is left stopped so a later `start` retries.
    async fn resume_capture(&self, inner: &mut ManagerInner) -> Result<(), SessionError> {
        let writer = SessionWriter::spawn(
            SessionPolicy::Rotating {
                root_dir: self.layout.cache_dir.clone(),
                period: self.layout.session_length,
            },
            self.capture_rotator.clone(),
            self.components.clone(),
        );

        match writer.start().await {
            Ok(()) => {
                inner.writer = Some(writer);
                Ok(())
            }
            Err(e) => {
                writer.shutdown().await;
                inner.started = false;
                Err(e)
            }
        }
    }
}

async fn retire_writer(inner: &mut ManagerInner) -> Result<(), SessionError> {
    if let Some(previous) = inner.writer.take() {
        previous.stop().await?;
        previous.shutdown().await;
    }
    Ok(())
}
