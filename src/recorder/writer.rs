//! Session writer
//!
//! Owns one background worker that serializes every session transition:
//! explicit start/stop calls and, for rotating sessions, the periodic
//! stop-split-notify-start cycle. Transitions touch the recorder, the native
//! engine and the file system, so they run on the blocking pool while the
//! worker task awaits them.

use crate::clips::splitter::ClipSplitter;
use crate::clips::types::SplitError;
use crate::recorder::rotator::BufferRotator;
use crate::recorder::state::{RecordingSession, SessionCompleted, SessionPolicy, SessionState};
use crate::recorder::traits::{NativeSession, SessionListener, VideoRecorder};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// Session writer errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Recorder error: {0:#}")]
    Recorder(anyhow::Error),

    #[error("Session worker is not running")]
    WorkerGone,
}

/// Collaborators a writer drives
#[derive(Clone)]
pub struct SessionComponents {
    pub native: Arc<dyn NativeSession>,
    pub recorder: Arc<dyn VideoRecorder>,
    pub splitter: ClipSplitter,
    pub listener: Option<Arc<dyn SessionListener>>,
}

enum Command {
    Start(oneshot::Sender<Result<(), SessionError>>),
    Stop(oneshot::Sender<()>),
}

/// Handle to a session writer and its worker
pub struct SessionWriter {
    commands: mpsc::UnboundedSender<Command>,
    state: Arc<RwLock<SessionState>>,
    active: Arc<RwLock<Vec<PathBuf>>>,
    worker: JoinHandle<()>,
}

impl SessionWriter {
    /// Spawn the worker on the current tokio runtime
    ///
    /// The rotator may be shared so that a later writer continues the same
    /// ring of slots.
    pub fn spawn(
        policy: SessionPolicy,
        rotator: impl Into<Arc<BufferRotator>>,
        components: SessionComponents,
    ) -> Self {
        let state = Arc::new(RwLock::new(SessionState::Idle));
        let active = Arc::new(RwLock::new(Vec::new()));
        let (tx, rx) = mpsc::unbounded_channel();

        let period = policy.period();
        let core = SessionCore {
            policy,
            rotator: rotator.into(),
            components,
            current: None,
            next_index: 0,
            state: state.clone(),
            active: active.clone(),
        };

        let worker = tokio::spawn(run_worker(Arc::new(Mutex::new(core)), rx, period));

        Self {
            commands: tx,
            state,
            active,
            worker,
        }
    }

    /// Begin a session. No-op while already recording.
    pub async fn start(&self) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Start(reply))
            .map_err(|_| SessionError::WorkerGone)?;
        response.await.map_err(|_| SessionError::WorkerGone)?
    }

    /// End the current session and cancel any pending rotation.
    ///
    /// If a rotation is running it completes first. No-op while idle.
    pub async fn stop(&self) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Stop(reply))
            .map_err(|_| SessionError::WorkerGone)?;
        response.await.map_err(|_| SessionError::WorkerGone)
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn is_recording(&self) -> bool {
        self.state() == SessionState::Recording
    }

    /// Buffer slot and output directory of the running session
    pub fn active_paths(&self) -> Vec<PathBuf> {
        self.active.read().clone()
    }

    /// Stop recording and wait for the worker to exit
    pub async fn shutdown(self) {
        let Self {
            commands, worker, ..
        } = self;
        drop(commands);
        if let Err(e) = worker.await {
            tracing::error!("Session worker terminated abnormally: {}", e);
        }
    }
}

async fn run_worker(
    core: Arc<Mutex<SessionCore>>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    period: Option<Duration>,
) {
    let mut deadline: Option<Instant> = None;

    loop {
        let next_tick = deadline;
        let tick = async move {
            match next_tick {
                Some(at) => sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;

            command = commands.recv() => match command {
                Some(Command::Start(reply)) => {
                    let result = on_worker(&core, |core| core.start())
                        .await
                        .unwrap_or(Err(SessionError::WorkerGone));
                    if let (Ok(true), Some(period), None) = (&result, period, deadline) {
                        deadline = Some(Instant::now() + period);
                    }
                    let _ = reply.send(result.map(|_| ()));
                }
                Some(Command::Stop(reply)) => {
                    deadline = None;
                    on_worker(&core, |core| core.stop()).await;
                    let _ = reply.send(());
                }
                None => {
                    on_worker(&core, |core| core.stop()).await;
                    tracing::debug!("Session worker exiting");
                    break;
                }
            },

            _ = tick => {
                on_worker(&core, |core| core.rotate()).await;
                deadline = period.map(|period| Instant::now() + period);
            }
        }
    }
}

/// Run a transition on the blocking pool
async fn on_worker<T, F>(core: &Arc<Mutex<SessionCore>>, f: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce(&mut SessionCore) -> T + Send + 'static,
{
    let core = Arc::clone(core);
    match tokio::task::spawn_blocking(move || f(&mut *core.lock())).await {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!("Session transition panicked: {}", e);
            None
        }
    }
}

/// Worker-owned session state
struct SessionCore {
    policy: SessionPolicy,
    rotator: Arc<BufferRotator>,
    components: SessionComponents,
    current: Option<RecordingSession>,
    next_index: u64,
    state: Arc<RwLock<SessionState>>,
    active: Arc<RwLock<Vec<PathBuf>>>,
}

impl SessionCore {
    /// Returns whether a new session was started
    fn start(&mut self) -> Result<bool, SessionError> {
        if self.current.is_some() {
            tracing::debug!("Session already recording, ignoring start");
            return Ok(false);
        }
        self.begin()?;
        Ok(true)
    }

    fn stop(&mut self) {
        if self.current.is_none() {
            tracing::debug!("No session recording, ignoring stop");
            return;
        }
        self.finish();
    }

    /// Scheduled stop-then-start cycle
    fn rotate(&mut self) {
        if self.current.is_some() {
            self.finish();
        }
        if let Err(e) = self.begin() {
            tracing::error!("Failed to start next session, retrying on next tick: {}", e);
        }
    }

    fn begin(&mut self) -> Result<(), SessionError> {
        let native = self.components.native.clone();

        let (output_dir, target_slot) = match &self.policy {
            SessionPolicy::Bounded { output_dir } => {
                (output_dir.clone(), self.rotator.next_slot_path())
            }
            SessionPolicy::Rotating { root_dir, .. } => {
                (fresh_session_dir(root_dir), self.rotator.next_slot_path())
            }
        };

        // protected from eviction before anything is written into them
        *self.active.write() = vec![target_slot.clone(), output_dir.clone()];
        if let Err(e) = self.open_outputs(&output_dir, &target_slot) {
            self.active.write().clear();
            return Err(e);
        }

        let session = RecordingSession {
            index: self.next_index,
            start_wall_clock: Utc::now(),
            start_device_clock_secs: native.current_clock_seconds(),
            target_slot,
            output_dir,
        };
        self.next_index += 1;

        tracing::info!(
            "Session {} recording into {:?} (output {:?})",
            session.index,
            session.target_slot,
            session.output_dir
        );

        self.current = Some(session);
        *self.state.write() = SessionState::Recording;
        Ok(())
    }

    /// Create the output directory and start the native session and recorder
    fn open_outputs(&self, output_dir: &Path, slot: &Path) -> Result<(), SessionError> {
        let native = &self.components.native;
        let recorder = &self.components.recorder;
        fs::create_dir_all(output_dir)?;

        match self.policy {
            SessionPolicy::Bounded { .. } => {
                native.start_session(output_dir);
                if let Err(e) = recorder.start_recording(slot) {
                    native.stop_session();
                    return Err(SessionError::Recorder(e));
                }
            }
            SessionPolicy::Rotating { .. } => {
                recorder
                    .start_recording(slot)
                    .map_err(SessionError::Recorder)?;
                native.start_session(output_dir);
            }
        }
        Ok(())
    }

    fn finish(&mut self) {
        let Some(session) = self.current.take() else {
            return;
        };
        let native = self.components.native.clone();

        if let Err(e) = self.components.recorder.stop_recording() {
            tracing::warn!("Recorder failed to stop cleanly: {:#}", e);
        }
        native.stop_session();

        if let SessionPolicy::Rotating { .. } = self.policy {
            let ranges = native.pending_clip_boundaries();
            native.reset_clip_boundaries();

            let origin = session.origin();
            let (clips, manifest_path) = match self.components.splitter.split(
                &session.target_slot,
                &ranges,
                &session.output_dir,
                &origin,
            ) {
                Ok(report) => (report.clips, Some(report.manifest_path)),
                Err(e @ SplitError::Manifest { .. }) => (e.into_clips(), None),
            };

            let event = SessionCompleted {
                clips,
                raw_recording_path: session.target_slot.clone(),
                output_dir: session.output_dir.clone(),
                manifest_path,
                session_start_wall_clock: session.start_wall_clock,
                session_start_device_clock_secs: session.start_device_clock_secs,
            };

            if let Some(listener) = &self.components.listener {
                listener.on_session_complete(event);
            }
        }

        self.active.write().clear();
        *self.state.write() = SessionState::Idle;
        tracing::info!("Session {} stopped", session.index);
    }
}

/// `<root>/<unix-millis>`, bumped until it names a directory not yet on disk
fn fresh_session_dir(root: &Path) -> PathBuf {
    let mut millis = Utc::now().timestamp_millis();
    loop {
        let dir = root.join(millis.to_string());
        if !dir.exists() {
            return dir;
        }
        millis += 1;
    }
}
