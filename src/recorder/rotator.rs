//! Rotating recording buffers
//!
//! A fixed ring of `video<N>.mp4` targets. Every hand-off advances the ring
//! and clears whatever the slot held from its previous lap.

use parking_lot::Mutex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Default number of buffer slots
pub const DEFAULT_BUFFER_COUNT: usize = 3;

/// Ring of reusable recording targets
#[derive(Debug)]
pub struct BufferRotator {
    dir: PathBuf,
    count: usize,
    index: Mutex<usize>,
}

impl BufferRotator {
    /// Ring of [`DEFAULT_BUFFER_COUNT`] slots under `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_count(dir, DEFAULT_BUFFER_COUNT)
    }

    /// Ring of `count` slots (at least one) under `dir`
    pub fn with_count(dir: impl Into<PathBuf>, count: usize) -> Self {
        Self {
            dir: dir.into(),
            count: count.max(1),
            index: Mutex::new(0),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.count
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of slot `index`
    pub fn slot_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("video{}.mp4", index % self.count))
    }

    /// Path of the slot handed out last
    pub fn current_slot_path(&self) -> PathBuf {
        self.slot_path(*self.index.lock())
    }

    /// Advance to the next slot and make sure nothing is left in it.
    ///
    /// A stale file that cannot be removed is logged and left in place; the
    /// recorder overwrites it and the next lap tries again.
    pub fn next_slot_path(&self) -> PathBuf {
        let mut index = self.index.lock();
        *index = (*index + 1) % self.count;
        let path = self.slot_path(*index);

        if let Err(e) = fs::create_dir_all(&self.dir) {
            tracing::warn!("Can not create buffers dir {:?}: {}", self.dir, e);
        }

        match fs::remove_file(&path) {
            Ok(()) => tracing::debug!("Cleared stale buffer {:?}", path),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to clear stale buffer {:?}: {}", path, e),
        }

        path
    }
}
