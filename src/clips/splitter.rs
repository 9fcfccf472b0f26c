//! Clip splitting
//!
//! Turns one finished session recording plus the engine's clip boundaries
//! into individual clip files and a `videos.json` manifest.

use crate::clips::ffmpeg::VideoCutter;
use crate::clips::types::{
    ClipArtifact, ClipRequest, ManifestEntry, ManifestError, SessionOrigin, SplitError,
    SplitReport,
};
use chrono::Duration as ChronoDuration;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Manifest file name inside a session output directory
pub const MANIFEST_FILE_NAME: &str = "videos.json";

/// Extension of produced clip files
pub const CLIP_EXTENSION: &str = "mp4";

/// Cuts clips out of session recordings
#[derive(Clone)]
pub struct ClipSplitter {
    cutter: Arc<dyn VideoCutter>,
}

impl ClipSplitter {
    pub fn new(cutter: Arc<dyn VideoCutter>) -> Self {
        Self { cutter }
    }

    /// Cut every in-session range of `ranges` out of `recording` into
    /// `dest_dir` and write the manifest.
    ///
    /// Ranges that start or end before the recording started belong to an
    /// earlier session and are skipped, as are empty ranges. A failed cut
    /// only loses that clip.
    pub fn split(
        &self,
        recording: &Path,
        ranges: &[ClipRequest],
        dest_dir: &Path,
        origin: &SessionOrigin,
    ) -> Result<SplitReport, SplitError> {
        if let Err(e) = fs::create_dir_all(dest_dir) {
            tracing::warn!("Cannot create clip directory {:?}: {}", dest_dir, e);
        }

        let mut clips = Vec::with_capacity(ranges.len());

        for range in ranges {
            let relative_start = range.start_secs - origin.device_clock_secs;
            let relative_end = range.end_secs - origin.device_clock_secs;

            if relative_start < 0.0 || relative_end < 0.0 {
                tracing::debug!(
                    "Clip bounds do not belong to current recording, ignoring: {:.2} - {:.2}",
                    relative_start,
                    relative_end
                );
                continue;
            }
            if relative_end <= relative_start {
                tracing::debug!(
                    "Empty clip range, ignoring: {:.2} - {:.2}",
                    relative_start,
                    relative_end
                );
                continue;
            }

            let dest = dest_dir.join(clip_file_name(relative_start, relative_end));
            let start_ms = (relative_start * 1000.0).round() as u64;
            let end_ms = (relative_end * 1000.0).round() as u64;

            let cut = match self.cutter.cut(recording, &dest, start_ms, end_ms) {
                Ok(cut) => cut,
                Err(e) => {
                    tracing::warn!("Failed to cut clip {:?}: {}", dest, e);
                    continue;
                }
            };

            let size_bytes = fs::metadata(&dest).map(|m| m.len()).unwrap_or(0);

            clips.push(ClipArtifact {
                wall_start: origin.wall_clock + secs_to_chrono(cut.start_secs),
                wall_end: origin.wall_clock + secs_to_chrono(cut.end_secs),
                path: dest,
                start_secs: cut.start_secs,
                end_secs: cut.end_secs,
                size_bytes,
            });
        }

        tracing::info!(
            "Split {:?} into {} of {} requested clips",
            recording,
            clips.len(),
            ranges.len()
        );

        match write_manifest(dest_dir, &clips, origin.device_clock_secs) {
            Ok(manifest_path) => Ok(SplitReport {
                manifest_path,
                clips,
            }),
            Err(source) => {
                tracing::warn!("Can not create manifest in {:?}: {}", dest_dir, source);
                Err(SplitError::Manifest { clips, source })
            }
        }
    }
}

/// `<start>_<end>.mp4` with both offsets in seconds, two decimals
pub fn clip_file_name(relative_start_secs: f64, relative_end_secs: f64) -> String {
    format!(
        "{:.2}_{:.2}.{}",
        relative_start_secs, relative_end_secs, CLIP_EXTENSION
    )
}

/// Build manifest entries in absolute device-clock seconds
pub fn manifest_entries(
    clips: &[ClipArtifact],
    device_clock_offset_secs: f64,
) -> Vec<ManifestEntry> {
    clips
        .iter()
        .map(|clip| ManifestEntry {
            name: clip
                .path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            start: round2(device_clock_offset_secs + clip.start_secs),
            end: round2(device_clock_offset_secs + clip.end_secs),
        })
        .collect()
}

/// Write (or rewrite) `videos.json` for already-cut clips
pub fn write_manifest(
    dest_dir: &Path,
    clips: &[ClipArtifact],
    device_clock_offset_secs: f64,
) -> Result<PathBuf, ManifestError> {
    let entries = manifest_entries(clips, device_clock_offset_secs);
    let content = serde_json::to_string(&entries)?;

    let path = dest_dir.join(MANIFEST_FILE_NAME);
    fs::write(&path, content)?;

    tracing::debug!("Wrote manifest {:?} ({} clips)", path, entries.len());
    Ok(path)
}

/// Read a manifest back
pub fn read_manifest(dest_dir: &Path) -> Result<Vec<ManifestEntry>, ManifestError> {
    let content = fs::read_to_string(dest_dir.join(MANIFEST_FILE_NAME))?;
    Ok(serde_json::from_str(&content)?)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn secs_to_chrono(secs: f64) -> ChronoDuration {
    ChronoDuration::milliseconds((secs * 1000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clips::types::{CutClip, CutError};
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;
    use tempfile::tempdir;

    /// Writes a placeholder file and reports the requested bounds
    #[derive(Default)]
    struct FakeCutter {
        calls: Mutex<Vec<(u64, u64)>>,
        fail_at_ms: Option<u64>,
    }

    impl VideoCutter for FakeCutter {
        fn cut(
            &self,
            _source: &Path,
            dest: &Path,
            start_ms: u64,
            end_ms: u64,
        ) -> Result<CutClip, CutError> {
            self.calls.lock().push((start_ms, end_ms));
            if self.fail_at_ms == Some(start_ms) {
                return Err(CutError::Ffmpeg("malformed source".to_string()));
            }
            fs::write(dest, vec![1u8; 64])?;
            Ok(CutClip {
                start_secs: start_ms as f64 / 1000.0,
                end_secs: end_ms as f64 / 1000.0,
            })
        }
    }

    fn origin() -> SessionOrigin {
        SessionOrigin {
            device_clock_secs: 100.0,
            wall_clock: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_clip_file_name() {
        assert_eq!(clip_file_name(0.0, 5.5), "0.00_5.50.mp4");
        assert_eq!(clip_file_name(12.345, 20.0), "12.35_20.00.mp4");
    }

    #[test]
    fn test_split_writes_clips_and_manifest() {
        let dir = tempdir().unwrap();
        let cutter = Arc::new(FakeCutter::default());
        let splitter = ClipSplitter::new(cutter.clone());

        let ranges = [ClipRequest::new(110.0, 115.5), ClipRequest::new(102.25, 104.0)];
        let report = splitter
            .split(&dir.path().join("video0.mp4"), &ranges, dir.path(), &origin())
            .unwrap();

        assert_eq!(report.clips.len(), 2);
        assert_eq!(report.clips[0].path, dir.path().join("10.00_15.50.mp4"));
        assert_eq!(report.clips[0].size_bytes, 64);
        assert_eq!(
            report.clips[0].wall_start,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 10).unwrap()
        );
        assert_eq!(*cutter.calls.lock(), vec![(10_000, 15_500), (2_250, 4_000)]);

        assert_eq!(report.manifest_path, dir.path().join(MANIFEST_FILE_NAME));
        let entries = read_manifest(dir.path()).unwrap();
        assert_eq!(
            entries,
            vec![
                ManifestEntry {
                    name: "10.00_15.50.mp4".to_string(),
                    start: 110.0,
                    end: 115.5,
                },
                ManifestEntry {
                    name: "2.25_4.00.mp4".to_string(),
                    start: 102.25,
                    end: 104.0,
                },
            ]
        );
    }

    #[test]
    fn test_range_before_session_is_discarded() {
        let dir = tempdir().unwrap();
        let cutter = Arc::new(FakeCutter::default());
        let splitter = ClipSplitter::new(cutter.clone());

        // entirely before the session, and ending exactly at its start
        let ranges = [ClipRequest::new(90.0, 95.0), ClipRequest::new(97.0, 100.0)];
        let report = splitter
            .split(&dir.path().join("video0.mp4"), &ranges, dir.path(), &origin())
            .unwrap();

        assert!(report.clips.is_empty());
        assert!(cutter.calls.lock().is_empty());
        assert!(read_manifest(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_range_straddling_session_start_is_dropped_not_clamped() {
        let dir = tempdir().unwrap();
        let cutter = Arc::new(FakeCutter::default());
        let splitter = ClipSplitter::new(cutter.clone());

        let ranges = [ClipRequest::new(99.0, 103.0), ClipRequest::new(100.0, 103.0)];
        let report = splitter
            .split(&dir.path().join("video0.mp4"), &ranges, dir.path(), &origin())
            .unwrap();

        // only the range starting exactly at zero survives
        assert_eq!(report.clips.len(), 1);
        assert_eq!(report.clips[0].start_secs, 0.0);
        assert_eq!(*cutter.calls.lock(), vec![(0, 3_000)]);

        let names: Vec<String> = read_manifest(dir.path())
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["0.00_3.00.mp4".to_string()]);
    }

    #[test]
    fn test_failed_cut_skips_only_that_clip() {
        let dir = tempdir().unwrap();
        let cutter = Arc::new(FakeCutter {
            fail_at_ms: Some(1_000),
            ..Default::default()
        });
        let splitter = ClipSplitter::new(cutter);

        let ranges = [ClipRequest::new(101.0, 102.0), ClipRequest::new(105.0, 106.0)];
        let report = splitter
            .split(&dir.path().join("video0.mp4"), &ranges, dir.path(), &origin())
            .unwrap();

        assert_eq!(report.clips.len(), 1);
        assert_eq!(report.clips[0].start_secs, 5.0);
    }

    #[test]
    fn test_manifest_failure_returns_cut_clips() {
        let dir = tempdir().unwrap();
        let splitter = ClipSplitter::new(Arc::new(FakeCutter::default()));

        // a directory squatting on the manifest name makes the write fail
        fs::create_dir_all(dir.path().join(MANIFEST_FILE_NAME)).unwrap();

        let ranges = [ClipRequest::new(101.0, 102.0)];
        let err = splitter
            .split(&dir.path().join("video0.mp4"), &ranges, dir.path(), &origin())
            .unwrap_err();

        assert_eq!(err.clips().len(), 1);
        assert!(err.clips()[0].path.exists());

        // retry the manifest alone once the obstacle is gone
        fs::remove_dir_all(dir.path().join(MANIFEST_FILE_NAME)).unwrap();
        let clips = err.into_clips();
        let path = write_manifest(dir.path(), &clips, origin().device_clock_secs).unwrap();
        assert!(path.exists());
        assert_eq!(read_manifest(dir.path()).unwrap().len(), 1);
    }
}
