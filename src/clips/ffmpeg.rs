//! FFmpeg-based video cutting
//!
//! Clips are stream-copied out of the session recording, so cutting is
//! cheap but snaps to the nearest keyframe. The real length of the written
//! clip is read back with ffprobe when available.

use crate::clips::types::{CutClip, CutError};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Cuts a time span out of a recording into a new file
pub trait VideoCutter: Send + Sync {
    fn cut(
        &self,
        source: &Path,
        dest: &Path,
        start_ms: u64,
        end_ms: u64,
    ) -> Result<CutClip, CutError>;
}

/// [`VideoCutter`] that shells out to `ffmpeg`
#[derive(Debug, Clone)]
pub struct FfmpegCutter {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for FfmpegCutter {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegCutter {
    /// Use the given ffmpeg binary; ffprobe is looked up next to it
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        let ffmpeg = ffmpeg.into();
        let ffprobe = match ffmpeg.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join("ffprobe"),
            _ => PathBuf::from("ffprobe"),
        };
        Self { ffmpeg, ffprobe }
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg
    }

    /// Read the container duration of a media file
    fn measured_duration_secs(&self, path: &Path) -> Result<f64, CutError> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "csv=p=0",
            ])
            .arg(path)
            .output()
            .map_err(|e| CutError::Ffmpeg(format!("Failed to run ffprobe: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CutError::Ffmpeg(format!("ffprobe failed: {}", stderr)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .trim()
            .parse::<f64>()
            .map_err(|_| CutError::Ffmpeg(format!("Unexpected ffprobe output: {}", stdout)))
    }
}

/// Build the ffmpeg argument list for a stream-copy cut
fn build_cut_args(source: &Path, dest: &Path, start_ms: u64, end_ms: u64) -> Vec<String> {
    let start = start_ms as f64 / 1000.0;
    let duration = end_ms.saturating_sub(start_ms) as f64 / 1000.0;

    vec![
        "-y".to_string(),
        "-ss".to_string(),
        format!("{:.3}", start),
        "-i".to_string(),
        source.to_string_lossy().to_string(),
        "-t".to_string(),
        format!("{:.3}", duration),
        "-map".to_string(),
        "0:v".to_string(),
        "-c".to_string(),
        "copy".to_string(),
        "-avoid_negative_ts".to_string(),
        "make_zero".to_string(),
        dest.to_string_lossy().to_string(),
    ]
}

impl VideoCutter for FfmpegCutter {
    fn cut(
        &self,
        source: &Path,
        dest: &Path,
        start_ms: u64,
        end_ms: u64,
    ) -> Result<CutClip, CutError> {
        if end_ms <= start_ms {
            return Err(CutError::InvalidRange { start_ms, end_ms });
        }
        if !source.exists() {
            return Err(CutError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Source recording not found: {:?}", source),
            )));
        }

        let args = build_cut_args(source, dest, start_ms, end_ms);
        tracing::debug!("Running FFmpeg cut: {:?}", args);

        let output = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| CutError::Ffmpeg(format!("Failed to start FFmpeg: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CutError::Ffmpeg(format!("FFmpeg exited with error: {}", stderr)));
        }

        let start_secs = start_ms as f64 / 1000.0;
        let end_secs = match self.measured_duration_secs(dest) {
            Ok(duration) => start_secs + duration,
            Err(e) => {
                tracing::debug!(
                    "Could not read duration of clip {:?}, using requested end: {}",
                    dest,
                    e
                );
                end_ms as f64 / 1000.0
            }
        };

        Ok(CutClip {
            start_secs,
            end_secs,
        })
    }
}

impl<T: VideoCutter + ?Sized> VideoCutter for std::sync::Arc<T> {
    fn cut(
        &self,
        source: &Path,
        dest: &Path,
        start_ms: u64,
        end_ms: u64,
    ) -> Result<CutClip, CutError> {
        (**self).cut(source, dest, start_ms, end_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cut_args_stream_copy() {
        let args = build_cut_args(
            Path::new("/buf/video1.mp4"),
            Path::new("/out/2.50_7.00.mp4"),
            2_500,
            7_000,
        );

        assert_eq!(args[0], "-y");
        assert_eq!(args[1..3], ["-ss".to_string(), "2.500".to_string()]);
        assert_eq!(args[3..5], ["-i".to_string(), "/buf/video1.mp4".to_string()]);
        assert_eq!(args[5..7], ["-t".to_string(), "4.500".to_string()]);
        assert!(args.windows(2).any(|w| w[0] == "-c" && w[1] == "copy"));
        assert_eq!(args.last().map(String::as_str), Some("/out/2.50_7.00.mp4"));
    }

    #[test]
    fn test_ffprobe_lives_next_to_ffmpeg() {
        let cutter = FfmpegCutter::new("/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(cutter.ffprobe, PathBuf::from("/opt/ffmpeg/bin/ffprobe"));

        let cutter = FfmpegCutter::default();
        assert_eq!(cutter.ffprobe, PathBuf::from("ffprobe"));
    }

    #[test]
    fn test_rejects_empty_range() {
        let cutter = FfmpegCutter::default();
        let result = cutter.cut(Path::new("/nowhere.mp4"), Path::new("/out.mp4"), 5_000, 5_000);
        assert!(matches!(result, Err(CutError::InvalidRange { .. })));
    }

    #[test]
    fn test_missing_source_is_io_error() {
        let cutter = FfmpegCutter::default();
        let result = cutter.cut(
            Path::new("/definitely/not/here.mp4"),
            Path::new("/out.mp4"),
            0,
            1_000,
        );
        assert!(matches!(result, Err(CutError::Io(_))));
    }
}
