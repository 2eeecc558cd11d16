//! Local file frame source.
//!
//! `FileSource` reads frames from a local video file (no network access).
//! Paths starting with `stub://` select a synthetic source instead; the part
//! after the scheme is only used as a label.

use anyhow::{anyhow, Result};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::{FrameSource, SourceStats};
use crate::frame::{Frame, Rgb};

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path (e.g., "/var/lib/signal/lane1.mp4") or `stub://label`.
    pub path: String,
    /// Frame rate reported by synthetic sources.
    pub synthetic_fps: f64,
    /// Number of frames a synthetic source yields before end of stream.
    pub synthetic_frames: u64,
    pub width: u32,
    pub height: u32,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            synthetic_fps: 20.0,
            synthetic_frames: 400,
            width: 1280,
            height: 720,
        }
    }
}

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }
        if config.path.starts_with("stub://") {
            Ok(Self {
                backend: FileBackend::Synthetic(SyntheticSource::new(config)),
            })
        } else {
            #[cfg(feature = "ingest-file-ffmpeg")]
            {
                Ok(Self {
                    backend: FileBackend::Ffmpeg(FfmpegFileSource::new(config)?),
                })
            }
            #[cfg(not(feature = "ingest-file-ffmpeg"))]
            {
                Err(anyhow!(
                    "file ingestion requires the ingest-file-ffmpeg feature"
                ))
            }
        }
    }
}

impl FrameSource for FileSource {
    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn fps(&self) -> f64 {
        match &self.backend {
            FileBackend::Synthetic(source) => source.fps(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.fps(),
        }
    }

    fn dimensions(&self) -> (u32, u32) {
        match &self.backend {
            FileBackend::Synthetic(source) => source.dimensions(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.dimensions(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            FileBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.stats(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests and dry runs
// ----------------------------------------------------------------------------

/// Generates a fixed number of gradient frames, then reports end of stream.
pub struct SyntheticSource {
    config: FileConfig,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(config: FileConfig) -> Self {
        Self {
            config,
            frame_count: 0,
        }
    }

    /// Shorthand used by tests: `frames` frames of `width`x`height` at `fps`.
    pub fn with_frames(frames: u64, fps: f64, width: u32, height: u32) -> Self {
        Self::new(FileConfig {
            path: "stub://synthetic".to_string(),
            synthetic_fps: fps,
            synthetic_frames: frames,
            width,
            height,
        })
    }

    fn shade(&self) -> Rgb {
        let v = (self.frame_count % 256) as u8;
        Rgb(v, v / 2, 255 - v)
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        log::info!(
            "FileSource: connected to {} (synthetic, {} frames @ {} fps)",
            self.config.path,
            self.config.synthetic_frames,
            self.config.synthetic_fps
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.frame_count >= self.config.synthetic_frames {
            return Ok(None);
        }
        self.frame_count += 1;
        Ok(Some(Frame::filled(
            self.config.width,
            self.config.height,
            self.frame_count,
            self.shade(),
        )))
    }

    fn fps(&self) -> f64 {
        self.config.synthetic_fps
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            path: self.config.path.clone(),
        }
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_remote_and_empty_paths() {
        for path in ["", "  ", "rtsp://camera/1", "http://example.com/a.mp4"] {
            let config = FileConfig {
                path: path.to_string(),
                ..FileConfig::default()
            };
            assert!(FileSource::new(config).is_err(), "accepted {:?}", path);
        }
    }

    #[test]
    fn synthetic_source_ends_after_configured_frames() {
        let mut source = FileSource::new(FileConfig {
            path: "stub://lane".to_string(),
            synthetic_frames: 3,
            width: 4,
            height: 2,
            ..FileConfig::default()
        })
        .unwrap();
        source.connect().unwrap();
        assert_eq!(source.fps(), 20.0);
        assert_eq!(source.dimensions(), (4, 2));

        let indices: Vec<u64> = std::iter::from_fn(|| source.next_frame().unwrap())
            .map(|frame| frame.index)
            .collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert!(source.next_frame().unwrap().is_none());
        assert_eq!(source.stats().frames_captured, 3);
    }
}
