//! Output sinks for annotated frames.
//!
//! `RawVideoSink` writes packed RGB24 frames to `<stem>.rgb` and a JSON
//! manifest to `<stem>.json`. The manifest carries the frame rate the run was
//! budgeted with, so playback speed always matches the phase timing. A sink
//! dropped without `finish(true)` leaves a manifest marked incomplete.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::frame::Frame;

pub trait FrameSink {
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and close. `complete` is false when the run aborted or was
    /// interrupted.
    fn finish(&mut self, complete: bool) -> Result<()>;
}

/// Discards frames, counting them.
#[derive(Default)]
pub struct NullSink {
    frames: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl FrameSink for NullSink {
    fn write(&mut self, _frame: &Frame) -> Result<()> {
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self, _complete: bool) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    format: &'static str,
    fps: f64,
    width: u32,
    height: u32,
    frames: u64,
    complete: bool,
    video: &'a str,
}

pub struct RawVideoSink {
    video_path: PathBuf,
    manifest_path: PathBuf,
    writer: Option<BufWriter<File>>,
    fps: f64,
    width: u32,
    height: u32,
    frames: u64,
}

impl RawVideoSink {
    pub fn create(dir: &Path, stem: &str, fps: f64, width: u32, height: u32) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create output directory {}", dir.display()))?;
        let video_path = dir.join(format!("{stem}.rgb"));
        let manifest_path = dir.join(format!("{stem}.json"));
        let file = File::create(&video_path)
            .with_context(|| format!("create output video {}", video_path.display()))?;
        log::info!(
            "RawVideoSink: writing {}x{} @ {} fps to {}",
            width,
            height,
            fps,
            video_path.display()
        );
        Ok(Self {
            video_path,
            manifest_path,
            writer: Some(BufWriter::new(file)),
            fps,
            width,
            height,
            frames: 0,
        })
    }

    pub fn video_path(&self) -> &Path {
        &self.video_path
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn write_manifest(&self, complete: bool) -> Result<()> {
        let video = self
            .video_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        let manifest = Manifest {
            format: "rgb24",
            fps: self.fps,
            width: self.width,
            height: self.height,
            frames: self.frames,
            complete,
            video,
        };
        let json = serde_json::to_vec_pretty(&manifest)?;
        std::fs::write(&self.manifest_path, json)
            .with_context(|| format!("write manifest {}", self.manifest_path.display()))
    }
}

impl FrameSink for RawVideoSink {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        if frame.width != self.width || frame.height != self.height {
            return Err(anyhow!(
                "frame {} is {}x{}, sink expects {}x{}",
                frame.index,
                frame.width,
                frame.height,
                self.width,
                self.height
            ));
        }
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow!("sink already finished"))?;
        writer
            .write_all(frame.pixels())
            .with_context(|| format!("write frame to {}", self.video_path.display()))?;
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self, complete: bool) -> Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer.flush()?;
        drop(writer);
        self.write_manifest(complete)?;
        log::info!(
            "RawVideoSink: closed {} ({} frames, complete={})",
            self.video_path.display(),
            self.frames,
            complete
        );
        Ok(())
    }
}

impl Drop for RawVideoSink {
    fn drop(&mut self) {
        if self.writer.is_some() {
            if let Err(e) = self.finish(false) {
                log::error!("RawVideoSink: failed to close output: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Rgb;

    fn read_manifest(path: &Path) -> serde_json::Value {
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    #[test]
    fn writes_frames_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = RawVideoSink::create(dir.path(), "run", 12.5, 2, 2).unwrap();
        sink.write(&Frame::filled(2, 2, 1, Rgb(1, 2, 3))).unwrap();
        sink.write(&Frame::filled(2, 2, 2, Rgb(1, 2, 3))).unwrap();
        sink.finish(true).unwrap();

        assert_eq!(std::fs::read(sink.video_path()).unwrap().len(), 2 * 2 * 2 * 3);
        let manifest = read_manifest(sink.manifest_path());
        assert_eq!(manifest["fps"], 12.5);
        assert_eq!(manifest["frames"], 2);
        assert_eq!(manifest["complete"], true);
        assert_eq!(manifest["video"], "run.rgb");
    }

    #[test]
    fn rejects_mismatched_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = RawVideoSink::create(dir.path(), "run", 20.0, 4, 4).unwrap();
        assert!(sink.write(&Frame::filled(2, 2, 1, Rgb(0, 0, 0))).is_err());
    }

    #[test]
    fn dropped_sink_is_marked_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = {
            let mut sink = RawVideoSink::create(dir.path(), "aborted", 20.0, 2, 2).unwrap();
            sink.write(&Frame::filled(2, 2, 1, Rgb(0, 0, 0))).unwrap();
            sink.manifest_path().to_path_buf()
        };
        assert_eq!(read_manifest(&manifest_path)["complete"], false);
    }
}
