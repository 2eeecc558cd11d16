//! Frame sources.
//!
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Synthetic `stub://` source (testing, dry runs)
//!
//! Sources hand out frames strictly in stream order and report end of stream
//! as `Ok(None)`, never as an error.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;

use anyhow::Result;

use crate::frame::Frame;

pub use file::{FileConfig, FileSource, SyntheticSource};

/// Per-source counters.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub path: String,
}

/// Anything that yields decoded frames at a fixed rate.
pub trait FrameSource {
    /// Prepare the source. Called once before the first `next_frame`.
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Frame rate reported by the source.
    fn fps(&self) -> f64;

    fn dimensions(&self) -> (u32, u32);

    fn stats(&self) -> SourceStats;
}
