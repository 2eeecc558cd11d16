//! Backends that serve pre-computed tracker output.
//!
//! `ReplayBackend` reads JSON lines, one record per frame:
//!
//! ```text
//! {"frame": 1, "detections": [{"class": "car", "confidence": 0.91, "box": {"x1": 500, "y1": 220, "x2": 560, "y2": 280}, "id": 7}]}
//! ```
//!
//! Frames without a record yield no detections.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, VecDeque};
use std::io::BufRead;
use std::path::Path;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;

#[derive(Debug, Deserialize)]
struct FrameRecord {
    frame: u64,
    #[serde(default)]
    detections: Vec<Detection>,
}

/// Tracker output keyed by frame index.
pub struct ReplayBackend {
    records: BTreeMap<u64, Vec<Detection>>,
}

impl ReplayBackend {
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open detections file {}", path.display()))?;
        Self::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("invalid detections file {}", path.display()))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut records = BTreeMap::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: FrameRecord = serde_json::from_str(&line)
                .map_err(|e| anyhow!("line {}: {}", line_no + 1, e))?;
            records
                .entry(record.frame)
                .or_insert_with(Vec::new)
                .extend(record.detections);
        }
        log::info!("ReplayBackend: loaded tracker output for {} frames", records.len());
        Ok(Self { records })
    }

    pub fn frames(&self) -> usize {
        self.records.len()
    }
}

impl DetectorBackend for ReplayBackend {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn track(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        Ok(self.records.remove(&frame.index).unwrap_or_default())
    }
}

/// Backend that hands out a fixed script, one entry per call, in order.
/// Calls past the end of the script yield no detections.
#[derive(Default)]
pub struct ScriptedBackend {
    script: VecDeque<Vec<Detection>>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Vec<Detection>>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn track(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        Ok(self.script.pop_front().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;
    use crate::frame::Rgb;

    #[test]
    fn replay_backend_serves_records_by_frame_index() {
        let input = r#"
{"frame": 1, "detections": [{"class": "car", "confidence": 0.9, "box": {"x1": 0, "y1": 0, "x2": 10, "y2": 10}, "id": 3}]}
{"frame": 3, "detections": [{"class": "bus", "confidence": 0.7, "box": {"x1": 5, "y1": 5, "x2": 9, "y2": 9}}]}
"#;
        let mut backend = ReplayBackend::from_reader(input.as_bytes()).expect("parse replay");
        assert_eq!(backend.frames(), 2);

        let first = backend.track(&Frame::filled(2, 2, 1, Rgb(0, 0, 0))).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].track_id, Some(3));
        assert_eq!(first[0].bbox, BoundingBox::new(0, 0, 10, 10));

        let second = backend.track(&Frame::filled(2, 2, 2, Rgb(0, 0, 0))).unwrap();
        assert!(second.is_empty());

        let third = backend.track(&Frame::filled(2, 2, 3, Rgb(0, 0, 0))).unwrap();
        assert_eq!(third[0].class_label, "bus");
        assert_eq!(third[0].track_id, None);
    }

    #[test]
    fn replay_backend_reports_bad_line() {
        let err = ReplayBackend::from_reader("{\"frame\": 1}\nnot json\n".as_bytes())
            .err()
            .expect("should fail");
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn scripted_backend_runs_dry() {
        let det = Detection::new("car", 0.9, BoundingBox::new(0, 0, 2, 2), Some(1));
        let mut backend = ScriptedBackend::new(vec![vec![det.clone()]]);
        let frame = Frame::filled(2, 2, 1, Rgb(0, 0, 0));
        assert_eq!(backend.track(&frame).unwrap(), vec![det]);
        assert!(backend.track(&frame).unwrap().is_empty());
    }
}
