//! Frame container and the last-frame snapshot used by replay phases.
//!
//! - `Frame`: owned RGB24 pixel buffer with dimensions and a capture index.
//! - `LastFrame`: immutable copy of the most recent analysis frame. Replay
//!   phases render onto clones of it; the snapshot itself is never mutated
//!   after capture.

use anyhow::{anyhow, Result};

/// Bytes per pixel for the RGB24 layout every source produces.
pub const BYTES_PER_PIXEL: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// Decoded video frame.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// 1-based position in the source stream.
    pub index: u64,
}

impl Frame {
    /// Create a frame from RGB24 pixels. Fails if the buffer length does not
    /// match the dimensions.
    pub fn new(data: Vec<u8>, width: u32, height: u32, index: u64) -> Result<Self> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(anyhow!(
                "frame buffer holds {} bytes, expected {} for {}x{} rgb24",
                data.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            index,
        })
    }

    /// Solid frame, mostly useful for synthetic sources and tests.
    pub fn filled(width: u32, height: u32, index: u64, colour: Rgb) -> Self {
        let pixel_count = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixel_count * BYTES_PER_PIXEL);
        for _ in 0..pixel_count {
            data.extend_from_slice(&[colour.0, colour.1, colour.2]);
        }
        Self {
            data,
            width,
            height,
            index,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        Some(Rgb(
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ))
    }

    fn put_pixel(&mut self, x: i64, y: i64, colour: Rgb) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        self.data[offset] = colour.0;
        self.data[offset + 1] = colour.1;
        self.data[offset + 2] = colour.2;
    }

    /// Draw an unfilled rectangle. Coordinates are clipped to the frame.
    pub fn stroke_rect(&mut self, x1: i32, y1: i32, x2: i32, y2: i32, colour: Rgb, thickness: u32) {
        let (x1, x2) = (x1.min(x2) as i64, x1.max(x2) as i64);
        let (y1, y2) = (y1.min(y2) as i64, y1.max(y2) as i64);
        let (width, height) = (self.width as i64, self.height as i64);
        if width == 0 || height == 0 {
            return;
        }
        // Only the on-frame span of each edge is walked.
        let (span_x1, span_x2) = (x1.max(0), x2.min(width - 1));
        let (span_y1, span_y2) = (y1.max(0), y2.min(height - 1));
        let thickness = (thickness as i64).min(width.max(height));
        for t in 0..thickness {
            for x in span_x1..=span_x2 {
                self.put_pixel(x, y1 + t, colour);
                self.put_pixel(x, y2 - t, colour);
            }
            for y in span_y1..=span_y2 {
                self.put_pixel(x1 + t, y, colour);
                self.put_pixel(x2 - t, y, colour);
            }
        }
    }
}

/// Owned copy of the last frame captured during red analysis.
#[derive(Debug, Default)]
pub struct LastFrame {
    snapshot: Option<Frame>,
}

impl LastFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a copy of `frame`, replacing any earlier snapshot.
    pub fn capture(&mut self, frame: &Frame) {
        self.snapshot = Some(frame.clone());
    }

    pub fn get(&self) -> Option<&Frame> {
        self.snapshot.as_ref()
    }

    pub fn is_captured(&self) -> bool {
        self.snapshot.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer() {
        assert!(Frame::new(vec![0u8; 10], 2, 2, 1).is_err());
        assert!(Frame::new(vec![0u8; 12], 2, 2, 1).is_ok());
    }

    #[test]
    fn stroke_rect_clips_to_frame() {
        let mut frame = Frame::filled(8, 8, 1, Rgb(0, 0, 0));
        frame.stroke_rect(-4, 2, 20, 5, Rgb(255, 0, 0), 1);
        assert_eq!(frame.pixel(0, 2), Some(Rgb(255, 0, 0)));
        assert_eq!(frame.pixel(7, 5), Some(Rgb(255, 0, 0)));
        assert_eq!(frame.pixel(3, 3), Some(Rgb(0, 0, 0)));
    }

    #[test]
    fn stroke_rect_with_huge_bounds_stays_off_frame() {
        let mut frame = Frame::filled(8, 8, 1, Rgb(0, 0, 0));
        frame.stroke_rect(
            -2_000_000_000,
            -2_000_000_000,
            2_000_000_000,
            2_000_000_000,
            Rgb(255, 0, 0),
            u32::MAX,
        );
        assert_eq!(frame.pixel(0, 0), Some(Rgb(0, 0, 0)));
        assert_eq!(frame.pixel(7, 7), Some(Rgb(0, 0, 0)));
    }

    #[test]
    fn snapshot_is_independent_of_later_edits() {
        let mut frame = Frame::filled(4, 4, 7, Rgb(10, 10, 10));
        let mut last = LastFrame::new();
        assert!(!last.is_captured());
        last.capture(&frame);
        frame.stroke_rect(0, 0, 3, 3, Rgb(255, 255, 255), 1);

        let snapshot = last.get().unwrap();
        assert_eq!(snapshot.index, 7);
        assert_eq!(snapshot.pixel(0, 0), Some(Rgb(10, 10, 10)));
    }
}
