use serde::{Deserialize, Serialize};

/// Axis-aligned box in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Integer centre point, rounding toward negative infinity.
    pub fn center(&self) -> (i32, i32) {
        (midpoint(self.x1, self.x2), midpoint(self.y1, self.y2))
    }
}

/// The floor of the mean of two i32 values always fits in an i32.
fn midpoint(a: i32, b: i32) -> i32 {
    (i64::from(a) + i64::from(b)).div_euclid(2) as i32
}

/// One tracked object reported by a detector backend for a single frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Class label from the model's vocabulary (e.g. "car").
    #[serde(rename = "class")]
    pub class_label: String,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    /// Persistent track identity. `None` means the tracker did not assign one.
    #[serde(default, rename = "id")]
    pub track_id: Option<u64>,
}

impl Detection {
    pub fn new(class_label: &str, confidence: f32, bbox: BoundingBox, track_id: Option<u64>) -> Self {
        Self {
            class_label: class_label.to_string(),
            confidence,
            bbox,
            track_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_uses_floor_division() {
        assert_eq!(BoundingBox::new(0, 0, 5, 3).center(), (2, 1));
        assert_eq!(BoundingBox::new(-5, -3, 0, 0).center(), (-3, -2));
    }

    #[test]
    fn center_handles_extreme_coordinates() {
        assert_eq!(
            BoundingBox::new(2_000_000_000, 0, 2_000_000_000, 10).center(),
            (2_000_000_000, 5)
        );
        assert_eq!(
            BoundingBox::new(i32::MIN, i32::MIN, i32::MIN, i32::MAX).center(),
            (i32::MIN, -1)
        );
    }

    #[test]
    fn detection_deserializes_without_track_id() {
        let det: Detection = serde_json::from_str(
            r#"{"class": "bus", "confidence": 0.9, "box": {"x1": 1, "y1": 2, "x2": 3, "y2": 4}}"#,
        )
        .expect("parse detection");
        assert_eq!(det.class_label, "bus");
        assert_eq!(det.track_id, None);
    }
}
