//! Deduplicated, class-weighted vehicle counting.
//!
//! The aggregator is fed every detection from the red analysis window and
//! keeps two collections: the set of track identities already counted and a
//! running total per target class. A track identity contributes at most one
//! unit, to one class, for the lifetime of a run. Identity stability is the
//! tracker's job; an object that loses and regains its id is counted twice.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::detect::Detection;
use crate::error::SignalError;

/// Detections below this confidence never count.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.6;

/// Counting catchment area. Bounds are inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionOfInterest {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl RegionOfInterest {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Result<Self> {
        let roi = Self { x1, y1, x2, y2 };
        roi.validate()?;
        Ok(roi)
    }

    pub fn validate(&self) -> Result<()> {
        if self.x2 <= self.x1 || self.y2 <= self.y1 {
            return Err(SignalError::InvalidRoi {
                x1: self.x1,
                y1: self.y1,
                x2: self.x2,
                y2: self.y2,
            }
            .into());
        }
        Ok(())
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.x1 <= x && x <= self.x2 && self.y1 <= y && y <= self.y2
    }
}

/// Per-class weight applied when collapsing counts into one scalar.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClassWeights {
    weights: BTreeMap<String, f64>,
}

impl ClassWeights {
    pub fn new<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut weights = BTreeMap::new();
        for (class, weight) in entries {
            let class = class.into();
            if !weight.is_finite() || weight < 0.0 {
                return Err(SignalError::InvalidWeight(class, weight).into());
            }
            weights.insert(class, weight);
        }
        Ok(Self { weights })
    }

    pub fn get(&self, class: &str) -> Option<f64> {
        self.weights.get(class).copied()
    }

    /// Fail on the first class that has no weight.
    pub fn ensure_covers<S: AsRef<str>>(&self, classes: &[S]) -> Result<()> {
        for class in classes {
            let class = class.as_ref();
            if !self.weights.contains_key(class) {
                return Err(SignalError::MissingWeight(class.to_string()).into());
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(class, weight)| (class.as_str(), *weight))
    }
}

/// Running vehicle totals for one run.
#[derive(Debug, Clone)]
pub struct CountAggregator {
    target_classes: Vec<String>,
    confidence_threshold: f32,
    counted_ids: HashSet<u64>,
    totals: BTreeMap<String, u64>,
}

impl CountAggregator {
    pub fn new<S: AsRef<str>>(target_classes: &[S], confidence_threshold: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(SignalError::InvalidThreshold(confidence_threshold).into());
        }
        let mut seen = HashSet::new();
        let target_classes: Vec<String> = target_classes
            .iter()
            .map(|class| class.as_ref().to_string())
            .filter(|class| seen.insert(class.clone()))
            .collect();
        let totals = target_classes
            .iter()
            .map(|class| (class.clone(), 0))
            .collect();
        Ok(Self {
            target_classes,
            confidence_threshold,
            counted_ids: HashSet::new(),
            totals,
        })
    }

    /// Fold one frame's detections into the totals. Returns how many track
    /// identities were counted for the first time.
    pub fn observe(&mut self, detections: &[Detection], roi: &RegionOfInterest) -> usize {
        let mut newly_counted = 0;
        for det in detections {
            if det.confidence < self.confidence_threshold {
                continue;
            }
            let Some(total) = self.totals.get_mut(&det.class_label) else {
                continue;
            };
            let (cx, cy) = det.bbox.center();
            if !roi.contains(cx, cy) {
                continue;
            }
            let Some(track_id) = det.track_id else {
                continue;
            };
            if !self.counted_ids.insert(track_id) {
                continue;
            }
            *total += 1;
            newly_counted += 1;
            log::debug!(
                "counted {} track={} center=({}, {})",
                det.class_label,
                track_id,
                cx,
                cy
            );
        }
        newly_counted
    }

    /// Drop all counted identities and zero every class total.
    pub fn reset(&mut self) {
        self.counted_ids.clear();
        for total in self.totals.values_mut() {
            *total = 0;
        }
    }

    pub fn totals(&self) -> &BTreeMap<String, u64> {
        &self.totals
    }

    pub fn count(&self, class: &str) -> u64 {
        self.totals.get(class).copied().unwrap_or(0)
    }

    pub fn total_vehicles(&self) -> u64 {
        self.totals.values().sum()
    }

    pub fn is_counted(&self, track_id: u64) -> bool {
        self.counted_ids.contains(&track_id)
    }

    pub fn counted_ids(&self) -> usize {
        self.counted_ids.len()
    }

    pub fn target_classes(&self) -> &[String] {
        &self.target_classes
    }

    /// Sum of `count × weight` over the target classes.
    pub fn weighted_total(&self, weights: &ClassWeights) -> Result<f64> {
        weights.ensure_covers(self.target_classes.as_slice())?;
        Ok(self
            .target_classes
            .iter()
            .map(|class| {
                let weight = weights.get(class).unwrap_or(0.0);
                self.count(class) as f64 * weight
            })
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    const CLASSES: [&str; 5] = ["car", "two_wheeler", "auto", "truck", "bus"];

    fn roi() -> RegionOfInterest {
        RegionOfInterest::new(480, 200, 960, 540).unwrap()
    }

    fn aggregator() -> CountAggregator {
        CountAggregator::new(&CLASSES, DEFAULT_CONFIDENCE_THRESHOLD).unwrap()
    }

    fn weights() -> ClassWeights {
        ClassWeights::new([
            ("car", 1.0),
            ("two_wheeler", 0.5),
            ("auto", 1.0),
            ("truck", 2.0),
            ("bus", 2.0),
        ])
        .unwrap()
    }

    fn inside(class: &str, id: Option<u64>) -> Detection {
        Detection::new(class, 0.9, BoundingBox::new(600, 300, 700, 400), id)
    }

    #[test]
    fn same_track_counts_once_across_frames() {
        let mut agg = aggregator();
        let frame = vec![inside("car", Some(11))];
        for _ in 0..50 {
            agg.observe(&frame, &roi());
        }
        assert_eq!(agg.count("car"), 1);
        assert_eq!(agg.total_vehicles(), 1);
        assert!(agg.is_counted(11));
    }

    #[test]
    fn identity_sticks_to_first_class() {
        let mut agg = aggregator();
        agg.observe(&[inside("car", Some(4))], &roi());
        agg.observe(&[inside("truck", Some(4))], &roi());
        assert_eq!(agg.count("car"), 1);
        assert_eq!(agg.count("truck"), 0);
    }

    #[test]
    fn filters_low_confidence_unknown_class_and_untracked() {
        let mut agg = aggregator();
        let mut low = inside("car", Some(1));
        low.confidence = 0.59;
        let counted = agg.observe(
            &[low, inside("pedestrian", Some(2)), inside("bus", None)],
            &roi(),
        );
        assert_eq!(counted, 0);
        assert_eq!(agg.total_vehicles(), 0);
        assert_eq!(agg.counted_ids(), 0);

        let mut at_threshold = inside("car", Some(1));
        at_threshold.confidence = 0.6;
        assert_eq!(agg.observe(&[at_threshold], &roi()), 1);
    }

    #[test]
    fn center_outside_roi_never_counts() {
        let mut agg = aggregator();
        // Box overlaps the ROI but its centre (470, 300) lies left of it.
        let det = Detection::new("truck", 0.99, BoundingBox::new(400, 250, 540, 350), Some(9));
        agg.observe(&[det], &roi());
        assert_eq!(agg.total_vehicles(), 0);
        assert!(!agg.is_counted(9));
    }

    #[test]
    fn roi_bounds_are_inclusive() {
        let mut agg = aggregator();
        let on_corner = Detection::new("car", 0.9, BoundingBox::new(960, 540, 960, 540), Some(1));
        let on_origin = Detection::new("bus", 0.9, BoundingBox::new(479, 199, 481, 201), Some(2));
        assert_eq!(agg.observe(&[on_corner, on_origin], &roi()), 2);
    }

    #[test]
    fn weighted_total_uses_class_weights() {
        let mut agg = aggregator();
        agg.observe(
            &[
                inside("car", Some(1)),
                inside("two_wheeler", Some(2)),
                inside("two_wheeler", Some(3)),
                inside("truck", Some(4)),
                inside("bus", Some(5)),
            ],
            &roi(),
        );
        assert_eq!(agg.weighted_total(&weights()).unwrap(), 1.0 + 0.5 + 0.5 + 2.0 + 2.0);
    }

    #[test]
    fn weighted_total_requires_every_target_weight() {
        let agg = aggregator();
        let partial = ClassWeights::new([("car", 1.0)]).unwrap();
        let err = agg.weighted_total(&partial).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SignalError>(),
            Some(SignalError::MissingWeight(class)) if class == "two_wheeler"
        ));
    }

    #[test]
    fn reset_clears_ids_and_totals() {
        let mut agg = aggregator();
        agg.observe(&[inside("car", Some(1))], &roi());
        agg.reset();
        assert_eq!(agg.total_vehicles(), 0);
        assert_eq!(agg.totals().len(), CLASSES.len());
        assert_eq!(agg.observe(&[inside("car", Some(1))], &roi()), 1);
    }

    #[test]
    fn repeated_target_classes_weigh_once() {
        let mut agg = CountAggregator::new(&["car", "car", "bus"], 0.6).unwrap();
        assert_eq!(agg.target_classes(), ["car", "bus"]);
        agg.observe(&[inside("car", Some(1))], &roi());
        assert_eq!(agg.weighted_total(&weights()).unwrap(), 1.0);
    }

    #[test]
    fn far_off_boxes_do_not_panic() {
        let mut agg = aggregator();
        let far = Detection::new(
            "car",
            0.9,
            BoundingBox::new(2_000_000_000, 0, 2_000_000_000, 10),
            Some(1),
        );
        let corner = Detection::new(
            "bus",
            0.9,
            BoundingBox::new(i32::MAX, i32::MAX, i32::MAX, i32::MAX),
            Some(2),
        );
        assert_eq!(agg.observe(&[far, corner], &roi()), 0);
        assert_eq!(agg.total_vehicles(), 0);
    }

    #[test]
    fn rejects_malformed_configuration() {
        assert!(RegionOfInterest::new(10, 10, 10, 20).is_err());
        assert!(RegionOfInterest::new(10, 30, 20, 20).is_err());
        assert!(ClassWeights::new([("car", -1.0)]).is_err());
        assert!(CountAggregator::new(&CLASSES, 1.5).is_err());
    }
}
