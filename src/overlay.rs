//! Frame annotation: ROI outline in the phase colour plus status captions.

use crate::count::RegionOfInterest;
use crate::frame::{Frame, Rgb};
use crate::phase::Phase;

const ROI_RED_PHASE: Rgb = Rgb(0, 255, 255);
const ROI_GREEN_PHASE: Rgb = Rgb(0, 255, 0);
const ROI_THICKNESS: u32 = 2;

/// What the overlay needs to know about the current frame.
#[derive(Clone, Copy, Debug)]
pub struct PhaseStatus {
    pub phase: Phase,
    /// Seconds into the signal cycle shown for this frame.
    pub elapsed_secs: u64,
    /// Planned phase length; `None` while red analysis is still counting.
    pub planned_secs: Option<u32>,
    pub vehicles: u64,
    /// Red duration, shown during green.
    pub red_secs: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct Overlay {
    lane_name: String,
    roi: RegionOfInterest,
}

impl Overlay {
    pub fn new(lane_name: &str, roi: RegionOfInterest) -> Self {
        Self {
            lane_name: lane_name.to_string(),
            roi,
        }
    }

    /// Draw the ROI onto `frame` and return the caption lines for it.
    pub fn render(&self, frame: &mut Frame, status: &PhaseStatus) -> Vec<String> {
        let colour = match status.phase {
            Phase::Green => ROI_GREEN_PHASE,
            _ => ROI_RED_PHASE,
        };
        frame.stroke_rect(
            self.roi.x1,
            self.roi.y1,
            self.roi.x2,
            self.roi.y2,
            colour,
            ROI_THICKNESS,
        );
        self.captions(status)
    }

    pub fn captions(&self, status: &PhaseStatus) -> Vec<String> {
        let headline = match (status.phase, status.planned_secs) {
            (Phase::RedAnalysis, _) | (_, None) => {
                format!("RED Phase | Counting: {}s", status.elapsed_secs)
            }
            (Phase::Green, Some(planned)) => {
                format!("GREEN Phase | {}s/{}s", status.elapsed_secs, planned)
            }
            (_, Some(planned)) => format!("RED Phase | {}s/{}s", status.elapsed_secs, planned),
        };
        let mut lines = vec![
            format!("{} | {}", self.lane_name, headline),
            format!("Vehicles Detected: {}", status.vehicles),
        ];
        if let (Phase::Green, Some(red)) = (status.phase, status.red_secs) {
            lines.push(format!("Red Timer was: {}s", red));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlay() -> Overlay {
        Overlay::new("Lane 1", RegionOfInterest::new(2, 2, 6, 6).unwrap())
    }

    #[test]
    fn outlines_roi_in_phase_colour() {
        let mut frame = Frame::filled(10, 10, 1, Rgb(0, 0, 0));
        let status = PhaseStatus {
            phase: Phase::Green,
            elapsed_secs: 3,
            planned_secs: Some(40),
            vehicles: 5,
            red_secs: Some(40),
        };
        overlay().render(&mut frame, &status);
        assert_eq!(frame.pixel(2, 2), Some(ROI_GREEN_PHASE));
        assert_eq!(frame.pixel(4, 4), Some(Rgb(0, 0, 0)));
    }

    #[test]
    fn captions_follow_phase() {
        let analysis = PhaseStatus {
            phase: Phase::RedAnalysis,
            elapsed_secs: 7,
            planned_secs: None,
            vehicles: 3,
            red_secs: None,
        };
        assert_eq!(
            overlay().captions(&analysis),
            vec!["Lane 1 | RED Phase | Counting: 7s", "Vehicles Detected: 3"]
        );

        let extension = PhaseStatus {
            phase: Phase::RedExtension,
            elapsed_secs: 25,
            planned_secs: Some(70),
            ..analysis
        };
        assert_eq!(overlay().captions(&extension)[0], "Lane 1 | RED Phase | 25s/70s");

        let green = PhaseStatus {
            phase: Phase::Green,
            elapsed_secs: 0,
            planned_secs: Some(70),
            red_secs: Some(70),
            ..analysis
        };
        let lines = overlay().captions(&green);
        assert_eq!(lines[0], "Lane 1 | GREEN Phase | 0s/70s");
        assert_eq!(lines[2], "Red Timer was: 70s");
    }
}
