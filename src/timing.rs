//! Adaptive phase timing.
//!
//! A single weighted vehicle count is mapped to a phase duration in whole
//! seconds. Heavy traffic (weighted >= 40) lengthens the phase in 10s steps,
//! a mid tier (30..40) gets a flat value, light traffic shortens it in 10s
//! steps. Results are bounded to `[min, max]`.

use anyhow::Result;
use serde::Serialize;

use crate::error::SignalError;

pub const DEFAULT_BASE_SECS: u32 = 60;
pub const DEFAULT_MIN_SECS: u32 = 20;
pub const DEFAULT_MAX_SECS: u32 = 120;
/// Floor applied to both phases when `extra_floor` is enabled.
pub const EXTRA_FLOOR_SECS: u32 = 20;

const HEAVY_THRESHOLD: f64 = 40.0;
const MID_THRESHOLD: f64 = 30.0;
const STEP_UNITS: f64 = 10.0;
const STEP_SECS: i64 = 10;
const MID_TIER_REDUCTION_SECS: i64 = 20;

/// Duration policy with the default constants.
pub fn adaptive_duration(weighted_count: f64) -> u32 {
    TimingPolicy::default().duration(weighted_count)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimingPolicy {
    pub base_secs: u32,
    pub min_secs: u32,
    pub max_secs: u32,
    /// Re-floor red and green at `EXTRA_FLOOR_SECS` after the timing function.
    pub extra_floor: bool,
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self {
            base_secs: DEFAULT_BASE_SECS,
            min_secs: DEFAULT_MIN_SECS,
            max_secs: DEFAULT_MAX_SECS,
            extra_floor: false,
        }
    }
}

impl TimingPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.min_secs == 0 || self.min_secs > self.max_secs {
            return Err(SignalError::InvalidBounds {
                min: self.min_secs,
                max: self.max_secs,
            }
            .into());
        }
        Ok(())
    }

    /// Phase duration for a weighted count. NaN and negative counts are
    /// treated as zero.
    pub fn duration(&self, weighted_count: f64) -> u32 {
        let w = if weighted_count.is_nan() || weighted_count < 0.0 {
            0.0
        } else {
            weighted_count
        };
        let base = self.base_secs as i64;
        let min = self.min_secs as i64;
        let max = self.max_secs as i64;

        let secs = if w >= HEAVY_THRESHOLD {
            let steps = ((w - HEAVY_THRESHOLD) / STEP_UNITS).floor().min(i64::MAX as f64) as i64;
            base.saturating_add(steps.saturating_add(1).saturating_mul(STEP_SECS))
                .min(max)
        } else if w >= MID_THRESHOLD {
            (base - MID_TIER_REDUCTION_SECS).max(min)
        } else {
            // Capped at the mid-tier value so counts in (29, 30) cannot
            // outrank the mid tier.
            let steps = ((HEAVY_THRESHOLD - w - 1.0) / STEP_UNITS).floor() as i64;
            (base - (steps + 1) * STEP_SECS)
                .min(base - MID_TIER_REDUCTION_SECS)
                .max(min)
        };
        secs.clamp(min, max) as u32
    }

    /// Derive red and green durations from the weighted total.
    pub fn schedule(&self, weighted_total: f64) -> PhaseSchedule {
        let duration = self.duration(weighted_total);
        let (red_secs, green_secs) = if self.extra_floor {
            (
                duration.max(EXTRA_FLOOR_SECS),
                duration.max(EXTRA_FLOOR_SECS),
            )
        } else {
            (duration, duration)
        };
        PhaseSchedule {
            red_secs,
            green_secs,
            weighted_total,
        }
    }
}

/// Red/green durations, fixed once the analysis window closes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PhaseSchedule {
    pub red_secs: u32,
    pub green_secs: u32,
    pub weighted_total: f64,
}

impl PhaseSchedule {
    /// Seconds of red left after the analysis window.
    pub fn extension_secs(&self, analysis_window_secs: u32) -> u32 {
        self.red_secs.saturating_sub(analysis_window_secs)
    }
}
