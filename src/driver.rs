//! Frame budget arithmetic.
//!
//! Phases are measured in frame iterations rather than wall-clock time. One
//! frame rate, resolved once per run, sizes every phase and is handed to the
//! output sink.

use anyhow::Result;

use crate::error::SignalError;

/// `floor(seconds × fps)`. Non-positive or non-finite inputs give 0.
pub fn frame_budget(seconds: f64, fps: f64) -> u64 {
    if !seconds.is_finite() || !fps.is_finite() || seconds <= 0.0 || fps <= 0.0 {
        return 0;
    }
    let frames = (seconds * fps).floor();
    if frames >= u64::MAX as f64 {
        u64::MAX
    } else {
        frames as u64
    }
}

/// Whole seconds represented by `frame_offset` frames, truncated.
pub fn elapsed_secs(frame_offset: u64, fps: f64) -> u64 {
    if !fps.is_finite() || fps <= 0.0 {
        return 0;
    }
    (frame_offset as f64 / fps).floor() as u64
}

/// Pick the run's frame rate: an explicit setting wins over the rate the
/// source reports.
pub fn resolve_frame_rate(configured: Option<f64>, reported: f64) -> Result<f64> {
    let fps = configured.unwrap_or(reported);
    if !fps.is_finite() || fps <= 0.0 {
        return Err(SignalError::InvalidFrameRate(fps).into());
    }
    if let Some(configured) = configured {
        if (configured - reported).abs() > f64::EPSILON && reported > 0.0 {
            log::warn!(
                "frame rate {} overrides the source's reported {} fps",
                configured,
                reported
            );
        }
    }
    Ok(fps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_rounds_down() {
        assert_eq!(frame_budget(20.0, 30.0), 600);
        assert_eq!(frame_budget(20.0, 29.97), 599);
        assert_eq!(frame_budget(1.0, 0.5), 0);
        assert_eq!(frame_budget(0.0, 30.0), 0);
        assert_eq!(frame_budget(-5.0, 30.0), 0);
        assert_eq!(frame_budget(10.0, f64::NAN), 0);
    }

    #[test]
    fn elapsed_truncates() {
        assert_eq!(elapsed_secs(0, 25.0), 0);
        assert_eq!(elapsed_secs(24, 25.0), 0);
        assert_eq!(elapsed_secs(25, 25.0), 1);
        assert_eq!(elapsed_secs(10, 0.0), 0);
    }

    #[test]
    fn configured_rate_wins() {
        assert_eq!(resolve_frame_rate(Some(20.0), 29.97).unwrap(), 20.0);
        assert_eq!(resolve_frame_rate(None, 29.97).unwrap(), 29.97);
    }

    #[test]
    fn unusable_rate_is_rejected() {
        let err = resolve_frame_rate(None, 0.0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SignalError>(),
            Some(SignalError::InvalidFrameRate(_))
        ));
        assert!(resolve_frame_rate(Some(f64::NAN), 25.0).is_err());
    }
}
