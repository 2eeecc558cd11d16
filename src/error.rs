use std::fmt;

/// Failures the controller distinguishes by kind.
///
/// Everything else travels as a plain `anyhow::Error`; these variants exist so
/// callers can tell configuration problems from precondition violations with
/// `downcast_ref`.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalError {
    /// A target class has no entry in the weight table.
    MissingWeight(String),
    /// A weight is negative or not finite.
    InvalidWeight(String, f64),
    /// Region of interest has non-positive width or height.
    InvalidRoi { x1: i32, y1: i32, x2: i32, y2: i32 },
    /// Frame rate is zero, negative or not finite.
    InvalidFrameRate(f64),
    /// Confidence threshold outside 0..=1.
    InvalidThreshold(f32),
    /// Duration bounds are inverted or zero.
    InvalidBounds { min: u32, max: u32 },
    /// Actuator link could not be opened at startup.
    ActuatorUnavailable(String),
    /// A replay phase needed the last analysis frame but none was captured.
    NoFrameCaptured,
}

impl fmt::Display for SignalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalError::MissingWeight(class) => {
                write!(f, "target class '{}' has no entry in the weight table", class)
            }
            SignalError::InvalidWeight(class, weight) => {
                write!(f, "weight for class '{}' must be >= 0 (got {})", class, weight)
            }
            SignalError::InvalidRoi { x1, y1, x2, y2 } => write!(
                f,
                "region of interest ({}, {}, {}, {}) must have positive width and height",
                x1, y1, x2, y2
            ),
            SignalError::InvalidFrameRate(fps) => {
                write!(f, "frame rate must be a positive number (got {})", fps)
            }
            SignalError::InvalidThreshold(threshold) => {
                write!(f, "confidence threshold must lie in 0..=1 (got {})", threshold)
            }
            SignalError::InvalidBounds { min, max } => write!(
                f,
                "duration bounds must satisfy 0 < min <= max (got min={}, max={})",
                min, max
            ),
            SignalError::ActuatorUnavailable(reason) => {
                write!(f, "actuator link unavailable: {}", reason)
            }
            SignalError::NoFrameCaptured => write!(
                f,
                "no frame was captured during red analysis; nothing to replay"
            ),
        }
    }
}

impl std::error::Error for SignalError {}

impl SignalError {
    /// True for errors that stem from static configuration.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, SignalError::NoFrameCaptured)
    }
}
