use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detection-and-tracking backend.
///
/// Implementations own identity persistence: the same physical object should
/// keep its `track_id` across consecutive calls. The controller never
/// re-associates tracks itself.
pub trait DetectorBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Detect and track objects in one frame. Frames arrive in strict
    /// temporal order.
    fn track(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn track(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        (**self).track(frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
