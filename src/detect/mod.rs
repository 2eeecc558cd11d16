mod backend;
mod backends;
mod result;

pub use backend::DetectorBackend;
pub use backends::{ReplayBackend, ScriptedBackend, StubBackend};
pub use result::{BoundingBox, Detection};
