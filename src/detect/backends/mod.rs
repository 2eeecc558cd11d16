pub mod replay;
pub mod stub;

pub use replay::{ReplayBackend, ScriptedBackend};
pub use stub::StubBackend;
