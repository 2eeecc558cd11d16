//! Adaptive traffic signal controller.
//!
//! One lane, one signal cycle per run. During a fixed red analysis window the
//! controller pulls frames from a video source, runs a tracking detector on
//! each and counts distinct vehicles whose box centre falls inside a region of
//! interest. The weighted count picks the red duration (green mirrors it),
//! after which the last analysed frame is replayed, annotated, for the rest of
//! red and all of green. RED, GREEN and OFF commands go out to an optional
//! serial actuator.
//!
//! # Module Structure
//!
//! - `count`: ROI, class weights and the deduplicating count aggregator
//! - `timing`: weighted count → phase duration policy
//! - `phase`: the phase state machine and run report
//! - `driver`: frame budget arithmetic
//! - `detect`: detection types and detector backends
//! - `ingest`: frame sources (files, synthetic)
//! - `sink`: annotated video output
//! - `actuator`: signal hardware link
//! - `config`: file and environment configuration

pub mod actuator;
pub mod config;
pub mod count;
pub mod detect;
pub mod driver;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod phase;
pub mod sink;
pub mod timing;
pub mod ui;

pub use actuator::{Actuator, RecordingActuator, SerialActuator, SignalCommand};
pub use config::{ActuatorSettings, SignalConfig};
pub use count::{ClassWeights, CountAggregator, RegionOfInterest};
pub use detect::{
    BoundingBox, Detection, DetectorBackend, ReplayBackend, ScriptedBackend, StubBackend,
};
pub use driver::{frame_budget, resolve_frame_rate};
pub use error::SignalError;
pub use frame::{Frame, LastFrame, Rgb};
pub use ingest::{FileConfig, FileSource, FrameSource, SourceStats, SyntheticSource};
pub use overlay::{Overlay, PhaseStatus};
pub use phase::{ControllerSettings, NoopObserver, Phase, PhaseObserver, RunReport, SignalController};
pub use sink::{FrameSink, NullSink, RawVideoSink};
pub use timing::{adaptive_duration, PhaseSchedule, TimingPolicy};
