//! Phase state machine.
//!
//! One run walks `RED_ANALYSIS → RED_EXTENSION → GREEN → OFF` exactly once:
//!
//! - RED_ANALYSIS pulls fresh frames from the source for the analysis window,
//!   feeds every detection to the count aggregator and keeps a snapshot of
//!   the last frame. When it closes, the phase schedule is fixed.
//! - RED_EXTENSION pads the rest of the red duration by replaying the snapshot.
//!   Skipped when red is not longer than the analysis window.
//! - GREEN replays the snapshot for the green duration.
//! - OFF is terminal.
//!
//! The actuator receives RED on entry to analysis, GREEN at the red/green
//! boundary and OFF at the end. OFF is also sent when a run aborts or is
//! interrupted, so the lamps never stay lit after the controller exits.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::actuator::{Actuator, SignalCommand};
use crate::count::{ClassWeights, CountAggregator, RegionOfInterest};
use crate::detect::DetectorBackend;
use crate::driver::{elapsed_secs, frame_budget};
use crate::error::SignalError;
use crate::frame::{Frame, LastFrame};
use crate::ingest::FrameSource;
use crate::overlay::{Overlay, PhaseStatus};
use crate::sink::FrameSink;
use crate::timing::{PhaseSchedule, TimingPolicy};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Phase {
    RedAnalysis,
    RedExtension,
    Green,
    Off,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::RedAnalysis => "RED_ANALYSIS",
            Phase::RedExtension => "RED_EXTENSION",
            Phase::Green => "GREEN",
            Phase::Off => "OFF",
        };
        f.write_str(name)
    }
}

/// Progress hooks. All methods default to no-ops.
pub trait PhaseObserver {
    fn phase_started(&mut self, _phase: Phase, _budget: u64) {}

    fn frame_rendered(&mut self, _phase: Phase, _captions: &[String]) {}

    fn phase_finished(&mut self, _phase: Phase) {}
}

pub struct NoopObserver;

impl PhaseObserver for NoopObserver {}

/// Everything a run needs besides its collaborators.
#[derive(Clone, Debug)]
pub struct ControllerSettings {
    pub lane_name: String,
    pub roi: RegionOfInterest,
    pub target_classes: Vec<String>,
    pub weights: ClassWeights,
    pub confidence_threshold: f32,
    pub analysis_window_secs: u32,
    pub timing: TimingPolicy,
    /// Frame rate for every phase budget and the output sink.
    pub fps: f64,
}

impl ControllerSettings {
    pub fn validate(&self) -> Result<()> {
        self.roi.validate()?;
        self.weights.ensure_covers(self.target_classes.as_slice())?;
        self.timing.validate()?;
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(SignalError::InvalidThreshold(self.confidence_threshold).into());
        }
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(SignalError::InvalidFrameRate(self.fps).into());
        }
        if self.analysis_window_secs == 0 {
            return Err(anyhow!("analysis window must be at least 1 second"));
        }
        if self.target_classes.is_empty() {
            return Err(anyhow!("at least one target class is required"));
        }
        Ok(())
    }
}

/// Outcome of one signal cycle.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub lane_name: String,
    pub fps: f64,
    /// Phases in the order they were entered.
    pub phases: Vec<Phase>,
    /// `None` only when the run was interrupted during analysis.
    pub schedule: Option<PhaseSchedule>,
    pub totals: BTreeMap<String, u64>,
    pub total_vehicles: u64,
    pub analysis_budget: u64,
    pub frames_analysed: u64,
    pub frames_written: u64,
    /// Commands issued, whether or not an actuator was attached.
    pub commands: Vec<SignalCommand>,
    /// Source ended before the analysis window filled.
    pub short_analysis: bool,
    pub interrupted: bool,
}

/// Owns the actuator for one run and remembers whether OFF went out.
struct ActuatorGuard {
    actuator: Option<Box<dyn Actuator>>,
    issued: Vec<SignalCommand>,
    off_sent: bool,
}

impl ActuatorGuard {
    fn new(actuator: Option<Box<dyn Actuator>>) -> Self {
        Self {
            actuator,
            issued: Vec::new(),
            off_sent: false,
        }
    }

    fn command(&mut self, command: SignalCommand) -> Result<()> {
        match self.actuator.as_mut() {
            Some(actuator) => {
                actuator.send(command)?;
                log::info!("actuator {}: sent {:?}", actuator.name(), command);
            }
            None => log::info!("no actuator attached, signal {:?}", command),
        }
        if command == SignalCommand::Off {
            self.off_sent = true;
        }
        self.issued.push(command);
        Ok(())
    }

    fn ensure_off(&mut self) {
        if self.off_sent {
            return;
        }
        if let Err(e) = self.command(SignalCommand::Off) {
            log::error!("failed to switch signal off: {:#}", e);
        }
    }
}

impl Drop for ActuatorGuard {
    fn drop(&mut self) {
        self.ensure_off();
    }
}

/// Drives one signal cycle. Consumed by `run`; counts never outlive a run.
pub struct SignalController {
    settings: ControllerSettings,
    aggregator: CountAggregator,
    overlay: Overlay,
    actuator: ActuatorGuard,
    observer: Box<dyn PhaseObserver>,
    shutdown: Option<Arc<AtomicBool>>,
    last_frame: LastFrame,
    phases: Vec<Phase>,
    schedule: Option<PhaseSchedule>,
    analysis_budget: u64,
    frames_analysed: u64,
    frames_written: u64,
    short_analysis: bool,
    interrupted: bool,
}

impl SignalController {
    pub fn new(settings: ControllerSettings, actuator: Option<Box<dyn Actuator>>) -> Result<Self> {
        let actuator = ActuatorGuard::new(actuator);
        settings.validate()?;
        let aggregator = CountAggregator::new(
            settings.target_classes.as_slice(),
            settings.confidence_threshold,
        )?;
        let overlay = Overlay::new(&settings.lane_name, settings.roi);
        Ok(Self {
            settings,
            aggregator,
            overlay,
            actuator,
            observer: Box::new(NoopObserver),
            shutdown: None,
            last_frame: LastFrame::new(),
            phases: Vec::new(),
            schedule: None,
            analysis_budget: 0,
            frames_analysed: 0,
            frames_written: 0,
            short_analysis: false,
            interrupted: false,
        })
    }

    pub fn with_observer(mut self, observer: Box<dyn PhaseObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Flag checked at every frame boundary; once set the run winds down
    /// through OFF.
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Run the full cycle. The actuator is left OFF on every exit path and
    /// the sink is always finished, marked incomplete unless the cycle ran
    /// to the end.
    pub fn run(
        mut self,
        source: &mut dyn FrameSource,
        detector: &mut dyn DetectorBackend,
        sink: &mut dyn FrameSink,
    ) -> Result<RunReport> {
        let outcome = self.run_phases(source, detector, sink);

        if outcome.is_ok() && self.interrupted {
            log::warn!("shutdown requested, switching signal off");
            self.enter(Phase::Off, 0);
        }
        self.actuator.ensure_off();

        let complete = outcome.is_ok() && !self.interrupted;
        let finished = sink.finish(complete);
        outcome?;
        finished?;

        let stats = source.stats();
        log::info!(
            "run finished: {} frames read from {}, {} frames written",
            stats.frames_captured,
            stats.path,
            self.frames_written
        );

        Ok(RunReport {
            lane_name: self.settings.lane_name.clone(),
            fps: self.settings.fps,
            phases: std::mem::take(&mut self.phases),
            schedule: self.schedule,
            totals: self.aggregator.totals().clone(),
            total_vehicles: self.aggregator.total_vehicles(),
            analysis_budget: self.analysis_budget,
            frames_analysed: self.frames_analysed,
            frames_written: self.frames_written,
            commands: self.actuator.issued.clone(),
            short_analysis: self.short_analysis,
            interrupted: self.interrupted,
        })
    }

    fn run_phases(
        &mut self,
        source: &mut dyn FrameSource,
        detector: &mut dyn DetectorBackend,
        sink: &mut dyn FrameSink,
    ) -> Result<()> {
        let fps = self.settings.fps;
        let window = self.settings.analysis_window_secs;
        detector.warm_up()?;

        self.analysis_budget = frame_budget(window as f64, fps);
        self.enter(Phase::RedAnalysis, self.analysis_budget);
        self.actuator.command(SignalCommand::Red)?;
        if !self.analyse(source, detector, sink)? {
            return Ok(());
        }
        self.observer.phase_finished(Phase::RedAnalysis);

        let weighted = self.aggregator.weighted_total(&self.settings.weights)?;
        let schedule = self.settings.timing.schedule(weighted);
        self.schedule = Some(schedule);
        log::info!(
            "vehicles={} totals={:?} weighted={:.1} -> red={}s green={}s",
            self.aggregator.total_vehicles(),
            self.aggregator.totals(),
            weighted,
            schedule.red_secs,
            schedule.green_secs
        );

        let extension_budget = frame_budget(schedule.extension_secs(window) as f64, fps);
        let green_budget = frame_budget(schedule.green_secs as f64, fps);
        if (extension_budget > 0 || green_budget > 0) && !self.last_frame.is_captured() {
            return Err(SignalError::NoFrameCaptured.into());
        }

        if extension_budget > 0 {
            self.enter(Phase::RedExtension, extension_budget);
            for i in 0..extension_budget {
                if self.shutdown_requested() {
                    return Ok(());
                }
                let status = PhaseStatus {
                    phase: Phase::RedExtension,
                    elapsed_secs: window as u64 + elapsed_secs(i, fps),
                    planned_secs: Some(schedule.red_secs),
                    vehicles: self.aggregator.total_vehicles(),
                    red_secs: None,
                };
                self.replay(&status, sink)?;
            }
            self.observer.phase_finished(Phase::RedExtension);
        } else {
            log::info!(
                "red {}s fits inside the {}s analysis window, no extension",
                schedule.red_secs,
                window
            );
        }

        self.actuator.command(SignalCommand::Green)?;
        self.enter(Phase::Green, green_budget);
        for i in 0..green_budget {
            if self.shutdown_requested() {
                return Ok(());
            }
            let status = PhaseStatus {
                phase: Phase::Green,
                elapsed_secs: elapsed_secs(i, fps),
                planned_secs: Some(schedule.green_secs),
                vehicles: self.aggregator.total_vehicles(),
                red_secs: Some(schedule.red_secs),
            };
            self.replay(&status, sink)?;
        }
        self.observer.phase_finished(Phase::Green);

        self.actuator.command(SignalCommand::Off)?;
        self.enter(Phase::Off, 0);
        Ok(())
    }

    /// Red analysis loop. Returns false if the run was interrupted.
    fn analyse(
        &mut self,
        source: &mut dyn FrameSource,
        detector: &mut dyn DetectorBackend,
        sink: &mut dyn FrameSink,
    ) -> Result<bool> {
        let fps = self.settings.fps;
        for _ in 0..self.analysis_budget {
            if self.shutdown_requested() {
                return Ok(false);
            }
            let Some(mut frame) = source.next_frame()? else {
                self.short_analysis = true;
                log::warn!(
                    "source ended after {} of {} analysis frames, continuing with partial counts",
                    self.frames_analysed,
                    self.analysis_budget
                );
                break;
            };
            self.last_frame.capture(&frame);
            self.frames_analysed += 1;

            let detections = detector.track(&frame)?;
            let newly_counted = self.aggregator.observe(&detections, &self.settings.roi);
            if newly_counted > 0 {
                log::debug!(
                    "frame {}: +{} vehicles ({} total)",
                    frame.index,
                    newly_counted,
                    self.aggregator.total_vehicles()
                );
            }

            let status = PhaseStatus {
                phase: Phase::RedAnalysis,
                elapsed_secs: elapsed_secs(self.frames_analysed, fps),
                planned_secs: None,
                vehicles: self.aggregator.total_vehicles(),
                red_secs: None,
            };
            self.emit(&mut frame, &status, sink)?;
        }
        Ok(true)
    }

    fn replay(&mut self, status: &PhaseStatus, sink: &mut dyn FrameSink) -> Result<()> {
        let mut frame = self
            .last_frame
            .get()
            .ok_or(SignalError::NoFrameCaptured)?
            .clone();
        self.emit(&mut frame, status, sink)
    }

    fn emit(&mut self, frame: &mut Frame, status: &PhaseStatus, sink: &mut dyn FrameSink) -> Result<()> {
        let captions = self.overlay.render(frame, status);
        sink.write(frame)?;
        self.frames_written += 1;
        self.observer.frame_rendered(status.phase, &captions);
        Ok(())
    }

    fn enter(&mut self, phase: Phase, budget: u64) {
        debug_assert!(
            self.phases.last().map_or(true, |prev| *prev < phase),
            "phase {} entered after {:?}",
            phase,
            self.phases.last()
        );
        self.phases.push(phase);
        log::info!("{}: entering {} ({} frames)", self.settings.lane_name, phase, budget);
        self.observer.phase_started(phase, budget);
    }

    fn shutdown_requested(&mut self) -> bool {
        let requested = self
            .shutdown
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst));
        if requested {
            self.interrupted = true;
        }
        requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_are_ordered() {
        assert!(Phase::RedAnalysis < Phase::RedExtension);
        assert!(Phase::RedExtension < Phase::Green);
        assert!(Phase::Green < Phase::Off);
        assert_eq!(Phase::RedExtension.to_string(), "RED_EXTENSION");
    }
}
