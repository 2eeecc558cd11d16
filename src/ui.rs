use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::phase::{Phase, PhaseObserver};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

/// Terminal progress for a signal cycle: one bar per phase on a TTY, plain
/// stage lines otherwise.
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    current: Option<PhaseProgress>,
}

struct PhaseProgress {
    phase: Phase,
    start: Instant,
    bar: Option<ProgressBar>,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self {
            mode,
            is_tty,
            current: None,
        }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty && !matches!(self.mode, UiMode::Plain)
    }

    fn close_current(&mut self) {
        let Some(progress) = self.current.take() else {
            return;
        };
        let message = format!(
            "✔ {} ({})",
            progress.phase,
            format_duration(progress.start.elapsed())
        );
        match progress.bar {
            Some(bar) => bar.finish_with_message(message),
            None => eprintln!("{message}"),
        }
    }
}

impl PhaseObserver for Ui {
    fn phase_started(&mut self, phase: Phase, budget: u64) {
        self.close_current();
        let bar = if self.use_pretty() && budget > 0 {
            let bar = ProgressBar::new(budget);
            bar.set_draw_target(ProgressDrawTarget::stderr());
            let style = ProgressStyle::with_template("{prefix:>13} [{bar:30}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar.set_prefix(phase.to_string());
            Some(bar)
        } else {
            eprintln!("==> {} ({} frames)", phase, budget);
            None
        };
        self.current = Some(PhaseProgress {
            phase,
            start: Instant::now(),
            bar,
        });
    }

    fn frame_rendered(&mut self, _phase: Phase, captions: &[String]) {
        if let Some(bar) = self.current.as_ref().and_then(|p| p.bar.as_ref()) {
            bar.set_message(captions.join(" | "));
            bar.inc(1);
        }
    }

    fn phase_finished(&mut self, phase: Phase) {
        if self.current.as_ref().is_some_and(|p| p.phase == phase) {
            self.close_current();
        }
    }
}

impl Drop for Ui {
    fn drop(&mut self) {
        self.close_current();
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
