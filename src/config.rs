use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::actuator::DEFAULT_SETTLE;
use crate::count::{ClassWeights, RegionOfInterest, DEFAULT_CONFIDENCE_THRESHOLD};
use crate::phase::ControllerSettings;
use crate::timing::{TimingPolicy, DEFAULT_BASE_SECS, DEFAULT_MAX_SECS, DEFAULT_MIN_SECS};

const DEFAULT_LANE_NAME: &str = "Lane 1";
const DEFAULT_ROI: (i32, i32, i32, i32) = (480, 200, 960, 540);
const DEFAULT_TARGET_CLASSES: [&str; 5] = ["car", "two_wheeler", "auto", "truck", "bus"];
const DEFAULT_CLASS_WEIGHTS: [(&str, f64); 5] = [
    ("car", 1.0),
    ("two_wheeler", 0.5),
    ("auto", 1.0),
    ("truck", 2.0),
    ("bus", 2.0),
];
const DEFAULT_ANALYSIS_SECS: u32 = 20;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SignalConfigFile {
    lane_name: Option<String>,
    roi: Option<RoiConfigFile>,
    counting: Option<CountingConfigFile>,
    timing: Option<TimingConfigFile>,
    video: Option<VideoConfigFile>,
    actuator: Option<ActuatorConfigFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RoiConfigFile {
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CountingConfigFile {
    target_classes: Option<Vec<String>>,
    class_weights: Option<BTreeMap<String, f64>>,
    confidence_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TimingConfigFile {
    analysis_window_secs: Option<u32>,
    base_secs: Option<u32>,
    min_secs: Option<u32>,
    max_secs: Option<u32>,
    extra_floor: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct VideoConfigFile {
    fps: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ActuatorConfigFile {
    serial_device: Option<PathBuf>,
    settle_ms: Option<u64>,
}

/// Controller configuration: file (optional) → environment → validation.
#[derive(Debug, Clone)]
pub struct SignalConfig {
    pub lane_name: String,
    pub roi: RegionOfInterest,
    pub target_classes: Vec<String>,
    pub class_weights: BTreeMap<String, f64>,
    pub confidence_threshold: f32,
    pub analysis_window_secs: u32,
    pub timing: TimingPolicy,
    /// Explicit frame rate; `None` uses the rate the source reports.
    pub fps: Option<f64>,
    pub actuator: ActuatorSettings,
}

#[derive(Debug, Clone)]
pub struct ActuatorSettings {
    /// Serial device for the signal controller; `None` runs display-only.
    pub serial_device: Option<PathBuf>,
    pub settle: Duration,
}

impl SignalConfig {
    /// Load from `SIGNAL_CONFIG` (if set) and `SIGNAL_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SIGNAL_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a specific file without consulting the environment.
    pub fn from_path(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SignalConfigFile) -> Self {
        let lane_name = file
            .lane_name
            .unwrap_or_else(|| DEFAULT_LANE_NAME.to_string());
        let roi = file
            .roi
            .map(|roi| RegionOfInterest {
                x1: roi.x1,
                y1: roi.y1,
                x2: roi.x2,
                y2: roi.y2,
            })
            .unwrap_or(RegionOfInterest {
                x1: DEFAULT_ROI.0,
                y1: DEFAULT_ROI.1,
                x2: DEFAULT_ROI.2,
                y2: DEFAULT_ROI.3,
            });
        let counting = file.counting.unwrap_or_default();
        let timing = file.timing.unwrap_or_default();
        let actuator = file.actuator.unwrap_or_default();
        Self {
            lane_name,
            roi,
            target_classes: counting.target_classes.unwrap_or_else(|| {
                DEFAULT_TARGET_CLASSES
                    .iter()
                    .map(|class| class.to_string())
                    .collect()
            }),
            class_weights: counting.class_weights.unwrap_or_else(|| {
                DEFAULT_CLASS_WEIGHTS
                    .iter()
                    .map(|(class, weight)| (class.to_string(), *weight))
                    .collect()
            }),
            confidence_threshold: counting
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            analysis_window_secs: timing.analysis_window_secs.unwrap_or(DEFAULT_ANALYSIS_SECS),
            timing: TimingPolicy {
                base_secs: timing.base_secs.unwrap_or(DEFAULT_BASE_SECS),
                min_secs: timing.min_secs.unwrap_or(DEFAULT_MIN_SECS),
                max_secs: timing.max_secs.unwrap_or(DEFAULT_MAX_SECS),
                extra_floor: timing.extra_floor.unwrap_or(false),
            },
            fps: file.video.and_then(|video| video.fps),
            actuator: ActuatorSettings {
                serial_device: actuator.serial_device,
                settle: actuator
                    .settle_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_SETTLE),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(name) = std::env::var("SIGNAL_LANE_NAME") {
            if !name.trim().is_empty() {
                self.lane_name = name.trim().to_string();
            }
        }
        if let Ok(roi) = std::env::var("SIGNAL_ROI") {
            self.roi = parse_roi(&roi)?;
        }
        if let Ok(classes) = std::env::var("SIGNAL_TARGET_CLASSES") {
            let parsed = split_csv(&classes);
            if !parsed.is_empty() {
                self.target_classes = parsed;
            }
        }
        if let Ok(weights) = std::env::var("SIGNAL_CLASS_WEIGHTS") {
            for (class, weight) in parse_weights(&weights)? {
                self.class_weights.insert(class, weight);
            }
        }
        if let Ok(threshold) = std::env::var("SIGNAL_CONFIDENCE") {
            self.confidence_threshold = parse_env("SIGNAL_CONFIDENCE", &threshold)?;
        }
        if let Ok(secs) = std::env::var("SIGNAL_ANALYSIS_SECS") {
            self.analysis_window_secs = parse_env("SIGNAL_ANALYSIS_SECS", &secs)?;
        }
        if let Ok(secs) = std::env::var("SIGNAL_BASE_SECS") {
            self.timing.base_secs = parse_env("SIGNAL_BASE_SECS", &secs)?;
        }
        if let Ok(secs) = std::env::var("SIGNAL_MIN_SECS") {
            self.timing.min_secs = parse_env("SIGNAL_MIN_SECS", &secs)?;
        }
        if let Ok(secs) = std::env::var("SIGNAL_MAX_SECS") {
            self.timing.max_secs = parse_env("SIGNAL_MAX_SECS", &secs)?;
        }
        if let Ok(flag) = std::env::var("SIGNAL_EXTRA_FLOOR") {
            self.timing.extra_floor = parse_bool("SIGNAL_EXTRA_FLOOR", &flag)?;
        }
        if let Ok(fps) = std::env::var("SIGNAL_FPS") {
            if !fps.trim().is_empty() {
                self.fps = Some(parse_env("SIGNAL_FPS", &fps)?);
            }
        }
        if let Ok(device) = std::env::var("SIGNAL_SERIAL_DEVICE") {
            if !device.trim().is_empty() {
                self.actuator.serial_device = Some(PathBuf::from(device.trim()));
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let mut seen = HashSet::new();
        self.target_classes.retain(|class| seen.insert(class.clone()));
        self.settings_with_fps(self.fps.unwrap_or(1.0))?.validate()?;
        Ok(())
    }

    pub fn class_weights(&self) -> Result<ClassWeights> {
        ClassWeights::new(
            self.class_weights
                .iter()
                .map(|(class, weight)| (class.clone(), *weight)),
        )
    }

    /// Controller settings for a run at `fps` frames per second.
    pub fn settings_with_fps(&self, fps: f64) -> Result<ControllerSettings> {
        Ok(ControllerSettings {
            lane_name: self.lane_name.clone(),
            roi: self.roi,
            target_classes: self.target_classes.clone(),
            weights: self.class_weights()?,
            confidence_threshold: self.confidence_threshold,
            analysis_window_secs: self.analysis_window_secs,
            timing: self.timing,
            fps,
        })
    }
}

fn read_config_file(path: &Path) -> Result<SignalConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("{} has an invalid value: {:?}", key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("{} must be a boolean (got {:?})", key, value)),
    }
}

/// `x1,y1,x2,y2`
fn parse_roi(value: &str) -> Result<RegionOfInterest> {
    let parts: Vec<i32> = value
        .split(',')
        .map(|part| part.trim().parse::<i32>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| anyhow!("SIGNAL_ROI must be four integers x1,y1,x2,y2"))?;
    let &[x1, y1, x2, y2] = parts.as_slice() else {
        return Err(anyhow!("SIGNAL_ROI must be four integers x1,y1,x2,y2"));
    };
    Ok(RegionOfInterest { x1, y1, x2, y2 })
}

/// `car=1,two_wheeler=0.5`
fn parse_weights(value: &str) -> Result<Vec<(String, f64)>> {
    split_csv(value)
        .into_iter()
        .map(|entry| {
            let (class, weight) = entry
                .split_once('=')
                .ok_or_else(|| anyhow!("SIGNAL_CLASS_WEIGHTS entries must look like class=weight"))?;
            let weight = parse_env("SIGNAL_CLASS_WEIGHTS", weight)?;
            Ok((class.trim().to_string(), weight))
        })
        .collect()
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_lane_one() {
        let mut cfg = SignalConfig::from_file(SignalConfigFile::default());
        cfg.validate().unwrap();
        assert_eq!(cfg.lane_name, "Lane 1");
        assert_eq!(cfg.roi, RegionOfInterest::new(480, 200, 960, 540).unwrap());
        assert_eq!(cfg.target_classes.len(), 5);
        assert_eq!(cfg.class_weights["two_wheeler"], 0.5);
        assert_eq!(cfg.confidence_threshold, 0.6);
        assert_eq!(cfg.analysis_window_secs, 20);
        assert_eq!(cfg.timing, TimingPolicy::default());
        assert_eq!(cfg.fps, None);
        assert_eq!(cfg.actuator.serial_device, None);
        assert_eq!(cfg.actuator.settle, DEFAULT_SETTLE);
    }

    #[test]
    fn parses_roi_and_weights() {
        assert_eq!(
            parse_roi(" 1, 2 ,30,40").unwrap(),
            RegionOfInterest { x1: 1, y1: 2, x2: 30, y2: 40 }
        );
        assert!(parse_roi("1,2,3").is_err());
        assert!(parse_roi("a,b,c,d").is_err());
        assert_eq!(
            parse_weights("car=1, bus = 2.5").unwrap(),
            vec![("car".to_string(), 1.0), ("bus".to_string(), 2.5)]
        );
        assert!(parse_weights("car").is_err());
    }

    #[test]
    fn parses_bool_flags() {
        assert!(parse_bool("K", "Yes").unwrap());
        assert!(!parse_bool("K", "0").unwrap());
        assert!(parse_bool("K", "maybe").is_err());
    }
}
