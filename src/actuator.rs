//! Signal actuator link.
//!
//! The hardware controller listens on a point-to-point serial line and takes
//! one byte per command. Commands are fire-and-forget: nothing is read back.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::SignalError;

/// Time the controller board needs after the link opens before it accepts
/// commands.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SignalCommand {
    Red,
    Green,
    /// All lamps off.
    Off,
}

impl SignalCommand {
    pub fn byte(self) -> u8 {
        match self {
            SignalCommand::Red => b'R',
            SignalCommand::Green => b'G',
            SignalCommand::Off => b'O',
        }
    }
}

/// Command channel to the signal hardware.
pub trait Actuator {
    fn name(&self) -> &'static str;

    fn send(&mut self, command: SignalCommand) -> Result<()>;
}

impl<A: Actuator + ?Sized> Actuator for Box<A> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn send(&mut self, command: SignalCommand) -> Result<()> {
        (**self).send(command)
    }
}

/// Serial device opened as a plain character device. Line settings (baud
/// rate, framing) are expected to be configured on the device beforehand.
///
/// Dropping the actuator sends OFF unless OFF was the last command written.
pub struct SerialActuator {
    path: PathBuf,
    port: File,
    last_sent: Option<SignalCommand>,
}

impl SerialActuator {
    pub fn open(path: &Path, settle: Duration) -> Result<Self> {
        let port = OpenOptions::new().write(true).open(path).map_err(|e| {
            SignalError::ActuatorUnavailable(format!("{}: {}", path.display(), e))
        })?;
        log::info!(
            "SerialActuator: opened {}, settling for {:?}",
            path.display(),
            settle
        );
        if !settle.is_zero() {
            std::thread::sleep(settle);
        }
        Ok(Self {
            path: path.to_path_buf(),
            port,
            last_sent: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Actuator for SerialActuator {
    fn name(&self) -> &'static str {
        "serial"
    }

    fn send(&mut self, command: SignalCommand) -> Result<()> {
        self.port
            .write_all(&[command.byte()])
            .and_then(|_| self.port.flush())
            .with_context(|| format!("write {:?} to {}", command, self.path.display()))?;
        self.last_sent = Some(command);
        Ok(())
    }
}

impl Drop for SerialActuator {
    fn drop(&mut self) {
        if self.last_sent == Some(SignalCommand::Off) {
            return;
        }
        if let Err(e) = self.send(SignalCommand::Off) {
            log::error!("SerialActuator: failed to switch {} off: {:#}", self.path.display(), e);
        }
    }
}

/// In-memory actuator. Clones share the same command log.
#[derive(Clone, Default)]
pub struct RecordingActuator {
    log: Arc<Mutex<Vec<SignalCommand>>>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<SignalCommand> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }
}

impl Actuator for RecordingActuator {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn send(&mut self, command: SignalCommand) -> Result<()> {
        self.log
            .lock()
            .map_err(|_| anyhow::anyhow!("recording actuator lock poisoned"))?
            .push(command);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn serial_actuator_writes_one_byte_per_command() {
        let device = NamedTempFile::new().expect("temp device");
        let mut actuator = SerialActuator::open(device.path(), Duration::ZERO).unwrap();
        actuator.send(SignalCommand::Red).unwrap();
        actuator.send(SignalCommand::Green).unwrap();
        actuator.send(SignalCommand::Off).unwrap();
        assert_eq!(std::fs::read(device.path()).unwrap(), b"RGO");
    }

    #[test]
    fn dropped_serial_actuator_switches_off() {
        let device = NamedTempFile::new().expect("temp device");
        drop(SerialActuator::open(device.path(), Duration::ZERO).unwrap());
        assert_eq!(std::fs::read(device.path()).unwrap(), b"O");

        let device = NamedTempFile::new().expect("temp device");
        {
            let mut actuator = SerialActuator::open(device.path(), Duration::ZERO).unwrap();
            actuator.send(SignalCommand::Red).unwrap();
        }
        assert_eq!(std::fs::read(device.path()).unwrap(), b"RO");

        let device = NamedTempFile::new().expect("temp device");
        {
            let mut actuator = SerialActuator::open(device.path(), Duration::ZERO).unwrap();
            actuator.send(SignalCommand::Green).unwrap();
            actuator.send(SignalCommand::Off).unwrap();
        }
        assert_eq!(std::fs::read(device.path()).unwrap(), b"GO");
    }

    #[test]
    fn missing_device_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SerialActuator::open(&dir.path().join("ttyACM9"), Duration::ZERO)
            .err()
            .expect("open should fail");
        assert!(matches!(
            err.downcast_ref::<SignalError>(),
            Some(SignalError::ActuatorUnavailable(_))
        ));
    }

    #[test]
    fn recording_actuator_clones_share_log() {
        let recorder = RecordingActuator::new();
        let mut handle = recorder.clone();
        handle.send(SignalCommand::Red).unwrap();
        assert_eq!(recorder.commands(), vec![SignalCommand::Red]);
    }
}
