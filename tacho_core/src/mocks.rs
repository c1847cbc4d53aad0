//! Test and helper mocks for tacho_core

use std::sync::{Arc, Mutex};

use tacho_traits::{BoxError, Command, MotorDriver, Polarity};

/// One recorded driver call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverCall {
    Direction(Polarity),
    Command(Command),
    Duty(u8),
}

/// Driver that records every call. Clones share the same log, so a test can
/// keep one handle while the core owns the other.
#[derive(Debug, Clone, Default)]
pub struct RecordingDriver {
    log: Arc<Mutex<Vec<DriverCall>>>,
}

impl RecordingDriver {
    pub fn calls(&self) -> Vec<DriverCall> {
        self.log.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut v) = self.log.lock() {
            v.clear();
        }
    }

    /// Most recent duty cycle written, if any.
    pub fn last_duty(&self) -> Option<u8> {
        self.calls().iter().rev().find_map(|c| match c {
            DriverCall::Duty(d) => Some(*d),
            _ => None,
        })
    }

    /// Most recent command written, if any.
    pub fn last_command(&self) -> Option<Command> {
        self.calls().iter().rev().find_map(|c| match c {
            DriverCall::Command(cmd) => Some(*cmd),
            _ => None,
        })
    }

    fn push(&self, call: DriverCall) {
        if let Ok(mut v) = self.log.lock() {
            v.push(call);
        }
    }
}

impl MotorDriver for RecordingDriver {
    fn set_direction(&mut self, polarity: Polarity) -> Result<(), BoxError> {
        self.push(DriverCall::Direction(polarity));
        Ok(())
    }

    fn set_command(&mut self, command: Command) -> Result<(), BoxError> {
        self.push(DriverCall::Command(command));
        Ok(())
    }

    fn set_duty_cycle(&mut self, duty: u8) -> Result<(), BoxError> {
        self.push(DriverCall::Duty(duty));
        Ok(())
    }
}

/// A driver whose every operation fails; exercises the log-and-continue path.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingDriver;

impl MotorDriver for FailingDriver {
    fn set_direction(&mut self, _polarity: Polarity) -> Result<(), BoxError> {
        Err(Box::new(std::io::Error::other("gpio write failed")))
    }

    fn set_command(&mut self, _command: Command) -> Result<(), BoxError> {
        Err(Box::new(std::io::Error::other("gpio write failed")))
    }

    fn set_duty_cycle(&mut self, _duty: u8) -> Result<(), BoxError> {
        Err(Box::new(std::io::Error::other("pwm write failed")))
    }
}
