//! Maps a signed power percentage onto driver commands.

use tacho_traits::{BoxError, Command, MotorDriver, Polarity};

use crate::hw_error::map_hw_error;
use crate::types::StopMode;

/// Smallest open-loop power that still turns the motor.
pub const MIN_OPEN_LOOP_POWER: i32 = 10;

/// One warn per failing driver operation; repeats go to `trace!` until the
/// operation succeeds again.
#[derive(Debug, Default, Clone, Copy)]
struct FaultLatch {
    direction: bool,
    command: bool,
    duty: bool,
}

pub struct OutputMapper<D: MotorDriver> {
    driver: D,
    polarity: Polarity,
    /// Last power asked for, clamped to ±100; `None` until the first apply.
    requested: Option<i32>,
    /// Power the driver is actually running at (after the open-loop minimum).
    applied: i32,
    faults: FaultLatch,
}

impl<D: MotorDriver> OutputMapper<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            polarity: Polarity::Normal,
            requested: None,
            applied: 0,
            faults: FaultLatch::default(),
        }
    }

    #[inline]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    #[inline]
    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    pub fn set_polarity(&mut self, polarity: Polarity) {
        self.polarity = polarity;
    }

    /// Power the driver was last set to, 0 before the first apply.
    #[inline]
    pub fn power(&self) -> i32 {
        self.applied
    }

    /// Apply `power`; repeated identical requests are not re-sent.
    pub fn apply(&mut self, power: i32, stop_mode: StopMode, regulated: bool) -> i32 {
        if self.requested == Some(power.clamp(-100, 100)) {
            return self.applied;
        }
        self.write(power, stop_mode, regulated)
    }

    /// Send the last request again (after a polarity change).
    pub fn reissue(&mut self, stop_mode: StopMode, regulated: bool) -> i32 {
        let power = self.requested.unwrap_or(0);
        self.write(power, stop_mode, regulated)
    }

    /// Issue a bare stop command without changing the remembered power.
    pub fn command(&mut self, command: Command) {
        let res = self.driver.set_command(command);
        report(&mut self.faults.command, "set_command", res);
    }

    fn write(&mut self, power: i32, stop_mode: StopMode, regulated: bool) -> i32 {
        let requested = power.clamp(-100, 100);
        self.requested = Some(requested);
        let mut power = requested;

        if power > 0 {
            self.direction(self.polarity);
            self.command(Command::Run);
            if !regulated && power < MIN_OPEN_LOOP_POWER {
                power = MIN_OPEN_LOOP_POWER;
            }
        } else if power < 0 {
            self.direction(self.polarity.inverted());
            self.command(Command::Run);
            if !regulated && power > -MIN_OPEN_LOOP_POWER {
                power = -MIN_OPEN_LOOP_POWER;
            }
        } else {
            match stop_mode {
                StopMode::Coast => self.command(Command::Coast),
                StopMode::Brake => self.command(Command::Brake),
                StopMode::Hold => {}
            }
        }
        self.applied = power;

        let duty = power.unsigned_abs().min(100) as u8;
        let res = self.driver.set_duty_cycle(duty);
        report(&mut self.faults.duty, "set_duty_cycle", res);
        power
    }

    fn direction(&mut self, polarity: Polarity) {
        let res = self.driver.set_direction(polarity);
        report(&mut self.faults.direction, "set_direction", res);
    }

    /// Forget the last request so the next apply always writes.
    pub fn invalidate(&mut self) {
        self.requested = None;
    }
}

fn report(latched: &mut bool, op: &'static str, res: Result<(), BoxError>) {
    match res {
        Ok(()) => *latched = false,
        Err(e) => {
            let err = map_hw_error(&*e);
            if *latched {
                tracing::trace!(error = %err, op, "driver call failed again");
            } else {
                *latched = true;
                tracing::warn!(error = %err, op, "driver call failed");
            }
        }
    }
}

impl<D: MotorDriver> core::fmt::Debug for OutputMapper<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OutputMapper")
            .field("polarity", &self.polarity)
            .field("requested", &self.requested)
            .field("applied", &self.applied)
            .finish_non_exhaustive()
    }
}
