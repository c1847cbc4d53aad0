use rppal::gpio::{Gpio, InputPin, Level, OutputPin, Trigger};
use std::sync::Arc;
use tacho_traits::{BoxError, Command, EdgeSink, MotorDriver, Polarity, Timebase};
use tracing::{debug, trace};

use crate::error::{HwError, Result};

fn gpio_err(e: rppal::gpio::Error) -> HwError {
    HwError::Gpio(e.to_string())
}

/// Two-input H-bridge (DRV8833/L298 style) driven with software PWM.
///
/// Run: PWM on the input selected by polarity, the other held low.
/// Coast: both low. Brake: both high.
pub struct HBridgeMotor {
    in1: OutputPin,
    in2: OutputPin,
    pwm_hz: f64,
    polarity: Polarity,
    command: Command,
    duty: u8,
}

impl HBridgeMotor {
    pub fn try_new(in1_pin: u8, in2_pin: u8, pwm_hz: f64) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        let mut in1 = gpio.get(in1_pin).map_err(gpio_err)?.into_output();
        let mut in2 = gpio.get(in2_pin).map_err(gpio_err)?.into_output();
        in1.set_low();
        in2.set_low();
        debug!(in1_pin, in2_pin, pwm_hz, "h-bridge ready");
        Ok(Self {
            in1,
            in2,
            pwm_hz,
            polarity: Polarity::Normal,
            command: Command::Coast,
            duty: 0,
        })
    }

    fn apply(&mut self) -> Result<()> {
        match self.command {
            Command::Run => {
                let (pwm, idle) = match self.polarity {
                    Polarity::Normal => (&mut self.in1, &mut self.in2),
                    Polarity::Inversed => (&mut self.in2, &mut self.in1),
                };
                idle.clear_pwm().map_err(|e| HwError::Pwm(e.to_string()))?;
                idle.set_low();
                pwm.set_pwm_frequency(self.pwm_hz, f64::from(self.duty) / 100.0)
                    .map_err(|e| HwError::Pwm(e.to_string()))?;
            }
            Command::Coast | Command::Brake => {
                let brake = self.command == Command::Brake;
                for pin in [&mut self.in1, &mut self.in2] {
                    pin.clear_pwm().map_err(|e| HwError::Pwm(e.to_string()))?;
                    if brake {
                        pin.set_high();
                    } else {
                        pin.set_low();
                    }
                }
            }
        }
        trace!(command = ?self.command, duty = self.duty, "h-bridge apply");
        Ok(())
    }
}

impl MotorDriver for HBridgeMotor {
    fn set_direction(&mut self, polarity: Polarity) -> std::result::Result<(), BoxError> {
        if self.polarity != polarity {
            self.polarity = polarity;
            self.apply()?;
        }
        Ok(())
    }

    fn set_command(&mut self, command: Command) -> std::result::Result<(), BoxError> {
        if self.command != command {
            self.command = command;
            self.apply()?;
        }
        Ok(())
    }

    fn set_duty_cycle(&mut self, duty: u8) -> std::result::Result<(), BoxError> {
        if duty > 100 {
            return Err(Box::new(HwError::InvalidDuty(duty)));
        }
        if self.duty != duty {
            self.duty = duty;
            self.apply()?;
        }
        Ok(())
    }
}

/// Encoder lines wired to GPIO; edges on the interrupt line are forwarded
/// to the sink together with the direction line level.
///
/// The interrupt stays registered for as long as this value lives.
pub struct EncoderInput {
    int_pin: InputPin,
}

impl EncoderInput {
    pub fn attach(
        int_pin: u8,
        dir_pin: u8,
        sink: Arc<dyn EdgeSink + Send + Sync>,
        timebase: Timebase,
    ) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        let mut int = gpio.get(int_pin).map_err(gpio_err)?.into_input();
        let dir = gpio.get(dir_pin).map_err(gpio_err)?.into_input();
        int.set_async_interrupt(Trigger::Both, move |level: Level| {
            let ts = timebase.now_us();
            sink.on_edge(level == Level::High, dir.read() == Level::High, ts);
        })
        .map_err(gpio_err)?;
        debug!(int_pin, dir_pin, "encoder interrupt attached");
        Ok(Self { int_pin: int })
    }
}

impl Drop for EncoderInput {
    fn drop(&mut self) {
        if let Err(e) = self.int_pin.clear_async_interrupt() {
            tracing::warn!(error = %e, "failed to clear encoder interrupt");
        }
    }
}
