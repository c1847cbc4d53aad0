pub mod clock;

pub use clock::{Clock, MonotonicClock, Timebase};

/// Boxed error type used at every hardware trait boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Physical rotation sense requested from the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Polarity {
    #[default]
    Normal,
    Inversed,
}

impl Polarity {
    #[inline]
    #[must_use]
    pub const fn inverted(self) -> Self {
        match self {
            Self::Normal => Self::Inversed,
            Self::Inversed => Self::Normal,
        }
    }

    #[inline]
    pub const fn is_inversed(self) -> bool {
        matches!(self, Self::Inversed)
    }
}

/// Bridge command issued alongside the duty cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Run,
    Coast,
    Brake,
}

/// The three operations the control core needs from a motor output stage.
pub trait MotorDriver {
    fn set_direction(&mut self, polarity: Polarity) -> Result<(), BoxError>;
    fn set_command(&mut self, command: Command) -> Result<(), BoxError>;
    /// `duty` is a magnitude in 0..=100.
    fn set_duty_cycle(&mut self, duty: u8) -> Result<(), BoxError>;
}

impl<T: MotorDriver + ?Sized> MotorDriver for Box<T> {
    fn set_direction(&mut self, polarity: Polarity) -> Result<(), BoxError> {
        (**self).set_direction(polarity)
    }
    fn set_command(&mut self, command: Command) -> Result<(), BoxError> {
        (**self).set_command(command)
    }
    fn set_duty_cycle(&mut self, duty: u8) -> Result<(), BoxError> {
        (**self).set_duty_cycle(duty)
    }
}

/// Receiver of raw encoder edges.
///
/// Implementations run in interrupt-like context: no blocking, no allocation.
pub trait EdgeSink {
    fn on_edge(&self, int_level: bool, dir_level: bool, timestamp_us: u64);
}

impl<T: EdgeSink + ?Sized> EdgeSink for std::sync::Arc<T> {
    fn on_edge(&self, int_level: bool, dir_level: bool, timestamp_us: u64) {
        (**self).on_edge(int_level, dir_level, timestamp_us);
    }
}
