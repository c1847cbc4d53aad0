use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum TachoError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
    #[error("emergency stop armed")]
    Estop,
    #[error("move did not finish within {0} ms")]
    MoveTimeout(u64),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing motor driver")]
    MissingDriver,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
