//! Motor output stages and encoder inputs.
//!
//! The simulator is always available; GPIO-backed parts need the `hardware`
//! feature on Linux.
pub mod error;
pub mod sim;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod hardware;

pub use sim::{Plant, PlantParams, SimulatedEncoder, SimulatedMotor};
