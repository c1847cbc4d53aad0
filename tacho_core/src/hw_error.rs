//! Maps `Box<dyn Error>` from the driver boundary to typed `TachoError`.
//!
//! `tacho_traits::MotorDriver` returns `Box<dyn Error + Send + Sync>` so any
//! output stage can plug in; this module converts those to our typed error
//! enum, with an optional feature-gated path for `tacho_hardware::HwError`.

use crate::error::TachoError;

/// Map a driver-boundary error to a typed `TachoError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> TachoError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<tacho_hardware::error::HwError>() {
            return match hw {
                tacho_hardware::error::HwError::InvalidDuty(_) => {
                    TachoError::State(hw.to_string())
                }
                other => TachoError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("gpio") {
        TachoError::HardwareFault(s)
    } else {
        TachoError::Hardware(s)
    }
}
