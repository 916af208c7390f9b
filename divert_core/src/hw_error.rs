//! Maps `Box<dyn Error>` from trait boundaries to typed `DivertError`.
//!
//! The traits in `divert_traits` use `Box<dyn Error + Send + Sync>` for
//! maximum flexibility; this module converts those to our typed error enum,
//! with an optional feature-gated path for `divert_hardware::HwError`
//! downcasting.

use crate::error::DivertError;

/// Map a trait-boundary error to a typed `DivertError`.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> DivertError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<divert_hardware::error::HwError>() {
            return match hw {
                divert_hardware::error::HwError::ConversionNotReady => {
                    DivertError::Hardware(hw.to_string())
                }
                other => DivertError::HardwareFault(other.to_string()),
            };
        }
    }

    DivertError::Hardware(e.to_string())
}
