//! Maps `Box<dyn Error>` from trait boundaries to typed `BinsaiError`.
//!
//! The traits in `binsai_traits` use `Box<dyn Error + Send + Sync>`; this module
//! converts those to our typed error enum, with an optional feature-gated path
//! for `binsai_hardware::HwError` downcasting.

use crate::error::BinsaiError;

/// Map a trait-boundary error to a typed `BinsaiError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> BinsaiError {
    #[cfg(feature = "hardware-errors")]
    {
        use binsai_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::EchoTimeout => BinsaiError::SensorTimeout,
                HwError::Uart(m) => BinsaiError::ModemNoResponse(m.clone()),
                HwError::Store(m) => BinsaiError::Config(m.clone()),
                other => BinsaiError::Hardware(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        BinsaiError::Hardware(format!("timeout: {s}"))
    } else {
        BinsaiError::Hardware(s)
    }
}

/// Convenience for `BoxError` values.
pub fn map_box(e: &binsai_traits::BoxError) -> BinsaiError {
    map_hw_error(&**e)
}
