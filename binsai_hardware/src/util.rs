use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Busy-wait until `read()` returns `level`, or `timeout` expires.
///
/// Echo edges are a few microseconds apart, so this spins instead of sleeping.
pub fn wait_for_level(
    mut read: impl FnMut() -> bool,
    level: bool,
    timeout: Duration,
) -> Result<Instant> {
    let deadline = Instant::now() + timeout;
    loop {
        if read() == level {
            return Ok(Instant::now());
        }
        if Instant::now() >= deadline {
            return Err(HwError::EchoTimeout);
        }
        std::hint::spin_loop();
    }
}

/// Width in microseconds of the next high pulse seen through `is_high`.
///
/// `timeout` bounds the whole measurement (rising edge plus pulse).
pub fn measure_high_pulse_us(mut is_high: impl FnMut() -> bool, timeout: Duration) -> Result<u32> {
    let start = Instant::now();
    let rise = wait_for_level(&mut is_high, true, timeout)?;
    let left = timeout.saturating_sub(start.elapsed());
    let fall = wait_for_level(&mut is_high, false, left)?;
    let us = fall.saturating_duration_since(rise).as_micros();
    Ok(u32::try_from(us).unwrap_or(u32::MAX))
}
