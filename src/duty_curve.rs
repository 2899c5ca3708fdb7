//! Temperature-to-duty interpolation with output hysteresis.
//!
//! Converts a temperature sample and a pair of calibration bounds into a
//! PWM duty percentage by linear interpolation. A small deadband keeps the
//! output from chattering when the temperature hovers near a threshold.

use crate::error::EngineError;

/// Minimum change, in percentage points, before a new interpolated duty
/// replaces the previous one. The endpoints 0 and 100 always apply
/// immediately: they mean "definitely off" and "definitely full".
pub const DUTY_DEADBAND: u8 = 2;

/// Interpolates a duty percentage for `temperature` between `temp0`
/// (duty 0) and `temp100` (duty 100), applying hysteresis against
/// `previous_duty`.
///
/// Returns `InvalidRange` when `temp100 <= temp0`; callers validate bounds
/// before storing them, so hitting that branch indicates a broken invariant
/// upstream rather than bad user input.
///
/// # Example
///
/// ```
/// use fanwarden::duty_curve::compute_duty;
///
/// let duty = compute_duty(25.0, 20.0, 30.0, 0).unwrap();
/// assert_eq!(duty, 50);
/// ```
pub fn compute_duty(
    temperature: f32,
    temp0: f32,
    temp100: f32,
    previous_duty: u8,
) -> Result<u8, EngineError> {
    // Also rejects NaN bounds.
    if !(temp0 < temp100) {
        return Err(EngineError::InvalidRange);
    }

    let raw = 100.0 * (temperature - temp0) / (temp100 - temp0);
    let target = raw.round().clamp(0.0, 100.0) as u8;

    if target == 0 || target == 100 {
        return Ok(target);
    }

    if target.abs_diff(previous_duty) >= DUTY_DEADBAND {
        Ok(target)
    } else {
        Ok(previous_duty)
    }
}
