//! Read model exposed to external callers.

use serde::{Deserialize, Serialize};

/// Aggregate view of the device state: latest sensor sample, current PWM
/// output, operating mode and auto-mode calibration bounds.
///
/// Rebuilt from the owning components on every tick and after every
/// mutating call; it is never the source of truth and never fails to read.
/// Field names match the JSON the device has always served.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceStateSnapshot {
    pub temperature: f32,
    pub presence: bool,
    pub pwm: u8,
    /// Wire encoding of the operating mode: 0=Manual, 1=Auto, 2=Program.
    pub mode: u8,
    #[serde(rename = "Tmin")]
    pub tmin: f32,
    #[serde(rename = "Tmax")]
    pub tmax: f32,
}
