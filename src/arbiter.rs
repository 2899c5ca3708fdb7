//! Operating-mode arbitration and per-tick duty evaluation.
//!
//! The arbiter owns the authoritative operating mode, the manual duty, the
//! auto-mode calibration bounds and the last PWM output. Once per control
//! tick it decides what duty the fan actually receives, consulting the
//! schedule store and the duty interpolation as the mode requires.

use serde::{Deserialize, Serialize};

use crate::{
    duty_curve::compute_duty,
    error::EngineError,
    schedule::{RegisterEntry, ScheduleStore, WeekInstant},
    sensors::SensorSample,
    snapshot::DeviceStateSnapshot,
};

/// The fan's operating mode. Exactly one is active at any time; switching
/// is unconditional and takes effect at the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    /// Fixed, user-selected duty.
    Manual,
    /// Duty interpolated from the device-wide calibration bounds.
    Auto,
    /// Duty driven by the weekly schedule registers.
    Program,
}

impl OperatingMode {
    /// Wire encoding used by external callers: 0, 1, 2.
    pub const fn code(self) -> u8 {
        match self {
            Self::Manual => 0,
            Self::Auto => 1,
            Self::Program => 2,
        }
    }
}

impl TryFrom<u8> for OperatingMode {
    type Error = EngineError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Manual),
            1 => Ok(Self::Auto),
            2 => Ok(Self::Program),
            other => Err(EngineError::validation(format!("unknown mode {other}"))),
        }
    }
}

/// Device-wide calibration bounds for Auto mode, strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutoConfig {
    #[serde(rename = "Tmin")]
    pub tmin: f32,
    #[serde(rename = "Tmax")]
    pub tmax: f32,
}

impl Default for AutoConfig {
    fn default() -> Self {
        Self {
            tmin: 24.0,
            tmax: 30.0,
        }
    }
}

/// Top-level control state machine.
///
/// All mutations validate synchronously and leave the state untouched on
/// rejection. The PWM output itself only changes inside [`ModeArbiter::tick`],
/// so a mutation arriving between ticks is applied atomically and becomes
/// visible at the next evaluation, never mid-cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeArbiter {
    mode: OperatingMode,
    manual_duty: u8,
    auto: AutoConfig,
    schedule: ScheduleStore,
    /// Last duty applied by a tick; doubles as the hysteresis reference.
    output: u8,
    last_sample: SensorSample,
}

impl Default for ModeArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeArbiter {
    pub fn new() -> Self {
        Self {
            mode: OperatingMode::Manual,
            manual_duty: 0,
            auto: AutoConfig::default(),
            schedule: ScheduleStore::new(),
            output: 0,
            last_sample: SensorSample::default(),
        }
    }

    /// Switches the operating mode. Always succeeds and touches nothing
    /// but the mode flag; stored manual duty, auto bounds and registers
    /// are preserved across switches.
    pub fn set_mode(&mut self, mode: OperatingMode) {
        self.mode = mode;
    }

    /// Stores the manual duty. Takes effect while the mode is (or later
    /// becomes) Manual.
    pub fn set_manual_duty(&mut self, duty: u8) -> Result<(), EngineError> {
        if duty > 100 {
            return Err(EngineError::OutOfRange(duty));
        }
        self.manual_duty = duty;
        Ok(())
    }

    /// Stores new auto-mode bounds after validating `tmin < tmax`.
    pub fn set_auto_config(&mut self, tmin: f32, tmax: f32) -> Result<(), EngineError> {
        if !tmin.is_finite() || !tmax.is_finite() || tmin >= tmax {
            return Err(EngineError::InvalidRange);
        }
        self.auto = AutoConfig { tmin, tmax };
        Ok(())
    }

    pub fn set_register(&mut self, entry: RegisterEntry) -> Result<(), EngineError> {
        self.schedule.set(entry)
    }

    /// Replaces the schedule table wholesale. Used when restoring persisted
    /// state that already went through [`ScheduleStore::restore`].
    pub fn install_schedule(&mut self, schedule: ScheduleStore) {
        self.schedule = schedule;
    }

    pub fn register(&self, id: u8) -> Result<RegisterEntry, EngineError> {
        self.schedule.get(id)
    }

    pub const fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub const fn manual_duty(&self) -> u8 {
        self.manual_duty
    }

    pub const fn auto(&self) -> AutoConfig {
        self.auto
    }

    pub const fn output(&self) -> u8 {
        self.output
    }

    pub const fn schedule(&self) -> &ScheduleStore {
        &self.schedule
    }

    /// Evaluates one control tick and returns the duty to apply.
    ///
    /// Manual mode passes the stored duty through. Auto and Program rest
    /// the fan while nobody is present; Program additionally rests it
    /// whenever no register covers the current time, so an unscheduled
    /// period means "off" rather than "hold the last value".
    ///
    /// An `InvalidRange` escaping the interpolation means validation was
    /// bypassed somewhere; the error propagates and the tick leaves the
    /// output unchanged.
    pub fn tick(
        &mut self,
        sample: SensorSample,
        now: WeekInstant,
    ) -> Result<u8, EngineError> {
        let duty = match self.mode {
            OperatingMode::Manual => self.manual_duty.min(100),
            OperatingMode::Auto => {
                if !sample.presence {
                    0
                } else {
                    compute_duty(sample.temperature, self.auto.tmin, self.auto.tmax, self.output)?
                }
            }
            OperatingMode::Program => {
                if !sample.presence {
                    0
                } else {
                    match self.schedule.find_active_for(now) {
                        Some(entry) => compute_duty(
                            sample.temperature,
                            entry.temp0,
                            entry.temp100,
                            self.output,
                        )?,
                        None => 0,
                    }
                }
            }
        };

        self.last_sample = sample;
        self.output = duty;
        Ok(duty)
    }

    /// Rebuilds the read model from current state and the latest sample.
    pub fn snapshot(&self) -> DeviceStateSnapshot {
        DeviceStateSnapshot {
            temperature: self.last_sample.temperature,
            presence: self.last_sample.presence,
            pwm: self.output,
            mode: self.mode.code(),
            tmin: self.auto.tmin,
            tmax: self.auto.tmax,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn present(temperature: f32) -> SensorSample {
        SensorSample {
            temperature,
            presence: true,
        }
    }

    fn absent(temperature: f32) -> SensorSample {
        SensorSample {
            temperature,
            presence: false,
        }
    }

    fn monday(minute: u16) -> WeekInstant {
        WeekInstant { weekday: 0, minute }
    }

    fn register(id: u8, days: u8, start_h: u8, end_h: u8) -> RegisterEntry {
        RegisterEntry {
            id,
            active: true,
            hour_start: start_h,
            min_start: 0,
            hour_end: end_h,
            min_end: 0,
            temp0: 20.0,
            temp100: 30.0,
            days,
        }
    }

    #[test]
    fn mode_codes_roundtrip() {
        for mode in [
            OperatingMode::Manual,
            OperatingMode::Auto,
            OperatingMode::Program,
        ] {
            assert_eq!(OperatingMode::try_from(mode.code()).unwrap(), mode);
        }
        assert!(OperatingMode::try_from(3).is_err());
    }

    #[test]
    fn manual_mode_outputs_stored_duty() {
        let mut arbiter = ModeArbiter::new();
        arbiter.set_manual_duty(65).unwrap();

        let duty = arbiter.tick(present(25.0), monday(0)).unwrap();
        assert_eq!(duty, 65);

        // Manual mode ignores presence.
        let duty = arbiter.tick(absent(25.0), monday(0)).unwrap();
        assert_eq!(duty, 65);
    }

    #[test]
    fn manual_duty_out_of_range_rejected_state_unchanged() {
        let mut arbiter = ModeArbiter::new();
        arbiter.set_manual_duty(40).unwrap();

        assert_eq!(
            arbiter.set_manual_duty(101),
            Err(EngineError::OutOfRange(101))
        );
        assert_eq!(arbiter.manual_duty(), 40);
    }

    #[test]
    fn auto_mode_interpolates_between_bounds() {
        let mut arbiter = ModeArbiter::new();
        arbiter.set_auto_config(20.0, 30.0).unwrap();
        arbiter.set_mode(OperatingMode::Auto);

        let duty = arbiter.tick(present(25.0), monday(600)).unwrap();
        assert_eq!(duty, 50);
    }

    #[test]
    fn auto_mode_rests_when_absent() {
        let mut arbiter = ModeArbiter::new();
        arbiter.set_auto_config(20.0, 30.0).unwrap();
        arbiter.set_mode(OperatingMode::Auto);

        arbiter.tick(present(29.0), monday(600)).unwrap();
        assert_eq!(arbiter.output(), 90);

        let duty = arbiter.tick(absent(29.0), monday(600)).unwrap();
        assert_eq!(duty, 0);
    }

    #[test]
    fn invalid_auto_config_rejected_state_unchanged() {
        let mut arbiter = ModeArbiter::new();
        arbiter.set_auto_config(20.0, 30.0).unwrap();

        assert_eq!(
            arbiter.set_auto_config(10.0, 5.0),
            Err(EngineError::InvalidRange)
        );
        assert_eq!(
            arbiter.set_auto_config(10.0, 10.0),
            Err(EngineError::InvalidRange)
        );
        assert_eq!(arbiter.auto(), AutoConfig { tmin: 20.0, tmax: 30.0 });
    }

    #[test]
    fn program_mode_uses_matching_register_bounds() {
        let mut arbiter = ModeArbiter::new();
        arbiter.set_register(register(1, 0b000_0001, 8, 10)).unwrap();
        arbiter.set_mode(OperatingMode::Program);

        // Monday 09:00, 25 °C over 20..30 interpolates to 50.
        let duty = arbiter.tick(present(25.0), monday(9 * 60)).unwrap();
        assert_eq!(duty, 50);
    }

    #[test]
    fn program_mode_without_match_rests_the_fan() {
        let mut arbiter = ModeArbiter::new();
        arbiter.set_register(register(1, 0b000_0001, 8, 10)).unwrap();
        arbiter.set_mode(OperatingMode::Program);

        // Hot room, but Monday 12:00 is outside every window.
        let duty = arbiter.tick(present(35.0), monday(12 * 60)).unwrap();
        assert_eq!(duty, 0);

        // Same minute on a day the register does not cover.
        let tuesday = WeekInstant {
            weekday: 1,
            minute: 9 * 60,
        };
        assert_eq!(arbiter.tick(present(35.0), tuesday).unwrap(), 0);
    }

    #[test]
    fn program_mode_rests_when_absent_even_inside_window() {
        let mut arbiter = ModeArbiter::new();
        arbiter.set_register(register(1, 0b000_0001, 8, 10)).unwrap();
        arbiter.set_mode(OperatingMode::Program);

        assert_eq!(arbiter.tick(absent(35.0), monday(9 * 60)).unwrap(), 0);
    }

    #[test]
    fn mode_switch_takes_effect_on_next_tick_and_preserves_settings() {
        let mut arbiter = ModeArbiter::new();
        arbiter.set_manual_duty(70).unwrap();
        arbiter.set_auto_config(20.0, 30.0).unwrap();

        assert_eq!(arbiter.tick(present(25.0), monday(0)).unwrap(), 70);

        arbiter.set_mode(OperatingMode::Auto);
        // Output unchanged until the next tick runs.
        assert_eq!(arbiter.output(), 70);
        assert_eq!(arbiter.tick(present(25.0), monday(0)).unwrap(), 50);

        arbiter.set_mode(OperatingMode::Manual);
        assert_eq!(arbiter.tick(present(25.0), monday(0)).unwrap(), 70);
    }

    #[test]
    fn hysteresis_carries_across_ticks() {
        let mut arbiter = ModeArbiter::new();
        arbiter.set_auto_config(20.0, 30.0).unwrap();
        arbiter.set_mode(OperatingMode::Auto);

        assert_eq!(arbiter.tick(present(25.0), monday(0)).unwrap(), 50);

        // 25.1 °C maps to 51, inside the deadband; output holds at 50.
        assert_eq!(arbiter.tick(present(25.1), monday(0)).unwrap(), 50);
        assert_eq!(arbiter.tick(present(24.9), monday(0)).unwrap(), 50);

        // 25.5 °C maps to 55, outside the deadband.
        assert_eq!(arbiter.tick(present(25.5), monday(0)).unwrap(), 55);
    }

    #[test]
    fn snapshot_reflects_latest_tick() {
        let mut arbiter = ModeArbiter::new();
        arbiter.set_auto_config(20.0, 30.0).unwrap();
        arbiter.set_mode(OperatingMode::Auto);
        arbiter.tick(present(26.0), monday(0)).unwrap();

        let snapshot = arbiter.snapshot();
        assert_eq!(snapshot.temperature, 26.0);
        assert!(snapshot.presence);
        assert_eq!(snapshot.pwm, 60);
        assert_eq!(snapshot.mode, 1);
        assert_eq!(snapshot.tmin, 20.0);
        assert_eq!(snapshot.tmax, 30.0);
    }

    #[test]
    fn snapshot_before_first_tick_uses_defaults() {
        let arbiter = ModeArbiter::new();
        let snapshot = arbiter.snapshot();

        assert_eq!(snapshot.pwm, 0);
        assert_eq!(snapshot.mode, 0);
        assert!(!snapshot.presence);
    }

    #[test]
    fn register_roundtrip_through_arbiter() {
        let mut arbiter = ModeArbiter::new();
        let r = register(2, 0b000_0010, 6, 9);
        arbiter.set_register(r).unwrap();
        assert_eq!(arbiter.register(2).unwrap(), r);
        assert_eq!(arbiter.register(9), Err(EngineError::NotFound(9)));
    }

    #[test]
    fn conflicting_register_write_leaves_prior_state_queryable() {
        let mut arbiter = ModeArbiter::new();
        arbiter.set_register(register(1, 0b000_0001, 8, 10)).unwrap();

        let err = arbiter
            .set_register(register(2, 0b000_0011, 9, 11))
            .unwrap_err();
        assert_eq!(err, EngineError::Conflict { slots: vec![1] });

        assert_eq!(arbiter.register(1).unwrap().days, 0b000_0001);
        assert!(!arbiter.register(2).unwrap().active);
    }
}
