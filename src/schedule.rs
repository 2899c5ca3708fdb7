//! Weekly schedule registers with conflict detection.
//!
//! The device holds exactly three recurring schedule registers. Each one
//! describes a daily time-of-day window, the weekdays it applies to and the
//! temperature bounds used to interpolate fan duty while it is active.
//! Writes are validated and checked for overlap against the other active
//! registers before anything is stored.

use chrono::{Datelike, Local, Timelike};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Number of schedule register slots. Fixed by the device contract.
pub const SLOT_COUNT: usize = 3;

/// Minutes in a day; windows live in `0..MINUTES_PER_DAY`.
pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// A point in the weekly calendar: weekday plus minute of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekInstant {
    /// 0 = Monday .. 6 = Sunday, matching the register day bitmask.
    pub weekday: u8,
    /// Minutes since local midnight, `0..1440`.
    pub minute: u16,
}

impl WeekInstant {
    /// Reads the current weekday and minute of day from the local clock.
    pub fn now() -> Self {
        let now = Local::now();
        Self {
            weekday: now.weekday().num_days_from_monday() as u8,
            minute: (now.hour() * 60 + now.minute()) as u16,
        }
    }
}

/// One schedule register.
///
/// The window `[start, end)` is half-open in minutes of day. `end < start`
/// means the window wraps past midnight; `start == end` is an empty window
/// that never matches and never conflicts. Bit *i* of `days` enables the
/// window on weekday *i* (0 = Monday). Wire field names are the ones the
/// device has always served.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegisterEntry {
    /// Stable slot id, 1..=3.
    pub id: u8,
    pub active: bool,
    pub hour_start: u8,
    pub min_start: u8,
    pub hour_end: u8,
    pub min_end: u8,
    /// Temperature mapped to duty 0 while this register is active.
    pub temp0: f32,
    /// Temperature mapped to duty 100 while this register is active.
    pub temp100: f32,
    /// Weekday bitmask, 7 bits.
    pub days: u8,
}

impl RegisterEntry {
    /// Factory-default register contents for a slot: inactive, no days,
    /// 24 °C .. 30 °C bounds.
    pub fn inert(id: u8) -> Self {
        Self {
            id,
            active: false,
            hour_start: 0,
            min_start: 0,
            hour_end: 0,
            min_end: 0,
            temp0: 24.0,
            temp100: 30.0,
            days: 0,
        }
    }

    pub fn start_min(&self) -> u16 {
        u16::from(self.hour_start) * 60 + u16::from(self.min_start)
    }

    pub fn end_min(&self) -> u16 {
        u16::from(self.hour_end) * 60 + u16::from(self.min_end)
    }

    /// Whether the window crosses midnight.
    pub fn wraps(&self) -> bool {
        self.end_min() < self.start_min()
    }

    /// The window as up to two non-wrapping half-open segments.
    /// A segment with `start >= end` is empty and must be skipped.
    fn segments(&self) -> [(u16, u16); 2] {
        let (start, end) = (self.start_min(), self.end_min());
        if self.wraps() {
            [(start, MINUTES_PER_DAY), (0, end)]
        } else {
            [(start, end), (0, 0)]
        }
    }

    /// Whether `minute` falls inside the window.
    pub fn contains(&self, minute: u16) -> bool {
        let (start, end) = (self.start_min(), self.end_min());
        if start == end {
            return false;
        }
        if self.wraps() {
            minute >= start || minute < end
        } else {
            minute >= start && minute < end
        }
    }

    /// Whether the register is enabled on the given weekday (0 = Monday).
    pub fn applies_on(&self, weekday: u8) -> bool {
        weekday < 7 && self.days & (1 << weekday) != 0
    }

    /// Whether the register takes part in activation and overlap checks.
    /// Inactive registers, registers with no enabled day and empty windows
    /// are all exempt.
    fn participates(&self) -> bool {
        self.active && self.days != 0 && self.start_min() != self.end_min()
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.hour_start > 23 || self.hour_end > 23 {
            return Err(EngineError::validation(format!(
                "hours {}..{} outside 0..=23",
                self.hour_start, self.hour_end
            )));
        }
        if self.min_start > 59 || self.min_end > 59 {
            return Err(EngineError::validation(format!(
                "minutes {}..{} outside 0..=59",
                self.min_start, self.min_end
            )));
        }
        if self.days > 0x7F {
            return Err(EngineError::validation(format!(
                "day mask {:#04x} uses more than 7 bits",
                self.days
            )));
        }
        if !self.temp0.is_finite() || !self.temp100.is_finite() || self.temp0 >= self.temp100 {
            return Err(EngineError::validation(format!(
                "temperature bounds {}..{} must be finite and strictly increasing",
                self.temp0, self.temp100
            )));
        }
        Ok(())
    }
}

/// Two registers overlap when any pair of their non-wrapping segments does.
fn windows_overlap(a: &RegisterEntry, b: &RegisterEntry) -> bool {
    for (s1, e1) in a.segments() {
        if s1 >= e1 {
            continue;
        }
        for (s2, e2) in b.segments() {
            if s2 >= e2 {
                continue;
            }
            if s1 < e2 && s2 < e1 {
                return true;
            }
        }
    }
    false
}

/// Fixed-size table of the three schedule registers.
///
/// Slots are created inert and only ever overwritten in full through
/// [`ScheduleStore::set`]; a rejected write leaves the table untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleStore {
    slots: [RegisterEntry; SLOT_COUNT],
}

impl Default for ScheduleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleStore {
    pub fn new() -> Self {
        Self {
            slots: [
                RegisterEntry::inert(1),
                RegisterEntry::inert(2),
                RegisterEntry::inert(3),
            ],
        }
    }

    /// Rebuilds a store from persisted entries. Entries that no longer
    /// validate or that collide are replaced by factory defaults, the same
    /// way the device falls back when stored blobs are unreadable.
    pub fn restore<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = RegisterEntry>,
    {
        let mut store = Self::new();
        for entry in entries {
            let id = entry.id;
            if let Err(e) = store.set(entry) {
                warn!("Dropping persisted register {id}: {e}");
            }
        }
        store
    }

    fn slot_index(id: u8) -> Result<usize, EngineError> {
        if (1..=SLOT_COUNT as u8).contains(&id) {
            Ok(usize::from(id - 1))
        } else {
            Err(EngineError::NotFound(id))
        }
    }

    pub fn get(&self, id: u8) -> Result<RegisterEntry, EngineError> {
        Ok(self.slots[Self::slot_index(id)?])
    }

    /// Validates and stores a register, replacing the slot's previous
    /// contents in full. Active entries with at least one enabled day are
    /// checked for window overlap against every other participating entry
    /// sharing a day bit; on collision the write is rejected with the
    /// complete list of colliding slots and nothing changes.
    ///
    /// Deactivating a slot always succeeds whatever the other fields hold:
    /// inactive entries never participate in activation or overlap checks,
    /// so there is nothing to protect.
    pub fn set(&mut self, entry: RegisterEntry) -> Result<(), EngineError> {
        let idx = Self::slot_index(entry.id)?;

        if !entry.active {
            self.slots[idx] = entry;
            return Ok(());
        }

        entry.validate()?;

        if entry.participates() {
            let colliding: Vec<u8> = self
                .slots
                .iter()
                .filter(|other| other.id != entry.id && other.participates())
                .filter(|other| other.days & entry.days != 0)
                .filter(|other| windows_overlap(&entry, other))
                .map(|other| other.id)
                .collect();

            if !colliding.is_empty() {
                return Err(EngineError::Conflict { slots: colliding });
            }
        }

        self.slots[idx] = entry;
        Ok(())
    }

    /// Returns the active register covering `now`, if any. When more than
    /// one matches the lowest slot id wins; the conflict check makes that
    /// case unreachable for stored entries, the tie-break just keeps the
    /// lookup total.
    pub fn find_active_for(&self, now: WeekInstant) -> Option<RegisterEntry> {
        self.slots
            .iter()
            .find(|r| r.active && r.applies_on(now.weekday) && r.contains(now.minute))
            .copied()
    }

    pub fn entries(&self) -> &[RegisterEntry; SLOT_COUNT] {
        &self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn entry(id: u8, days: u8, start: (u8, u8), end: (u8, u8)) -> RegisterEntry {
        RegisterEntry {
            id,
            active: true,
            hour_start: start.0,
            min_start: start.1,
            hour_end: end.0,
            min_end: end.1,
            temp0: 24.0,
            temp100: 30.0,
            days,
        }
    }

    const MON: u8 = 0b000_0001;
    const TUE: u8 = 0b000_0010;
    const MON_TUE: u8 = 0b000_0011;

    #[test]
    fn new_store_holds_inert_slots() {
        let store = ScheduleStore::new();
        for id in 1..=3 {
            let r = store.get(id).unwrap();
            assert_eq!(r, RegisterEntry::inert(id));
        }
    }

    #[test]
    fn get_unknown_slot_fails() {
        let store = ScheduleStore::new();
        assert_eq!(store.get(0), Err(EngineError::NotFound(0)));
        assert_eq!(store.get(4), Err(EngineError::NotFound(4)));
    }

    #[test]
    fn set_then_get_returns_exactly_what_was_written() {
        let mut store = ScheduleStore::new();
        let r = entry(2, MON, (8, 30), (10, 15));

        store.set(r).unwrap();
        assert_eq!(store.get(2).unwrap(), r);

        // Untouched slots keep their defaults.
        assert_eq!(store.get(1).unwrap(), RegisterEntry::inert(1));
        assert_eq!(store.get(3).unwrap(), RegisterEntry::inert(3));
    }

    #[test]
    fn set_is_idempotent() {
        let mut store = ScheduleStore::new();
        let r = entry(1, MON, (8, 0), (10, 0));

        store.set(r).unwrap();
        let after_first = store.clone();
        store.set(r).unwrap();
        assert_eq!(store, after_first);
    }

    #[test]
    fn set_unknown_slot_fails() {
        let mut store = ScheduleStore::new();
        assert_eq!(
            store.set(entry(7, MON, (8, 0), (10, 0))),
            Err(EngineError::NotFound(7))
        );
    }

    #[test]
    fn field_ranges_are_validated() {
        let mut store = ScheduleStore::new();

        let mut bad_hour = entry(1, MON, (24, 0), (10, 0));
        assert!(matches!(
            store.set(bad_hour),
            Err(EngineError::Validation(_))
        ));
        bad_hour = entry(1, MON, (8, 0), (25, 0));
        assert!(matches!(
            store.set(bad_hour),
            Err(EngineError::Validation(_))
        ));

        let bad_minute = entry(1, MON, (8, 60), (10, 0));
        assert!(matches!(
            store.set(bad_minute),
            Err(EngineError::Validation(_))
        ));

        let mut bad_days = entry(1, 0xFF, (8, 0), (10, 0));
        bad_days.days = 0x80;
        assert!(matches!(
            store.set(bad_days),
            Err(EngineError::Validation(_))
        ));

        let mut bad_temps = entry(1, MON, (8, 0), (10, 0));
        bad_temps.temp0 = 30.0;
        bad_temps.temp100 = 30.0;
        assert!(matches!(
            store.set(bad_temps),
            Err(EngineError::Validation(_))
        ));

        // A rejected write leaves the store untouched.
        assert_eq!(store.get(1).unwrap(), RegisterEntry::inert(1));
    }

    #[test]
    fn overlap_on_shared_day_is_rejected_with_colliding_slot() {
        let mut store = ScheduleStore::new();
        store.set(entry(1, MON, (8, 0), (10, 0))).unwrap();

        let colliding = entry(2, MON_TUE, (9, 0), (11, 0));
        assert_eq!(
            store.set(colliding),
            Err(EngineError::Conflict { slots: vec![1] })
        );

        // Slot 2 still has its defaults after the rejection.
        assert_eq!(store.get(2).unwrap(), RegisterEntry::inert(2));
    }

    #[test]
    fn same_window_on_disjoint_days_is_accepted() {
        let mut store = ScheduleStore::new();
        store.set(entry(1, MON, (8, 0), (10, 0))).unwrap();
        store.set(entry(2, TUE, (9, 0), (11, 0))).unwrap();

        assert_eq!(store.get(2).unwrap().days, TUE);
    }

    #[test]
    fn touching_windows_do_not_conflict() {
        // Half-open windows: [8:00, 10:00) and [10:00, 12:00) share a day
        // but no minute.
        let mut store = ScheduleStore::new();
        store.set(entry(1, MON, (8, 0), (10, 0))).unwrap();
        store.set(entry(2, MON, (10, 0), (12, 0))).unwrap();
    }

    #[test]
    fn conflict_lists_every_colliding_slot() {
        let mut store = ScheduleStore::new();
        store.set(entry(1, MON, (8, 0), (10, 0))).unwrap();
        store.set(entry(3, MON, (14, 0), (16, 0))).unwrap();

        // 09:00..15:00 crosses both stored windows.
        assert_eq!(
            store.set(entry(2, MON, (9, 0), (15, 0))),
            Err(EngineError::Conflict { slots: vec![1, 3] })
        );
    }

    #[test]
    fn inactive_entries_are_exempt_from_overlap() {
        let mut store = ScheduleStore::new();
        store.set(entry(1, MON, (8, 0), (10, 0))).unwrap();

        let mut overlapping_but_inactive = entry(2, MON, (9, 0), (11, 0));
        overlapping_but_inactive.active = false;
        store.set(overlapping_but_inactive).unwrap();

        // And an active write ignores the stored inactive one.
        store.set(entry(3, MON, (9, 30), (9, 45))).unwrap_err();
        store.set(entry(3, MON, (11, 0), (12, 0))).unwrap();
    }

    #[test]
    fn zero_day_mask_is_exempt_from_overlap() {
        let mut store = ScheduleStore::new();
        store.set(entry(1, MON, (8, 0), (10, 0))).unwrap();
        store.set(entry(2, 0, (8, 0), (10, 0))).unwrap();
    }

    #[test]
    fn deactivating_always_succeeds() {
        let mut store = ScheduleStore::new();
        store.set(entry(1, MON, (8, 0), (10, 0))).unwrap();
        store.set(entry(2, TUE, (9, 0), (11, 0))).unwrap();

        // Deactivate slot 1 with a window that would collide if active.
        let mut off = entry(1, MON_TUE, (9, 30), (10, 30));
        off.active = false;
        store.set(off).unwrap();
        assert!(!store.get(1).unwrap().active);

        // Even nonsense field values are stored for an inactive slot; the
        // erase flow sends zeroed entries without caring about ranges.
        let mut garbage = entry(2, MON, (99, 99), (0, 0));
        garbage.active = false;
        garbage.temp0 = 50.0;
        garbage.temp100 = 10.0;
        store.set(garbage).unwrap();
        assert_eq!(store.get(2).unwrap(), garbage);
    }

    #[test]
    fn wrapping_window_conflicts_across_midnight_segments() {
        let mut store = ScheduleStore::new();
        // 22:00 .. 02:00, wraps.
        store.set(entry(1, MON, (22, 0), (2, 0))).unwrap();

        // Early-morning window inside the wrapped tail.
        assert_eq!(
            store.set(entry(2, MON, (1, 0), (3, 0))),
            Err(EngineError::Conflict { slots: vec![1] })
        );

        // Late-evening window inside the head.
        assert_eq!(
            store.set(entry(2, MON, (23, 0), (23, 30))),
            Err(EngineError::Conflict { slots: vec![1] })
        );

        // Midday window clears both segments.
        store.set(entry(2, MON, (10, 0), (12, 0))).unwrap();
    }

    #[test]
    fn empty_window_never_matches_or_conflicts() {
        let mut store = ScheduleStore::new();
        store.set(entry(1, MON, (8, 0), (8, 0))).unwrap();
        store.set(entry(2, MON, (7, 0), (9, 0))).unwrap();

        let now = WeekInstant {
            weekday: 0,
            minute: 8 * 60,
        };
        assert_eq!(store.find_active_for(now).unwrap().id, 2);
    }

    #[test]
    fn find_active_matches_day_and_window() {
        let mut store = ScheduleStore::new();
        store.set(entry(2, MON, (8, 0), (10, 0))).unwrap();

        let monday_nine = WeekInstant {
            weekday: 0,
            minute: 9 * 60,
        };
        assert_eq!(store.find_active_for(monday_nine).unwrap().id, 2);

        // Same minute on Tuesday: no match.
        let tuesday_nine = WeekInstant {
            weekday: 1,
            minute: 9 * 60,
        };
        assert_eq!(store.find_active_for(tuesday_nine), None);

        // Window end is exclusive.
        let monday_ten = WeekInstant {
            weekday: 0,
            minute: 10 * 60,
        };
        assert_eq!(store.find_active_for(monday_ten), None);
    }

    #[test]
    fn find_active_handles_wrapping_windows() {
        let mut store = ScheduleStore::new();
        store.set(entry(1, MON, (22, 0), (2, 0))).unwrap();

        let late = WeekInstant {
            weekday: 0,
            minute: 23 * 60,
        };
        assert!(store.find_active_for(late).is_some());

        let early = WeekInstant {
            weekday: 0,
            minute: 60,
        };
        assert!(store.find_active_for(early).is_some());

        let midday = WeekInstant {
            weekday: 0,
            minute: 12 * 60,
        };
        assert_eq!(store.find_active_for(midday), None);
    }

    #[test]
    fn find_active_prefers_lowest_slot_id() {
        // Matching entries in several slots cannot be stored through set,
        // so build the state via restore with a hand-made collision.
        let mut store = ScheduleStore::new();
        store.slots[0] = entry(1, MON, (8, 0), (10, 0));
        store.slots[2] = entry(3, MON, (8, 0), (10, 0));

        let now = WeekInstant {
            weekday: 0,
            minute: 9 * 60,
        };
        assert_eq!(store.find_active_for(now).unwrap().id, 1);
    }

    #[test]
    fn restore_drops_invalid_and_colliding_entries() {
        let mut bad_temps = entry(2, TUE, (9, 0), (11, 0));
        bad_temps.temp0 = 40.0;

        let store = ScheduleStore::restore([
            entry(1, MON, (8, 0), (10, 0)),
            bad_temps,
            entry(3, MON, (9, 0), (11, 0)), // collides with slot 1
        ]);

        assert_eq!(store.get(1).unwrap().days, MON);
        assert_eq!(store.get(2).unwrap(), RegisterEntry::inert(2));
        assert_eq!(store.get(3).unwrap(), RegisterEntry::inert(3));
    }

    proptest! {
        #[test]
        fn overlap_check_is_symmetric(
            s1 in 0u16..1440,
            e1 in 0u16..1440,
            s2 in 0u16..1440,
            e2 in 0u16..1440,
        ) {
            let a = entry(1, MON, ((s1 / 60) as u8, (s1 % 60) as u8), ((e1 / 60) as u8, (e1 % 60) as u8));
            let b = entry(2, MON, ((s2 / 60) as u8, (s2 % 60) as u8), ((e2 / 60) as u8, (e2 % 60) as u8));
            prop_assert_eq!(windows_overlap(&a, &b), windows_overlap(&b, &a));
        }

        #[test]
        fn overlap_agrees_with_minute_set_intersection(
            s1 in 0u16..1440,
            e1 in 0u16..1440,
            s2 in 0u16..1440,
            e2 in 0u16..1440,
        ) {
            let a = entry(1, MON, ((s1 / 60) as u8, (s1 % 60) as u8), ((e1 / 60) as u8, (e1 % 60) as u8));
            let b = entry(2, MON, ((s2 / 60) as u8, (s2 % 60) as u8), ((e2 / 60) as u8, (e2 % 60) as u8));

            let brute = (0..MINUTES_PER_DAY).any(|m| a.contains(m) && b.contains(m));
            prop_assert_eq!(windows_overlap(&a, &b), brute);
        }

        #[test]
        fn first_write_into_empty_store_never_conflicts(
            id in 1u8..=3,
            days in 0u8..=0x7F,
            start in 0u16..1440,
            end in 0u16..1440,
        ) {
            let mut store = ScheduleStore::new();
            let r = entry(id, days, ((start / 60) as u8, (start % 60) as u8), ((end / 60) as u8, (end % 60) as u8));
            prop_assert!(store.set(r).is_ok());
            prop_assert_eq!(store.get(id).unwrap(), r);
        }
    }
}
