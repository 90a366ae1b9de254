//! The booking grid: wall-clock slot labels for one working day.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BookingError, Result};

const MINUTES_PER_DAY: u32 = 24 * 60;

/// A wall-clock label (`HH:MM`) within a single day.
///
/// Stored as minutes since midnight; compares chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeSlot {
    minute: u16,
}

impl TimeSlot {
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        if minute >= 60 {
            return None;
        }
        Self::from_minute_of_day(hour * 60 + minute)
    }

    pub fn from_minute_of_day(minute: u32) -> Option<Self> {
        if minute >= MINUTES_PER_DAY {
            return None;
        }
        Some(Self {
            minute: minute as u16,
        })
    }

    pub fn minute_of_day(&self) -> u32 {
        u32::from(self.minute)
    }

    pub fn hour(&self) -> u32 {
        self.minute_of_day() / 60
    }

    pub fn minute(&self) -> u32 {
        self.minute_of_day() % 60
    }

    /// `None` when the result would roll past midnight.
    pub fn checked_add(&self, minutes: u32) -> Option<Self> {
        Self::from_minute_of_day(self.minute_of_day().checked_add(minutes)?)
    }

    pub fn to_naive_time(&self) -> NaiveTime {
        // from_minute_of_day guarantees hour < 24 and minute < 60
        NaiveTime::from_hms_opt(self.hour(), self.minute(), 0).unwrap_or(NaiveTime::MIN)
    }

    pub fn on(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.to_naive_time())
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for TimeSlot {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || BookingError::InvalidTimeLabel(s.to_string());
        let (h, m) = s.split_once(':').ok_or_else(invalid)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(invalid());
        }
        let hour: u32 = h.parse().map_err(|_| invalid())?;
        let minute: u32 = m.parse().map_err(|_| invalid())?;
        TimeSlot::from_hm(hour, minute).ok_or_else(invalid)
    }
}

impl TryFrom<String> for TimeSlot {
    type Error = BookingError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TimeSlot> for String {
    fn from(slot: TimeSlot) -> Self {
        slot.to_string()
    }
}

// ── Opening hours ──

/// Business-day bounds and grid granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningHours {
    pub open: TimeSlot,
    pub close: TimeSlot,
    pub step_minutes: u32,
}

impl Default for OpeningHours {
    fn default() -> Self {
        Self {
            open: TimeSlot { minute: 8 * 60 },
            close: TimeSlot { minute: 18 * 60 },
            step_minutes: 30,
        }
    }
}

/// Produce slot labels from `open` (inclusive) to `close` (exclusive) every
/// `step_minutes`.
pub fn generate_slots(open: TimeSlot, close: TimeSlot, step_minutes: u32) -> Result<Vec<TimeSlot>> {
    if close <= open {
        return Err(BookingError::InvalidConfiguration(format!(
            "closing time {close} must be after opening time {open}"
        )));
    }
    if step_minutes == 0 {
        return Err(BookingError::InvalidConfiguration(
            "slot step must be positive".into(),
        ));
    }

    let slots = (open.minute_of_day()..close.minute_of_day())
        .step_by(step_minutes as usize)
        .filter_map(TimeSlot::from_minute_of_day)
        .collect();
    Ok(slots)
}

/// A generated grid together with the bounds it was generated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotGrid {
    hours: OpeningHours,
    slots: Vec<TimeSlot>,
}

impl SlotGrid {
    pub fn generate(hours: OpeningHours) -> Result<Self> {
        let slots = generate_slots(hours.open, hours.close, hours.step_minutes)?;
        Ok(Self { hours, slots })
    }

    pub fn slots(&self) -> &[TimeSlot] {
        &self.slots
    }

    pub fn hours(&self) -> OpeningHours {
        self.hours
    }

    pub fn open(&self) -> TimeSlot {
        self.hours.open
    }

    pub fn close(&self) -> TimeSlot {
        self.hours.close
    }

    pub fn contains(&self, slot: TimeSlot) -> bool {
        self.slots.binary_search(&slot).is_ok()
    }

    /// True when `[start, start + duration)` ends no later than closing time.
    pub fn fits(&self, start: TimeSlot, duration_min: u32) -> bool {
        start.minute_of_day() + duration_min <= self.hours.close.minute_of_day()
    }

    pub fn iter(&self) -> impl Iterator<Item = TimeSlot> + '_ {
        self.slots.iter().copied()
    }
}
