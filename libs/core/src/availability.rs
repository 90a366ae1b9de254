//! Which grid slots can still take a booking for one therapist on one day.

use chrono::NaiveDate;

use crate::models::{Appointment, BlockedRange};
use crate::slots::{SlotGrid, TimeSlot};

/// Half-open interval `[start, end)` in minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: u32,
    pub end: u32,
}

impl Interval {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn starting_at(slot: TimeSlot, duration_min: u32) -> Self {
        let start = slot.minute_of_day();
        Self::new(start, start + duration_min)
    }

    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && self.end > other.start
    }
}

/// Intervals that take capacity away from `therapist_id` on `date`.
///
/// Cancelled and completed appointments are ignored; blocked ranges count by
/// existence alone.
pub fn busy_intervals(
    date: NaiveDate,
    therapist_id: i64,
    appointments: &[Appointment],
    blocked: &[BlockedRange],
) -> Vec<Interval> {
    let booked = appointments
        .iter()
        .filter(|a| a.therapist_id == therapist_id && a.date == date && a.status.blocks_slot())
        .map(Appointment::interval);
    let blocks = blocked
        .iter()
        .filter(|b| b.therapist_id == therapist_id && b.date == date)
        .map(BlockedRange::interval);
    booked.chain(blocks).collect()
}

/// Filter `grid` down to the start times where a `duration_min` session fits
/// before closing and overlaps nothing already booked or blocked.
///
/// Without a duration (no service picked yet) the full grid is returned.
/// Output keeps grid order. Inputs are never modified.
pub fn available_slots(
    grid: &SlotGrid,
    date: NaiveDate,
    therapist_id: i64,
    duration_min: Option<u32>,
    appointments: &[Appointment],
    blocked: &[BlockedRange],
) -> Vec<TimeSlot> {
    let Some(duration_min) = duration_min else {
        return grid.slots().to_vec();
    };

    let busy = busy_intervals(date, therapist_id, appointments, blocked);
    let free: Vec<TimeSlot> = grid
        .iter()
        .filter(|slot| grid.fits(*slot, duration_min))
        .filter(|slot| {
            let wanted = Interval::starting_at(*slot, duration_min);
            !busy.iter().any(|b| wanted.overlaps(b))
        })
        .collect();

    tracing::debug!(
        therapist_id,
        %date,
        duration_min,
        busy = busy.len(),
        free = free.len(),
        "computed availability"
    );
    free
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentStatus, ClientRef};
    use crate::slots::OpeningHours;

    fn t(label: &str) -> TimeSlot {
        label.parse().unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn grid() -> SlotGrid {
        SlotGrid::generate(OpeningHours::default()).unwrap()
    }

    /// Helper: build an Appointment without boilerplate.
    fn make_appointment(
        therapist_id: i64,
        start: &str,
        duration_min: u32,
        status: AppointmentStatus,
    ) -> Appointment {
        Appointment {
            id: 1,
            date: day(),
            start_time: t(start),
            duration_min,
            therapist_id,
            service_id: 1,
            client: ClientRef::User { user_id: 42 },
            status,
            notes: None,
            voucher_code: None,
            created_at: day().and_hms_opt(7, 0, 0).unwrap(),
        }
    }

    fn make_block(therapist_id: i64, start: &str, end: &str) -> BlockedRange {
        BlockedRange {
            id: 1,
            therapist_id,
            date: day(),
            start_time: t(start),
            end_time: t(end),
            reason: Some("lunch".into()),
            created_by: 99,
        }
    }

    // ── Interval ──

    #[test]
    fn test_overlap_basic() {
        assert!(Interval::new(600, 660).overlaps(&Interval::new(630, 690)));
        assert!(Interval::new(630, 690).overlaps(&Interval::new(600, 660)));
    }

    #[test]
    fn test_touching_endpoints_do_not_overlap() {
        assert!(!Interval::new(600, 660).overlaps(&Interval::new(660, 720)));
        assert!(!Interval::new(660, 720).overlaps(&Interval::new(600, 660)));
    }

    #[test]
    fn test_containment_overlaps() {
        assert!(Interval::new(600, 720).overlaps(&Interval::new(630, 660)));
        assert!(Interval::new(630, 660).overlaps(&Interval::new(600, 720)));
    }

    // ── available_slots ──

    #[test]
    fn test_no_duration_returns_full_grid() {
        let appts = vec![make_appointment(1, "10:00", 60, AppointmentStatus::Confirmed)];
        let free = available_slots(&grid(), day(), 1, None, &appts, &[]);
        assert_eq!(free, grid().slots().to_vec());
    }

    #[test]
    fn test_confirmed_hour_at_ten() {
        let appts = vec![make_appointment(1, "10:00", 60, AppointmentStatus::Confirmed)];
        let free = available_slots(&grid(), day(), 1, Some(60), &appts, &[]);

        for excluded in ["09:30", "10:00", "10:30"] {
            assert!(!free.contains(&t(excluded)), "{excluded} must be excluded");
        }
        for included in ["08:00", "08:30", "09:00", "11:00", "11:30"] {
            assert!(free.contains(&t(included)), "{included} must be included");
        }
    }

    #[test]
    fn test_half_hour_after_appointment_end_is_free() {
        // 10:00–10:30 appointment; 60-min request at 10:30 touches but does not overlap
        let appts = vec![make_appointment(1, "10:00", 30, AppointmentStatus::Confirmed)];
        let free = available_slots(&grid(), day(), 1, Some(60), &appts, &[]);
        assert!(free.contains(&t("10:30")));
        assert!(free.contains(&t("09:00")));
        assert!(!free.contains(&t("09:30")));
    }

    #[test]
    fn test_must_end_before_closing() {
        let free = available_slots(&grid(), day(), 1, Some(90), &[], &[]);
        assert_eq!(*free.last().unwrap(), t("16:30"));
        assert!(!free.contains(&t("17:00")));
    }

    #[test]
    fn test_duration_longer_than_day() {
        let free = available_slots(&grid(), day(), 1, Some(11 * 60), &[], &[]);
        assert!(free.is_empty());
    }

    #[test]
    fn test_cancelled_and_completed_do_not_block() {
        let appts = vec![
            make_appointment(1, "10:00", 60, AppointmentStatus::Cancelled),
            make_appointment(1, "12:00", 60, AppointmentStatus::Completed),
        ];
        let free = available_slots(&grid(), day(), 1, Some(60), &appts, &[]);
        assert!(free.contains(&t("10:00")));
        assert!(free.contains(&t("12:00")));
    }

    #[test]
    fn test_pending_blocks() {
        let appts = vec![make_appointment(1, "10:00", 60, AppointmentStatus::Pending)];
        let free = available_slots(&grid(), day(), 1, Some(30), &appts, &[]);
        assert!(!free.contains(&t("10:00")));
        assert!(!free.contains(&t("10:30")));
        assert!(free.contains(&t("09:30")));
        assert!(free.contains(&t("11:00")));
    }

    #[test]
    fn test_other_therapist_and_date_ignored() {
        let mut other_day = make_appointment(1, "10:00", 60, AppointmentStatus::Confirmed);
        other_day.date = day().succ_opt().unwrap();
        let appts = vec![
            make_appointment(2, "10:00", 60, AppointmentStatus::Confirmed),
            other_day,
        ];
        let blocks = vec![make_block(2, "12:00", "14:00")];
        let free = available_slots(&grid(), day(), 1, Some(60), &appts, &blocks);
        assert_eq!(free.len(), grid().slots().len() - 1);
    }

    #[test]
    fn test_blocked_range_removes_capacity() {
        let blocks = vec![make_block(1, "12:00", "13:00")];
        let free = available_slots(&grid(), day(), 1, Some(30), &[], &blocks);
        assert!(!free.contains(&t("12:00")));
        assert!(!free.contains(&t("12:30")));
        assert!(free.contains(&t("11:30")));
        assert!(free.contains(&t("13:00")));
    }

    #[test]
    fn test_overlapping_stored_appointments_block_both() {
        let appts = vec![
            make_appointment(1, "10:00", 60, AppointmentStatus::Confirmed),
            make_appointment(1, "10:30", 60, AppointmentStatus::Confirmed),
        ];
        let free = available_slots(&grid(), day(), 1, Some(60), &appts, &[]);
        for excluded in ["09:30", "10:00", "10:30", "11:00"] {
            assert!(!free.contains(&t(excluded)));
        }
        assert!(free.contains(&t("11:30")));
    }

    #[test]
    fn test_output_in_grid_order_and_idempotent() {
        let appts = vec![make_appointment(1, "13:00", 45, AppointmentStatus::Confirmed)];
        let blocks = vec![make_block(1, "09:00", "09:30")];
        let first = available_slots(&grid(), day(), 1, Some(45), &appts, &blocks);
        let second = available_slots(&grid(), day(), 1, Some(45), &appts, &blocks);
        assert_eq!(first, second);
        assert!(first.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_busy_intervals_filters() {
        let appts = vec![
            make_appointment(1, "10:00", 60, AppointmentStatus::Confirmed),
            make_appointment(1, "14:00", 60, AppointmentStatus::Cancelled),
        ];
        let blocks = vec![make_block(1, "16:00", "17:00")];
        let busy = busy_intervals(day(), 1, &appts, &blocks);
        assert_eq!(
            busy,
            vec![Interval::new(600, 660), Interval::new(960, 1020)]
        );
    }
}
