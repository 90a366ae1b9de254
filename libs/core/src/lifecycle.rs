//! Appointment status transitions and the client cancellation policy.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{BookingError, Result};
use crate::models::{Appointment, AppointmentStatus, ClientRef};

/// Clients may cancel on their own only this far ahead of the appointment.
pub const CANCELLATION_WINDOW_HOURS: i64 = 24;

/// Who is asking for a status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Actor {
    /// Admins and therapists.
    Staff { staff_id: i64 },
    /// `phone` proves ownership of a guest appointment.
    Client {
        user_id: Option<i64>,
        #[serde(default)]
        phone: Option<String>,
    },
}

/// Strictly more than 24 hours must remain before the appointment starts.
pub fn can_cancel(appointment_at: NaiveDateTime, now: NaiveDateTime) -> bool {
    appointment_at - now > Duration::hours(CANCELLATION_WINDOW_HOURS)
}

/// Decide whether `actor` may move `appointment` to `next`.
///
/// Staff transitions are unrestricted, including reopening a cancelled
/// appointment. Clients may only cancel their own appointment, and only while
/// [`can_cancel`] holds. A guest appointment is theirs when they present the
/// phone it was booked with.
pub fn transition(
    appointment: &Appointment,
    next: AppointmentStatus,
    actor: &Actor,
    now: NaiveDateTime,
) -> Result<AppointmentStatus> {
    match actor {
        Actor::Staff { staff_id } => {
            if next == AppointmentStatus::Completed && appointment.starts_at() > now {
                tracing::warn!(
                    appointment_id = appointment.id,
                    staff_id,
                    starts_at = %appointment.starts_at(),
                    "future appointment marked completed, its slot becomes bookable"
                );
            }
            if appointment.status == AppointmentStatus::Cancelled && next.blocks_slot() {
                tracing::info!(
                    appointment_id = appointment.id,
                    staff_id,
                    "reopening cancelled appointment"
                );
            }
            Ok(next)
        }
        Actor::Client { user_id, phone } => {
            if next != AppointmentStatus::Cancelled {
                return Err(BookingError::TransitionNotPermitted(format!(
                    "clients cannot move an appointment to {next}"
                )));
            }
            let owns = match &appointment.client {
                ClientRef::User { user_id: owner } => *user_id == Some(*owner),
                ClientRef::Guest { phone: booked, .. } => phone
                    .as_deref()
                    .is_some_and(|p| !p.trim().is_empty() && p.trim() == booked.trim()),
            };
            if !owns {
                return Err(BookingError::TransitionNotPermitted(
                    "appointment belongs to another client".into(),
                ));
            }
            if !appointment.status.blocks_slot() {
                return Err(BookingError::TransitionNotPermitted(format!(
                    "appointment is already {}",
                    appointment.status
                )));
            }
            if !can_cancel(appointment.starts_at(), now) {
                return Err(BookingError::CancellationWindowClosed);
            }
            Ok(next)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slots::TimeSlot;
    use chrono::{NaiveDate, Timelike};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    /// Helper: an appointment starting `hours_ahead` hours after `now()`.
    fn make_appointment(hours_ahead: i64, status: AppointmentStatus) -> Appointment {
        let at = now() + Duration::hours(hours_ahead);
        Appointment {
            id: 5,
            date: at.date(),
            start_time: TimeSlot::from_hm(at.hour(), at.minute()).unwrap(),
            duration_min: 60,
            therapist_id: 1,
            service_id: 1,
            client: ClientRef::User { user_id: 42 },
            status,
            notes: None,
            voucher_code: None,
            created_at: now(),
        }
    }

    fn client() -> Actor {
        Actor::Client {
            user_id: Some(42),
            phone: None,
        }
    }

    fn guest_appointment() -> Appointment {
        let mut appt = make_appointment(48, AppointmentStatus::Pending);
        appt.client = ClientRef::Guest {
            name: "Walk-in".into(),
            phone: "+48 600 100 200".into(),
        };
        appt
    }

    // ── can_cancel ──

    #[test]
    fn test_can_cancel_30_hours_ahead() {
        assert!(can_cancel(now() + Duration::hours(30), now()));
    }

    #[test]
    fn test_cannot_cancel_10_hours_ahead() {
        assert!(!can_cancel(now() + Duration::hours(10), now()));
    }

    #[test]
    fn test_exactly_24_hours_is_too_late() {
        assert!(!can_cancel(now() + Duration::hours(24), now()));
        assert!(can_cancel(
            now() + Duration::hours(24) + Duration::minutes(1),
            now()
        ));
    }

    #[test]
    fn test_past_appointment_cannot_cancel() {
        assert!(!can_cancel(now() - Duration::hours(1), now()));
    }

    // ── transition: client ──

    #[test]
    fn test_client_cancel_in_time() {
        let appt = make_appointment(30, AppointmentStatus::Confirmed);
        assert_eq!(
            transition(&appt, AppointmentStatus::Cancelled, &client(), now()).unwrap(),
            AppointmentStatus::Cancelled
        );
    }

    #[test]
    fn test_client_cancel_too_late() {
        let appt = make_appointment(10, AppointmentStatus::Confirmed);
        assert!(matches!(
            transition(&appt, AppointmentStatus::Cancelled, &client(), now()),
            Err(BookingError::CancellationWindowClosed)
        ));
    }

    #[test]
    fn test_client_cannot_confirm() {
        let appt = make_appointment(30, AppointmentStatus::Pending);
        assert!(matches!(
            transition(&appt, AppointmentStatus::Confirmed, &client(), now()),
            Err(BookingError::TransitionNotPermitted(_))
        ));
    }

    #[test]
    fn test_client_cannot_cancel_someone_elses() {
        let appt = make_appointment(30, AppointmentStatus::Confirmed);
        let stranger = Actor::Client {
            user_id: Some(7),
            phone: None,
        };
        assert!(matches!(
            transition(&appt, AppointmentStatus::Cancelled, &stranger, now()),
            Err(BookingError::TransitionNotPermitted(_))
        ));
    }

    #[test]
    fn test_client_cannot_cancel_twice() {
        let appt = make_appointment(30, AppointmentStatus::Cancelled);
        assert!(matches!(
            transition(&appt, AppointmentStatus::Cancelled, &client(), now()),
            Err(BookingError::TransitionNotPermitted(_))
        ));
    }

    #[test]
    fn test_guest_cancels_with_booked_phone() {
        let guest = Actor::Client {
            user_id: None,
            phone: Some(" +48 600 100 200".into()),
        };
        assert!(transition(
            &guest_appointment(),
            AppointmentStatus::Cancelled,
            &guest,
            now()
        )
        .is_ok());
    }

    #[test]
    fn test_guest_appointment_needs_matching_phone() {
        let appt = guest_appointment();
        for phone in [None, Some(String::new()), Some("+48 999".to_string())] {
            let caller = Actor::Client {
                user_id: None,
                phone,
            };
            assert!(matches!(
                transition(&appt, AppointmentStatus::Cancelled, &caller, now()),
                Err(BookingError::TransitionNotPermitted(_))
            ));
        }
        // a registered user id does not stand in for the guest's phone
        assert!(matches!(
            transition(&appt, AppointmentStatus::Cancelled, &client(), now()),
            Err(BookingError::TransitionNotPermitted(_))
        ));
    }

    // ── transition: staff ──

    #[test]
    fn test_staff_unrestricted() {
        let staff = Actor::Staff { staff_id: 1 };
        let all = [
            AppointmentStatus::Pending,
            AppointmentStatus::Confirmed,
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
        ];
        for from in all {
            for to in all {
                let appt = make_appointment(2, from);
                assert_eq!(transition(&appt, to, &staff, now()).unwrap(), to);
            }
        }
    }

    #[test]
    fn test_staff_can_cancel_inside_window() {
        let appt = make_appointment(1, AppointmentStatus::Confirmed);
        let staff = Actor::Staff { staff_id: 1 };
        assert!(transition(&appt, AppointmentStatus::Cancelled, &staff, now()).is_ok());
    }
}
