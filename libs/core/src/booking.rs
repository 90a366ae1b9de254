//! Booking service: availability lookups, appointment creation and status
//! changes, composed over a [`BookingStore`] and a [`Notifier`].

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::availability;
use crate::error::{BookingError, Result};
use crate::ledger::VoucherLedger;
use crate::lifecycle::{self, Actor};
use crate::models::{
    Appointment, AppointmentStatus, BlockedRange, ClientRef, NewAppointment, NewBlockedRange,
    Service, VoucherRedemption,
};
use crate::notify::{dispatch, Notification, Notifier};
use crate::slots::{SlotGrid, TimeSlot};
use crate::store::BookingStore;
use crate::voucher;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub therapist_id: i64,
    pub service_id: i64,
    pub date: NaiveDate,
    pub start_time: TimeSlot,
    pub client: ClientRef,
    #[serde(default)]
    pub voucher_code: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Staff may book straight into `pending`. Defaults to `confirmed`.
    #[serde(default)]
    pub status: Option<AppointmentStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingConfirmation {
    pub appointment: Appointment,
    pub price: i64,
    /// What the client still pays once the voucher is applied.
    pub effective_price: i64,
    pub redemption: Option<VoucherRedemption>,
}

#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    notifier: Arc<dyn Notifier>,
    ledger: VoucherLedger,
    grid: SlotGrid,
}

impl BookingService {
    pub fn new(store: Arc<dyn BookingStore>, notifier: Arc<dyn Notifier>, grid: SlotGrid) -> Self {
        Self {
            ledger: VoucherLedger::new(store.clone(), notifier.clone()),
            store,
            notifier,
            grid,
        }
    }

    pub fn grid(&self) -> &SlotGrid {
        &self.grid
    }

    pub fn ledger(&self) -> &VoucherLedger {
        &self.ledger
    }

    async fn active_service(&self, id: i64) -> Result<Service> {
        self.store
            .get_service(id)
            .await?
            .filter(|s| s.is_active)
            .ok_or(BookingError::ServiceNotFound(id))
    }

    /// Free start times for `therapist_id` on `date`. Without a service every
    /// grid slot is returned.
    pub async fn available_slots(
        &self,
        therapist_id: i64,
        date: NaiveDate,
        service_id: Option<i64>,
    ) -> Result<Vec<TimeSlot>> {
        let duration = match service_id {
            Some(id) => Some(self.active_service(id).await?.duration_minutes()),
            None => None,
        };
        let appointments = self.store.list_appointments(therapist_id, date).await?;
        let blocked = self.store.list_blocked_ranges(therapist_id, date).await?;
        Ok(availability::available_slots(
            &self.grid,
            date,
            therapist_id,
            duration,
            &appointments,
            &blocked,
        ))
    }

    /// Create an appointment, optionally paid (partly) with a voucher.
    pub async fn book(
        &self,
        request: BookingRequest,
        now: NaiveDateTime,
    ) -> Result<BookingConfirmation> {
        validate_client(&request.client)?;
        let service = self.active_service(request.service_id).await?;
        let duration = service.duration_minutes();

        if !self.grid.contains(request.start_time) || !self.grid.fits(request.start_time, duration)
        {
            return Err(BookingError::OutsideOpeningHours {
                start: request.start_time.to_string(),
                duration_min: duration,
            });
        }

        let status = request.status.unwrap_or(AppointmentStatus::Confirmed);
        if status.blocks_slot() {
            let free = self
                .available_slots(request.therapist_id, request.date, Some(service.id))
                .await?;
            if !free.contains(&request.start_time) {
                tracing::info!(
                    therapist_id = request.therapist_id,
                    date = %request.date,
                    start = %request.start_time,
                    "requested slot is taken"
                );
                return Err(BookingError::SlotNoLongerAvailable);
            }
        }

        let voucher = match request.voucher_code.as_deref() {
            Some(code) => Some(
                self.ledger
                    .verify_code(code, now, Some(service.id), request.client.user_id())
                    .await?,
            ),
            None => None,
        };
        let effective_price = voucher
            .as_ref()
            .map(|v| voucher::effective_price(service.price, v))
            .unwrap_or(service.price);

        let appointment = self
            .store
            .insert_appointment(
                &NewAppointment {
                    date: request.date,
                    start_time: request.start_time,
                    duration_min: duration,
                    therapist_id: request.therapist_id,
                    service_id: service.id,
                    client: request.client,
                    status,
                    notes: request.notes,
                    voucher_code: voucher.as_ref().map(|v| v.code.clone()),
                },
                now,
            )
            .await?;

        let charge = voucher
            .as_ref()
            .map(|v| voucher::booking_charge(service.price, v))
            .unwrap_or(0);
        let redemption = match voucher {
            // a free service leaves nothing to redeem, the code is still recorded
            Some(v) if charge == 0 => {
                tracing::debug!(voucher = %v.code, "nothing to charge, redemption skipped");
                None
            }
            Some(v) => {
                match self
                    .ledger
                    .apply(&v, charge, Some(appointment.id), None, None, now)
                    .await
                {
                    Ok((_, record)) => Some(record),
                    Err(e) => {
                        tracing::warn!(
                            appointment_id = appointment.id,
                            voucher = %v.code,
                            "voucher redemption failed, rolling back appointment: {}",
                            e
                        );
                        if let Err(cleanup) = self.store.delete_appointment(appointment.id).await {
                            tracing::error!(
                                appointment_id = appointment.id,
                                "Failed to roll back appointment: {}",
                                cleanup
                            );
                        }
                        return Err(e);
                    }
                }
            }
            None => None,
        };

        tracing::info!(
            appointment_id = appointment.id,
            therapist_id = appointment.therapist_id,
            date = %appointment.date,
            start = %appointment.start_time,
            price = service.price,
            effective_price,
            "appointment booked"
        );
        dispatch(
            self.notifier.clone(),
            Notification::AppointmentCreated(appointment.clone()),
        );

        Ok(BookingConfirmation {
            appointment,
            price: service.price,
            effective_price,
            redemption,
        })
    }

    /// Client self-cancellation, allowed only more than 24 hours ahead.
    /// Guests identify themselves with the phone they booked with.
    pub async fn cancel_by_client(
        &self,
        appointment_id: i64,
        user_id: Option<i64>,
        phone: Option<String>,
        now: NaiveDateTime,
    ) -> Result<Appointment> {
        self.change_status(
            appointment_id,
            AppointmentStatus::Cancelled,
            &Actor::Client { user_id, phone },
            now,
        )
        .await
    }

    pub async fn change_status(
        &self,
        appointment_id: i64,
        next: AppointmentStatus,
        actor: &Actor,
        now: NaiveDateTime,
    ) -> Result<Appointment> {
        let mut appointment = self.store.get_appointment(appointment_id).await?;
        let from = appointment.status;
        let next = lifecycle::transition(&appointment, next, actor, now)?;
        if from == next {
            return Ok(appointment);
        }

        self.store
            .update_appointment_status(appointment_id, next)
            .await?;
        appointment.status = next;

        tracing::info!(appointment_id, %from, to = %next, "appointment status changed");
        dispatch(
            self.notifier.clone(),
            Notification::AppointmentStatusChanged {
                appointment: appointment.clone(),
                from,
                to: next,
            },
        );
        Ok(appointment)
    }

    /// Staff-only hard delete.
    pub async fn delete_appointment(&self, appointment_id: i64, staff_id: i64) -> Result<()> {
        self.store.delete_appointment(appointment_id).await?;
        tracing::info!(appointment_id, staff_id, "appointment deleted");
        Ok(())
    }

    /// Take a therapist out of service for `[start_time, end_time)`.
    pub async fn block_time(&self, range: NewBlockedRange) -> Result<BlockedRange> {
        if range.start_time >= range.end_time {
            return Err(BookingError::InvalidRange(format!(
                "{} is not before {}",
                range.start_time, range.end_time
            )));
        }
        if range.start_time < self.grid.open() || range.end_time > self.grid.close() {
            return Err(BookingError::InvalidRange(format!(
                "{}-{} is outside opening hours {}-{}",
                range.start_time,
                range.end_time,
                self.grid.open(),
                self.grid.close()
            )));
        }

        let blocked = self.store.insert_blocked_range(&range).await?;
        tracing::info!(
            block_id = blocked.id,
            therapist_id = blocked.therapist_id,
            date = %blocked.date,
            start = %blocked.start_time,
            end = %blocked.end_time,
            "time blocked"
        );
        Ok(blocked)
    }

    /// Returns false if no such block existed.
    pub async fn unblock(&self, block_id: i64) -> Result<bool> {
        let removed = self.store.delete_blocked_range(block_id).await?;
        if removed {
            tracing::info!(block_id, "time unblocked");
        }
        Ok(removed)
    }
}

fn validate_client(client: &ClientRef) -> Result<()> {
    if let ClientRef::Guest { name, phone } = client {
        if name.trim().is_empty() || phone.trim().is_empty() {
            return Err(BookingError::InvalidClient(
                "guest bookings need a name and phone".into(),
            ));
        }
    }
    Ok(())
}
