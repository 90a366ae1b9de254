//! Persistence collaborator used by the booking and ledger services.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::models::{
    Appointment, AppointmentStatus, BlockedRange, NewAppointment, NewBlockedRange, NewVoucher,
    Service, Voucher, VoucherRedemption, VoucherStatus,
};
use crate::voucher::Redemption;

/// Record store for appointments, blocks, vouchers and redemptions.
///
/// Implementations must make [`insert_appointment`](BookingStore::insert_appointment)
/// and [`apply_voucher_redemption`](BookingStore::apply_voucher_redemption)
/// atomic: a concurrent loser gets `SlotNoLongerAvailable` or
/// `ConcurrentRedemptionConflict`, never a silent overwrite.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn get_service(&self, id: i64) -> Result<Option<Service>>;

    // ── Appointments ──

    async fn list_appointments(&self, therapist_id: i64, date: NaiveDate)
        -> Result<Vec<Appointment>>;

    async fn get_appointment(&self, id: i64) -> Result<Appointment>;

    /// Fails with `SlotNoLongerAvailable` if the interval overlaps a pending or
    /// confirmed appointment or a blocked range of the same therapist.
    async fn insert_appointment(
        &self,
        appointment: &NewAppointment,
        created_at: chrono::NaiveDateTime,
    ) -> Result<Appointment>;

    async fn update_appointment_status(&self, id: i64, status: AppointmentStatus) -> Result<()>;

    async fn delete_appointment(&self, id: i64) -> Result<()>;

    // ── Blocked ranges ──

    async fn list_blocked_ranges(
        &self,
        therapist_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<BlockedRange>>;

    async fn insert_blocked_range(&self, range: &NewBlockedRange) -> Result<BlockedRange>;

    /// Returns false if nothing was deleted.
    async fn delete_blocked_range(&self, id: i64) -> Result<bool>;

    // ── Vouchers ──

    async fn get_voucher_by_code(&self, code: &str) -> Result<Voucher>;

    async fn voucher_code_exists(&self, code: &str) -> Result<bool>;

    /// Fails with `VoucherCodeTaken` on a duplicate code.
    async fn insert_voucher(
        &self,
        code: &str,
        voucher: &NewVoucher,
        created_at: chrono::NaiveDateTime,
    ) -> Result<Voucher>;

    async fn set_voucher_status(&self, id: i64, status: VoucherStatus) -> Result<()>;

    /// Bind a guest voucher to `user_id`. Returns false if the voucher already
    /// had a registered owner.
    async fn assign_voucher_owner(&self, id: i64, user_id: i64) -> Result<bool>;

    /// Persist the updated balance and the audit record as one unit, provided
    /// the stored version still equals `redemption.expected_version`.
    async fn apply_voucher_redemption(&self, redemption: &Redemption)
        -> Result<VoucherRedemption>;

    async fn list_redemptions(&self, voucher_id: i64) -> Result<Vec<VoucherRedemption>>;
}
