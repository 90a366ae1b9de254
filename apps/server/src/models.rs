use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use spa_core::models::{AppointmentStatus, NewVoucher, Voucher, VoucherOwner, VoucherQuantity};
use spa_core::TimeSlot;

// ── API request/response types ──

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub therapist_id: i64,
    pub date: NaiveDate,
    pub service_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub therapist_id: i64,
    pub date: NaiveDate,
    pub slots: Vec<TimeSlot>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyVoucherRequest {
    pub code: String,
    pub service_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct VerifyVoucherResponse {
    pub voucher: Voucher,
    /// Present when a service was given.
    pub price: Option<i64>,
    pub effective_price: Option<i64>,
}

/// Guests prove the booking is theirs with the phone they booked with.
#[derive(Debug, Default, Deserialize)]
pub struct CancelBookingRequest {
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Deserialize)]
pub struct CreateBlockRequest {
    pub therapist_id: i64,
    pub date: NaiveDate,
    pub start_time: TimeSlot,
    pub end_time: TimeSlot,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IssueVoucherRequest {
    pub service_id: Option<i64>,
    pub owner: VoucherOwner,
    /// `single` (money) or `package` (sessions).
    pub voucher_type: VoucherKind,
    pub amount: i64,
    pub expires_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoucherKind {
    Single,
    Package,
}

impl IssueVoucherRequest {
    pub fn into_new_voucher(self) -> NewVoucher {
        let quantity = match self.voucher_type {
            VoucherKind::Single => VoucherQuantity::money(self.amount),
            VoucherKind::Package => VoucherQuantity::sessions(self.amount),
        };
        NewVoucher {
            service_id: self.service_id,
            owner: self.owner,
            quantity,
            expires_at: self.expires_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub amount: i64,
    pub appointment_id: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub id: i64,
    pub deleted: bool,
}

// ── Generic API response ──

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
