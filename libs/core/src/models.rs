use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::availability::Interval;
use crate::error::{corrupt, BookingError};
use crate::slots::TimeSlot;

// ── Services ──

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub price: i64,
    pub duration_min: i64,
    pub is_active: bool,
}

impl Service {
    pub fn duration_minutes(&self) -> u32 {
        u32::try_from(self.duration_min).unwrap_or(0)
    }
}

// ── Appointments ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    /// Only pending and confirmed appointments take capacity away from the grid.
    pub fn blocks_slot(&self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AppointmentStatus::Pending),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            other => Err(corrupt(format!("unknown appointment status {other:?}"))),
        }
    }
}

/// Who the appointment is for: a registered user or a walk-in guest, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientRef {
    User { user_id: i64 },
    Guest { name: String, phone: String },
}

impl ClientRef {
    pub fn user_id(&self) -> Option<i64> {
        match self {
            ClientRef::User { user_id } => Some(*user_id),
            ClientRef::Guest { .. } => None,
        }
    }
}

impl fmt::Display for ClientRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientRef::User { user_id } => write!(f, "user #{user_id}"),
            ClientRef::Guest { name, phone } => write!(f, "{name} ({phone})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: i64,
    pub date: NaiveDate,
    pub start_time: TimeSlot,
    pub duration_min: u32,
    pub therapist_id: i64,
    pub service_id: i64,
    pub client: ClientRef,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub voucher_code: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Appointment {
    pub fn interval(&self) -> Interval {
        Interval::starting_at(self.start_time, self.duration_min)
    }

    /// Wall-clock moment the appointment begins.
    pub fn starts_at(&self) -> NaiveDateTime {
        self.start_time.on(self.date)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAppointment {
    pub date: NaiveDate,
    pub start_time: TimeSlot,
    pub duration_min: u32,
    pub therapist_id: i64,
    pub service_id: i64,
    pub client: ClientRef,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub voucher_code: Option<String>,
}

impl NewAppointment {
    pub fn interval(&self) -> Interval {
        Interval::starting_at(self.start_time, self.duration_min)
    }
}

// ── Blocked ranges ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedRange {
    pub id: i64,
    pub therapist_id: i64,
    pub date: NaiveDate,
    pub start_time: TimeSlot,
    pub end_time: TimeSlot,
    pub reason: Option<String>,
    pub created_by: i64,
}

impl BlockedRange {
    pub fn interval(&self) -> Interval {
        Interval::new(self.start_time.minute_of_day(), self.end_time.minute_of_day())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBlockedRange {
    pub therapist_id: i64,
    pub date: NaiveDate,
    pub start_time: TimeSlot,
    pub end_time: TimeSlot,
    pub reason: Option<String>,
    pub created_by: i64,
}

// ── Vouchers ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoucherStatus {
    Active,
    Redeemed,
    Expired,
    Cancelled,
}

impl VoucherStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoucherStatus::Active => "active",
            VoucherStatus::Redeemed => "redeemed",
            VoucherStatus::Expired => "expired",
            VoucherStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for VoucherStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoucherStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(VoucherStatus::Active),
            "redeemed" => Ok(VoucherStatus::Redeemed),
            "expired" => Ok(VoucherStatus::Expired),
            "cancelled" => Ok(VoucherStatus::Cancelled),
            other => Err(corrupt(format!("unknown voucher status {other:?}"))),
        }
    }
}

/// The redeemable quantity of a voucher: a cash balance (`single`) or a
/// session counter (`package`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VoucherQuantity {
    #[serde(rename = "single")]
    Money { original: i64, remaining: i64 },
    #[serde(rename = "package")]
    Sessions { original: i64, remaining: i64 },
}

impl VoucherQuantity {
    pub fn money(value: i64) -> Self {
        VoucherQuantity::Money {
            original: value,
            remaining: value,
        }
    }

    pub fn sessions(count: i64) -> Self {
        VoucherQuantity::Sessions {
            original: count,
            remaining: count,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            VoucherQuantity::Money { .. } => "single",
            VoucherQuantity::Sessions { .. } => "package",
        }
    }

    pub fn original(&self) -> i64 {
        match self {
            VoucherQuantity::Money { original, .. } | VoucherQuantity::Sessions { original, .. } => {
                *original
            }
        }
    }

    pub fn remaining(&self) -> i64 {
        match self {
            VoucherQuantity::Money { remaining, .. }
            | VoucherQuantity::Sessions { remaining, .. } => *remaining,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() <= 0
    }
}

/// Who holds a voucher. A guest purchase can later be bound to a registered
/// user exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VoucherOwner {
    User {
        user_id: i64,
    },
    Guest {
        name: String,
        email: Option<String>,
        phone: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voucher {
    pub id: i64,
    pub code: String,
    pub service_id: Option<i64>,
    pub owner: VoucherOwner,
    pub quantity: VoucherQuantity,
    pub status: VoucherStatus,
    pub expires_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    /// Bumped on every balance change; guards compare-and-swap updates.
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVoucher {
    pub service_id: Option<i64>,
    pub owner: VoucherOwner,
    pub quantity: VoucherQuantity,
    pub expires_at: Option<NaiveDateTime>,
}

// ── Redemptions ──

/// What a single redemption took off the voucher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "amount", rename_all = "snake_case")]
pub enum RedemptionDelta {
    Value(i64),
    Sessions(i64),
}

impl RedemptionDelta {
    pub fn amount(&self) -> i64 {
        match self {
            RedemptionDelta::Value(v) | RedemptionDelta::Sessions(v) => *v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoucherRedemption {
    pub id: i64,
    pub voucher_id: i64,
    pub voucher_code: String,
    pub appointment_id: Option<i64>,
    pub delta: RedemptionDelta,
    pub redeemed_by: Option<i64>,
    pub notes: Option<String>,
    pub redeemed_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRedemption {
    pub voucher_id: i64,
    pub voucher_code: String,
    pub appointment_id: Option<i64>,
    pub delta: RedemptionDelta,
    pub redeemed_by: Option<i64>,
    pub notes: Option<String>,
    pub redeemed_at: NaiveDateTime,
}
