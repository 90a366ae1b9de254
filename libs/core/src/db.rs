use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::SqlitePool;

use crate::error::{corrupt, BookingError, Result};
use crate::models::*;
use crate::slots::TimeSlot;
use crate::store::BookingStore;
use crate::voucher::Redemption;

const DATE_FMT: &str = "%Y-%m-%d";
const TIMESTAMP_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Named, run-once schema migrations, applied in order.
const MIGRATIONS: &[(&str, &str)] = &[
    ("001_init", include_str!("../migrations/001_init.sql")),
    ("002_indexes", include_str!("../migrations/002_indexes.sql")),
];

pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    // WAL lets availability reads proceed while a booking write is in flight
    sqlx::query("PRAGMA journal_mode=WAL").execute(pool).await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(pool)
    .await?;

    for (name, sql) in MIGRATIONS {
        let applied: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?")
                .bind(*name)
                .fetch_one(pool)
                .await?;
        if applied {
            continue;
        }

        let mut tx = pool.begin().await?;
        for statement in sql.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed).execute(&mut *tx).await?;
            }
        }
        sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
            .bind(*name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        tracing::info!("Applied migration: {}", name);
    }

    tracing::info!("Database migrations up to date");
    Ok(())
}

// ── Row types ──

const APPOINTMENT_SELECT: &str =
    "SELECT id, date, start_time, duration_min, therapist_id, service_id,
            client_user_id, guest_name, guest_phone, status, notes, voucher_code, created_at
     FROM appointments";

const VOUCHER_SELECT: &str =
    "SELECT id, code, voucher_type, service_id, owner_user_id, guest_name, guest_email,
            guest_phone, original_value, remaining_value, original_sessions,
            remaining_sessions, status, expires_at, created_at, version
     FROM vouchers";

const REDEMPTION_SELECT: &str =
    "SELECT id, voucher_id, voucher_code, appointment_id, redeemed_value, redeemed_sessions,
            redeemed_by, notes, redeemed_at
     FROM voucher_redemptions";

#[derive(sqlx::FromRow)]
struct AppointmentRow {
    id: i64,
    date: String,
    start_time: String,
    duration_min: i64,
    therapist_id: i64,
    service_id: i64,
    client_user_id: Option<i64>,
    guest_name: Option<String>,
    guest_phone: Option<String>,
    status: String,
    notes: Option<String>,
    voucher_code: Option<String>,
    created_at: String,
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = BookingError;

    fn try_from(row: AppointmentRow) -> Result<Self> {
        let client = match (row.client_user_id, row.guest_name) {
            (Some(user_id), _) => ClientRef::User { user_id },
            (None, Some(name)) => ClientRef::Guest {
                name,
                phone: row.guest_phone.unwrap_or_default(),
            },
            (None, None) => return Err(corrupt(format!("appointment {} has no client", row.id))),
        };
        Ok(Appointment {
            id: row.id,
            date: parse_date(&row.date)?,
            start_time: row.start_time.parse()?,
            duration_min: u32::try_from(row.duration_min)
                .map_err(|_| corrupt(format!("appointment {} duration", row.id)))?,
            therapist_id: row.therapist_id,
            service_id: row.service_id,
            client,
            status: row.status.parse()?,
            notes: row.notes,
            voucher_code: row.voucher_code,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BlockedRangeRow {
    id: i64,
    therapist_id: i64,
    date: String,
    start_time: String,
    end_time: String,
    reason: Option<String>,
    created_by: i64,
}

impl TryFrom<BlockedRangeRow> for BlockedRange {
    type Error = BookingError;

    fn try_from(row: BlockedRangeRow) -> Result<Self> {
        Ok(BlockedRange {
            id: row.id,
            therapist_id: row.therapist_id,
            date: parse_date(&row.date)?,
            start_time: row.start_time.parse()?,
            end_time: row.end_time.parse()?,
            reason: row.reason,
            created_by: row.created_by,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VoucherRow {
    id: i64,
    code: String,
    voucher_type: String,
    service_id: Option<i64>,
    owner_user_id: Option<i64>,
    guest_name: Option<String>,
    guest_email: Option<String>,
    guest_phone: Option<String>,
    original_value: Option<i64>,
    remaining_value: Option<i64>,
    original_sessions: Option<i64>,
    remaining_sessions: Option<i64>,
    status: String,
    expires_at: Option<String>,
    created_at: String,
    version: i64,
}

impl TryFrom<VoucherRow> for Voucher {
    type Error = BookingError;

    fn try_from(row: VoucherRow) -> Result<Self> {
        let missing = |field: &str| corrupt(format!("voucher {} missing {}", row.code, field));
        let quantity = match row.voucher_type.as_str() {
            "single" => VoucherQuantity::Money {
                original: row.original_value.ok_or_else(|| missing("original_value"))?,
                remaining: row.remaining_value.ok_or_else(|| missing("remaining_value"))?,
            },
            "package" => VoucherQuantity::Sessions {
                original: row.original_sessions.ok_or_else(|| missing("original_sessions"))?,
                remaining: row
                    .remaining_sessions
                    .ok_or_else(|| missing("remaining_sessions"))?,
            },
            other => return Err(corrupt(format!("unknown voucher type {other:?}"))),
        };
        // The purchaser's guest details stay on the row after a user claims it.
        let owner = match (row.owner_user_id, row.guest_name) {
            (Some(user_id), _) => VoucherOwner::User { user_id },
            (None, Some(name)) => VoucherOwner::Guest {
                name,
                email: row.guest_email,
                phone: row.guest_phone,
            },
            (None, None) => return Err(missing("owner")),
        };
        Ok(Voucher {
            id: row.id,
            code: row.code,
            service_id: row.service_id,
            owner,
            quantity,
            status: row.status.parse()?,
            expires_at: row.expires_at.as_deref().map(parse_timestamp).transpose()?,
            created_at: parse_timestamp(&row.created_at)?,
            version: row.version,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RedemptionRow {
    id: i64,
    voucher_id: i64,
    voucher_code: String,
    appointment_id: Option<i64>,
    redeemed_value: Option<i64>,
    redeemed_sessions: Option<i64>,
    redeemed_by: Option<i64>,
    notes: Option<String>,
    redeemed_at: String,
}

impl TryFrom<RedemptionRow> for VoucherRedemption {
    type Error = BookingError;

    fn try_from(row: RedemptionRow) -> Result<Self> {
        let delta = match (row.redeemed_value, row.redeemed_sessions) {
            (Some(value), None) => RedemptionDelta::Value(value),
            (None, Some(sessions)) => RedemptionDelta::Sessions(sessions),
            _ => return Err(corrupt(format!("redemption {} has no single delta", row.id))),
        };
        Ok(VoucherRedemption {
            id: row.id,
            voucher_id: row.voucher_id,
            voucher_code: row.voucher_code,
            appointment_id: row.appointment_id,
            delta,
            redeemed_by: row.redeemed_by,
            notes: row.notes,
            redeemed_at: parse_timestamp(&row.redeemed_at)?,
        })
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FMT).map_err(|_| corrupt(format!("bad date {s:?}")))
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FMT)
        .map_err(|_| corrupt(format!("bad timestamp {s:?}")))
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FMT).to_string()
}

fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FMT).to_string()
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Map a write error on `appointments` to the booking conflict it stands for.
fn slot_conflict(e: sqlx::Error) -> BookingError {
    if is_unique_violation(&e) {
        BookingError::SlotNoLongerAvailable
    } else {
        BookingError::Storage(e)
    }
}

// ── Store ──

/// [`BookingStore`] backed by SQLite.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Add a service to the catalog. Catalog management lives outside the
    /// engine; this is used for seeding.
    pub async fn insert_service(&self, name: &str, price: i64, duration_min: i64) -> Result<Service> {
        let id = sqlx::query("INSERT INTO services (name, price, duration_min) VALUES (?, ?, ?)")
            .bind(name)
            .bind(price)
            .bind(duration_min)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        self.get_service(id)
            .await?
            .ok_or(BookingError::ServiceNotFound(id))
    }

    async fn get_voucher_by_id(&self, id: i64) -> Result<Voucher> {
        let query = format!("{} WHERE id = ?", VOUCHER_SELECT);
        sqlx::query_as::<_, VoucherRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| BookingError::VoucherNotFound(format!("#{id}")))?
            .try_into()
    }
}

#[async_trait]
impl BookingStore for SqliteStore {
    async fn get_service(&self, id: i64) -> Result<Option<Service>> {
        let service = sqlx::query_as::<_, Service>(
            "SELECT id, name, price, duration_min, is_active FROM services WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(service)
    }

    async fn list_appointments(
        &self,
        therapist_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>> {
        let query = format!(
            "{} WHERE therapist_id = ? AND date = ? ORDER BY start_minute ASC, id ASC",
            APPOINTMENT_SELECT
        );
        sqlx::query_as::<_, AppointmentRow>(&query)
            .bind(therapist_id)
            .bind(format_date(date))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Appointment::try_from)
            .collect()
    }

    async fn get_appointment(&self, id: i64) -> Result<Appointment> {
        let query = format!("{} WHERE id = ?", APPOINTMENT_SELECT);
        sqlx::query_as::<_, AppointmentRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(BookingError::AppointmentNotFound(id))?
            .try_into()
    }

    async fn insert_appointment(
        &self,
        appointment: &NewAppointment,
        created_at: NaiveDateTime,
    ) -> Result<Appointment> {
        let interval = appointment.interval();
        let date = format_date(appointment.date);
        let (user_id, guest_name, guest_phone) = match &appointment.client {
            ClientRef::User { user_id } => (Some(*user_id), None, None),
            ClientRef::Guest { name, phone } => (None, Some(name.as_str()), Some(phone.as_str())),
        };

        // Single statement: the overlap check and the insert cannot interleave
        // with another writer.
        let result = sqlx::query(
            "INSERT INTO appointments (date, start_time, start_minute, duration_min, end_minute,
                 therapist_id, service_id, client_user_id, guest_name, guest_phone,
                 status, notes, voucher_code, created_at)
             SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
             WHERE ? = 0 OR (
                 NOT EXISTS (
                     SELECT 1 FROM appointments
                     WHERE therapist_id = ? AND date = ?
                       AND status IN ('pending', 'confirmed')
                       AND start_minute < ? AND end_minute > ?
                 )
                 AND NOT EXISTS (
                     SELECT 1 FROM blocked_ranges
                     WHERE therapist_id = ? AND date = ?
                       AND start_minute < ? AND end_minute > ?
                 )
             )",
        )
        .bind(&date)
        .bind(appointment.start_time.to_string())
        .bind(interval.start)
        .bind(appointment.duration_min)
        .bind(interval.end)
        .bind(appointment.therapist_id)
        .bind(appointment.service_id)
        .bind(user_id)
        .bind(guest_name)
        .bind(guest_phone)
        .bind(appointment.status.as_str())
        .bind(&appointment.notes)
        .bind(&appointment.voucher_code)
        .bind(format_timestamp(created_at))
        .bind(appointment.status.blocks_slot())
        .bind(appointment.therapist_id)
        .bind(&date)
        .bind(interval.end)
        .bind(interval.start)
        .bind(appointment.therapist_id)
        .bind(&date)
        .bind(interval.end)
        .bind(interval.start)
        .execute(&self.pool)
        .await
        .map_err(slot_conflict)?;

        if result.rows_affected() == 0 {
            return Err(BookingError::SlotNoLongerAvailable);
        }
        self.get_appointment(result.last_insert_rowid()).await
    }

    async fn update_appointment_status(&self, id: i64, status: AppointmentStatus) -> Result<()> {
        // Moving a row into a slot-blocking status runs the same overlap guard
        // as insert_appointment. Rows already blocking the slot keep it.
        let result = sqlx::query(
            "UPDATE appointments SET status = ?
             WHERE id = ? AND (
                 ? = 0
                 OR status IN ('pending', 'confirmed')
                 OR (
                     NOT EXISTS (
                         SELECT 1 FROM appointments other
                         WHERE other.id <> appointments.id
                           AND other.therapist_id = appointments.therapist_id
                           AND other.date = appointments.date
                           AND other.status IN ('pending', 'confirmed')
                           AND other.start_minute < appointments.end_minute
                           AND other.end_minute > appointments.start_minute
                     )
                     AND NOT EXISTS (
                         SELECT 1 FROM blocked_ranges b
                         WHERE b.therapist_id = appointments.therapist_id
                           AND b.date = appointments.date
                           AND b.start_minute < appointments.end_minute
                           AND b.end_minute > appointments.start_minute
                     )
                 )
             )",
        )
        .bind(status.as_str())
        .bind(id)
        .bind(status.blocks_slot())
        .execute(&self.pool)
        .await
        .map_err(slot_conflict)?;
        if result.rows_affected() == 0 {
            // either the row is gone or the guard refused it
            self.get_appointment(id).await?;
            return Err(BookingError::SlotNoLongerAvailable);
        }
        Ok(())
    }

    async fn delete_appointment(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM appointments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(BookingError::AppointmentNotFound(id));
        }
        Ok(())
    }

    async fn list_blocked_ranges(
        &self,
        therapist_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<BlockedRange>> {
        sqlx::query_as::<_, BlockedRangeRow>(
            "SELECT id, therapist_id, date, start_time, end_time, reason, created_by
             FROM blocked_ranges WHERE therapist_id = ? AND date = ?
             ORDER BY start_minute ASC",
        )
        .bind(therapist_id)
        .bind(format_date(date))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(BlockedRange::try_from)
        .collect()
    }

    async fn insert_blocked_range(&self, range: &NewBlockedRange) -> Result<BlockedRange> {
        let id = sqlx::query(
            "INSERT INTO blocked_ranges (therapist_id, date, start_time, end_time,
                 start_minute, end_minute, reason, created_by)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(range.therapist_id)
        .bind(format_date(range.date))
        .bind(range.start_time.to_string())
        .bind(range.end_time.to_string())
        .bind(range.start_time.minute_of_day())
        .bind(range.end_time.minute_of_day())
        .bind(&range.reason)
        .bind(range.created_by)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(BlockedRange {
            id,
            therapist_id: range.therapist_id,
            date: range.date,
            start_time: range.start_time,
            end_time: range.end_time,
            reason: range.reason.clone(),
            created_by: range.created_by,
        })
    }

    async fn delete_blocked_range(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM blocked_ranges WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_voucher_by_code(&self, code: &str) -> Result<Voucher> {
        let query = format!("{} WHERE code = ?", VOUCHER_SELECT);
        sqlx::query_as::<_, VoucherRow>(&query)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| BookingError::VoucherNotFound(code.to_string()))?
            .try_into()
    }

    async fn voucher_code_exists(&self, code: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM vouchers WHERE code = ?")
            .bind(code)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn insert_voucher(
        &self,
        code: &str,
        voucher: &NewVoucher,
        created_at: NaiveDateTime,
    ) -> Result<Voucher> {
        let (original_value, remaining_value, original_sessions, remaining_sessions) =
            match voucher.quantity {
                VoucherQuantity::Money {
                    original,
                    remaining,
                } => (Some(original), Some(remaining), None, None),
                VoucherQuantity::Sessions {
                    original,
                    remaining,
                } => (None, None, Some(original), Some(remaining)),
            };
        let (owner_user_id, guest_name, guest_email, guest_phone) = match &voucher.owner {
            VoucherOwner::User { user_id } => (Some(*user_id), None, None, None),
            VoucherOwner::Guest { name, email, phone } => (
                None,
                Some(name.as_str()),
                email.as_deref(),
                phone.as_deref(),
            ),
        };

        let id = sqlx::query(
            "INSERT INTO vouchers (code, voucher_type, service_id, owner_user_id,
                 guest_name, guest_email, guest_phone, original_value, remaining_value,
                 original_sessions, remaining_sessions, status, expires_at, created_at, version)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'active', ?, ?, 0)",
        )
        .bind(code)
        .bind(voucher.quantity.type_name())
        .bind(voucher.service_id)
        .bind(owner_user_id)
        .bind(guest_name)
        .bind(guest_email)
        .bind(guest_phone)
        .bind(original_value)
        .bind(remaining_value)
        .bind(original_sessions)
        .bind(remaining_sessions)
        .bind(voucher.expires_at.map(format_timestamp))
        .bind(format_timestamp(created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                BookingError::VoucherCodeTaken(code.to_string())
            } else {
                BookingError::Storage(e)
            }
        })?
        .last_insert_rowid();

        self.get_voucher_by_id(id).await
    }

    async fn set_voucher_status(&self, id: i64, status: VoucherStatus) -> Result<()> {
        let result = sqlx::query("UPDATE vouchers SET status = ?, version = version + 1 WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(BookingError::VoucherNotFound(format!("#{id}")));
        }
        Ok(())
    }

    async fn assign_voucher_owner(&self, id: i64, user_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE vouchers SET owner_user_id = ? WHERE id = ? AND owner_user_id IS NULL",
        )
        .bind(user_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn apply_voucher_redemption(&self, redemption: &Redemption) -> Result<VoucherRedemption> {
        let voucher = &redemption.voucher;
        let record = &redemption.record;
        let (remaining_value, remaining_sessions) = match voucher.quantity {
            VoucherQuantity::Money { remaining, .. } => (Some(remaining), None),
            VoucherQuantity::Sessions { remaining, .. } => (None, Some(remaining)),
        };
        let (redeemed_value, redeemed_sessions) = match record.delta {
            RedemptionDelta::Value(v) => (Some(v), None),
            RedemptionDelta::Sessions(s) => (None, Some(s)),
        };

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE vouchers
             SET remaining_value = COALESCE(?, remaining_value),
                 remaining_sessions = COALESCE(?, remaining_sessions),
                 status = ?, version = ?
             WHERE id = ? AND version = ?",
        )
        .bind(remaining_value)
        .bind(remaining_sessions)
        .bind(voucher.status.as_str())
        .bind(voucher.version)
        .bind(voucher.id)
        .bind(redemption.expected_version)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            // tx is rolled back on drop
            tracing::warn!(
                voucher = %record.voucher_code,
                expected_version = redemption.expected_version,
                "voucher redemption lost a concurrent update"
            );
            return Err(BookingError::ConcurrentRedemptionConflict);
        }

        let id = sqlx::query(
            "INSERT INTO voucher_redemptions (voucher_id, voucher_code, appointment_id,
                 redeemed_value, redeemed_sessions, redeemed_by, notes, redeemed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.voucher_id)
        .bind(&record.voucher_code)
        .bind(record.appointment_id)
        .bind(redeemed_value)
        .bind(redeemed_sessions)
        .bind(record.redeemed_by)
        .bind(&record.notes)
        .bind(format_timestamp(record.redeemed_at))
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        tx.commit().await?;

        Ok(VoucherRedemption {
            id,
            voucher_id: record.voucher_id,
            voucher_code: record.voucher_code.clone(),
            appointment_id: record.appointment_id,
            delta: record.delta,
            redeemed_by: record.redeemed_by,
            notes: record.notes.clone(),
            redeemed_at: record.redeemed_at,
        })
    }

    async fn list_redemptions(&self, voucher_id: i64) -> Result<Vec<VoucherRedemption>> {
        let query = format!("{} WHERE voucher_id = ? ORDER BY id ASC", REDEMPTION_SELECT);
        sqlx::query_as::<_, RedemptionRow>(&query)
            .bind(voucher_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(VoucherRedemption::try_from)
            .collect()
    }
}
