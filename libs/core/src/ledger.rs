//! Voucher ledger service: verification, redemption and issuance on top of a
//! [`BookingStore`].

use chrono::NaiveDateTime;
use serde::Serialize;
use std::sync::Arc;

use crate::error::{BookingError, Result};
use crate::models::{NewVoucher, Voucher, VoucherOwner, VoucherRedemption, VoucherStatus};
use crate::notify::{dispatch, Notification, Notifier};
use crate::store::BookingStore;
use crate::voucher;

/// Attempts at finding an unused voucher code before giving up.
const MAX_CODE_ATTEMPTS: usize = 8;

/// A verified voucher priced against a service.
#[derive(Debug, Clone, Serialize)]
pub struct VoucherQuote {
    pub voucher: Voucher,
    pub price: i64,
    pub effective_price: i64,
}

#[derive(Clone)]
pub struct VoucherLedger {
    store: Arc<dyn BookingStore>,
    notifier: Arc<dyn Notifier>,
}

impl VoucherLedger {
    pub fn new(store: Arc<dyn BookingStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    async fn find(&self, code: &str) -> Result<Voucher> {
        self.store
            .get_voucher_by_code(&voucher::normalize_code(code))
            .await
    }

    /// Fetch by code. An active voucher found past its expiry is persisted as
    /// `expired` and reported as `VoucherExpired`.
    async fn load(&self, code: &str, now: NaiveDateTime) -> Result<Voucher> {
        let mut voucher = self.find(code).await?;
        if voucher.expire_if_due(now) {
            tracing::warn!(voucher = %voucher.code, "voucher expired, marking as such");
            self.store
                .set_voucher_status(voucher.id, VoucherStatus::Expired)
                .await?;
            return Err(BookingError::VoucherExpired(voucher.code));
        }
        Ok(voucher)
    }

    /// Check a code presented by a client or staff member.
    ///
    /// When a registered user presents a guest-purchased voucher it becomes
    /// theirs; this happens once and is never undone.
    pub async fn verify_code(
        &self,
        code: &str,
        now: NaiveDateTime,
        service_id: Option<i64>,
        presenter_user_id: Option<i64>,
    ) -> Result<Voucher> {
        let mut voucher = self.load(code, now).await?;
        voucher::verify(&voucher, now, service_id)?;

        if let (Some(user_id), VoucherOwner::Guest { .. }) = (presenter_user_id, &voucher.owner) {
            if self.store.assign_voucher_owner(voucher.id, user_id).await? {
                voucher.claim_for(user_id);
                tracing::info!(voucher = %voucher.code, user_id, "guest voucher bound to user");
            }
        }
        Ok(voucher)
    }

    /// Verify `code` for `service_id` and work out what the client still pays.
    pub async fn quote(
        &self,
        code: &str,
        service_id: i64,
        now: NaiveDateTime,
        presenter_user_id: Option<i64>,
    ) -> Result<VoucherQuote> {
        let service = self
            .store
            .get_service(service_id)
            .await?
            .filter(|s| s.is_active)
            .ok_or(BookingError::ServiceNotFound(service_id))?;
        let voucher = self
            .verify_code(code, now, Some(service_id), presenter_user_id)
            .await?;
        Ok(VoucherQuote {
            effective_price: voucher::effective_price(service.price, &voucher),
            price: service.price,
            voucher,
        })
    }

    /// Apply an already-verified voucher snapshot. The store rejects the write
    /// if the voucher changed since `voucher` was read.
    pub(crate) async fn apply(
        &self,
        voucher: &Voucher,
        amount: i64,
        appointment_id: Option<i64>,
        redeemed_by: Option<i64>,
        notes: Option<String>,
        now: NaiveDateTime,
    ) -> Result<(Voucher, VoucherRedemption)> {
        let redemption =
            voucher::redeem(voucher, amount, appointment_id, redeemed_by, notes, now)?;
        let record = self.store.apply_voucher_redemption(&redemption).await?;

        tracing::info!(
            voucher = %record.voucher_code,
            delta = record.delta.amount(),
            remaining = redemption.voucher.quantity.remaining(),
            status = %redemption.voucher.status,
            "voucher redeemed"
        );
        dispatch(
            self.notifier.clone(),
            Notification::VoucherRedeemed(record.clone()),
        );
        Ok((redemption.voucher, record))
    }

    /// Redeem `amount` (money or sessions, per voucher type) from `code`.
    pub async fn redeem_code(
        &self,
        code: &str,
        amount: i64,
        appointment_id: Option<i64>,
        redeemed_by: Option<i64>,
        notes: Option<String>,
        now: NaiveDateTime,
    ) -> Result<(Voucher, VoucherRedemption)> {
        let voucher = self.load(code, now).await?;
        voucher::verify(&voucher, now, None)?;
        self.apply(&voucher, amount, appointment_id, redeemed_by, notes, now)
            .await
    }

    /// Create a new active voucher under a freshly generated code.
    pub async fn issue(&self, new: &NewVoucher, now: NaiveDateTime) -> Result<Voucher> {
        let original = new.quantity.original();
        if original <= 0 {
            return Err(BookingError::InvalidAmount(original));
        }
        if new.quantity.remaining() != original {
            return Err(BookingError::InvalidAmount(new.quantity.remaining()));
        }

        let mut last_code = String::new();
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = voucher::generate_code(&mut rand::thread_rng());
            if self.store.voucher_code_exists(&code).await? {
                last_code = code;
                continue;
            }
            match self.store.insert_voucher(&code, new, now).await {
                Ok(voucher) => {
                    tracing::info!(
                        voucher = %voucher.code,
                        kind = voucher.quantity.type_name(),
                        amount = original,
                        "voucher issued"
                    );
                    return Ok(voucher);
                }
                Err(BookingError::VoucherCodeTaken(taken)) => last_code = taken,
                Err(e) => return Err(e),
            }
        }
        tracing::error!("could not find a free voucher code in {} attempts", MAX_CODE_ATTEMPTS);
        Err(BookingError::VoucherCodeTaken(last_code))
    }

    /// Staff cancellation. Remaining balance is kept on record but unusable.
    pub async fn cancel(&self, code: &str, staff_id: i64) -> Result<Voucher> {
        let mut voucher = self.find(code).await?;
        if voucher.status == VoucherStatus::Cancelled {
            return Ok(voucher);
        }
        self.store
            .set_voucher_status(voucher.id, VoucherStatus::Cancelled)
            .await?;
        tracing::info!(voucher = %voucher.code, staff_id, "voucher cancelled");
        voucher.status = VoucherStatus::Cancelled;
        voucher.version += 1;
        Ok(voucher)
    }

    pub async fn history(&self, code: &str) -> Result<Vec<VoucherRedemption>> {
        let voucher = self.find(code).await?;
        self.store.list_redemptions(voucher.id).await
    }
}
