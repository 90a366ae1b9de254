//! Pure voucher ledger rules: verification, redemption arithmetic, pricing.
//!
//! Nothing here touches storage. [`redeem`] returns the updated snapshot and
//! the audit record; persisting both atomically is the store's job.

use chrono::NaiveDateTime;
use rand::Rng;
use serde::Serialize;

use crate::error::{BookingError, Result};
use crate::models::{
    NewRedemption, RedemptionDelta, Voucher, VoucherOwner, VoucherQuantity, VoucherStatus,
};

/// Characters used in generated codes (no 0/O or 1/I lookalikes).
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_PREFIX: &str = "SPA";
const CODE_GROUPS: usize = 2;
const CODE_GROUP_LEN: usize = 4;

impl Voucher {
    pub fn is_past_expiry(&self, now: NaiveDateTime) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }

    /// Lazily flip an active voucher to `expired` once its expiry has passed.
    /// Returns true if the status changed.
    pub fn expire_if_due(&mut self, now: NaiveDateTime) -> bool {
        if self.status == VoucherStatus::Active && self.is_past_expiry(now) {
            self.status = VoucherStatus::Expired;
            true
        } else {
            false
        }
    }

    /// Bind a guest voucher to a registered user. One-way: a voucher already
    /// owned by a user is left untouched. Returns true if the owner changed.
    pub fn claim_for(&mut self, user_id: i64) -> bool {
        match self.owner {
            VoucherOwner::Guest { .. } => {
                self.owner = VoucherOwner::User { user_id };
                true
            }
            VoucherOwner::User { .. } => false,
        }
    }
}

/// Check that `voucher` can be used right now, optionally for a specific
/// service. Service restrictions are only enforced when a target is given.
pub fn verify(
    voucher: &Voucher,
    now: NaiveDateTime,
    target_service_id: Option<i64>,
) -> Result<&Voucher> {
    if voucher.status != VoucherStatus::Active {
        return Err(BookingError::VoucherInactive {
            code: voucher.code.clone(),
            status: voucher.status,
        });
    }
    if voucher.is_past_expiry(now) {
        return Err(BookingError::VoucherExpired(voucher.code.clone()));
    }
    if voucher.quantity.is_exhausted() {
        return Err(BookingError::VoucherExhausted(voucher.code.clone()));
    }
    if let (Some(restricted), Some(target)) = (voucher.service_id, target_service_id) {
        if restricted != target {
            return Err(BookingError::ServiceMismatch(voucher.code.clone()));
        }
    }
    Ok(voucher)
}

/// Result of [`redeem`]: the voucher as it should look afterwards, the version
/// the store must still see for the write to go through, and the audit record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Redemption {
    pub voucher: Voucher,
    pub expected_version: i64,
    pub record: NewRedemption,
}

/// Take `amount` (money for `single`, sessions for `package`) off the voucher.
pub fn redeem(
    voucher: &Voucher,
    amount: i64,
    appointment_id: Option<i64>,
    redeemed_by: Option<i64>,
    notes: Option<String>,
    now: NaiveDateTime,
) -> Result<Redemption> {
    if amount <= 0 {
        return Err(BookingError::InvalidAmount(amount));
    }

    let mut updated = voucher.clone();
    let (quantity, delta) = match voucher.quantity {
        VoucherQuantity::Money {
            original,
            remaining,
        } => {
            if amount > remaining {
                return Err(BookingError::InsufficientBalance {
                    requested: amount,
                    remaining,
                });
            }
            let left = (remaining - amount).max(0);
            (
                VoucherQuantity::Money {
                    original,
                    remaining: left,
                },
                RedemptionDelta::Value(amount),
            )
        }
        VoucherQuantity::Sessions {
            original,
            remaining,
        } => {
            if amount > remaining {
                return Err(BookingError::InsufficientSessions {
                    requested: amount,
                    remaining,
                });
            }
            let left = (remaining - amount).max(0);
            (
                VoucherQuantity::Sessions {
                    original,
                    remaining: left,
                },
                RedemptionDelta::Sessions(amount),
            )
        }
    };

    updated.quantity = quantity;
    if quantity.is_exhausted() {
        updated.status = VoucherStatus::Redeemed;
    }
    updated.version = voucher.version + 1;

    Ok(Redemption {
        expected_version: voucher.version,
        record: NewRedemption {
            voucher_id: voucher.id,
            voucher_code: voucher.code.clone(),
            appointment_id,
            delta,
            redeemed_by,
            notes,
            redeemed_at: now,
        },
        voucher: updated,
    })
}

/// Price the client still pays for a service once the voucher is applied.
pub fn effective_price(service_price: i64, voucher: &Voucher) -> i64 {
    match voucher.quantity {
        VoucherQuantity::Money { remaining, .. } => {
            let covered = remaining.max(0).min(service_price);
            (service_price - covered).max(0)
        }
        VoucherQuantity::Sessions { remaining, .. } if remaining > 0 => 0,
        VoucherQuantity::Sessions { .. } => service_price,
    }
}

/// Amount to take off `voucher` when it pays for a service of `service_price`:
/// as much cash as covers the price, or one session.
pub fn booking_charge(service_price: i64, voucher: &Voucher) -> i64 {
    match voucher.quantity {
        VoucherQuantity::Money { remaining, .. } => remaining.min(service_price),
        VoucherQuantity::Sessions { .. } => 1,
    }
}

/// Canonical form of a code as typed by a person: trimmed, upper case.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Random code like `SPA-K7QM-3XZT`. Uniqueness is checked by the caller.
pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut code = String::from(CODE_PREFIX);
    for _ in 0..CODE_GROUPS {
        code.push('-');
        for _ in 0..CODE_GROUP_LEN {
            let idx = rng.gen_range(0..CODE_ALPHABET.len());
            code.push(CODE_ALPHABET[idx] as char);
        }
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    /// Helper: build a Voucher without boilerplate.
    fn make_voucher(quantity: VoucherQuantity) -> Voucher {
        Voucher {
            id: 1,
            code: "SPA-TEST-0001".into(),
            service_id: None,
            owner: VoucherOwner::Guest {
                name: "Mira".into(),
                email: Some("mira@example.com".into()),
                phone: None,
            },
            quantity,
            status: VoucherStatus::Active,
            expires_at: None,
            created_at: now(),
            version: 0,
        }
    }

    // ── verify ──

    #[test]
    fn test_verify_ok() {
        let v = make_voucher(VoucherQuantity::money(150));
        assert_eq!(verify(&v, now(), None).unwrap().code, "SPA-TEST-0001");
    }

    #[test]
    fn test_verify_inactive() {
        let mut v = make_voucher(VoucherQuantity::money(150));
        v.status = VoucherStatus::Cancelled;
        assert!(matches!(
            verify(&v, now(), None),
            Err(BookingError::VoucherInactive {
                status: VoucherStatus::Cancelled,
                ..
            })
        ));
    }

    #[test]
    fn test_verify_expired() {
        let mut v = make_voucher(VoucherQuantity::money(150));
        v.expires_at = Some(now() - chrono::Duration::minutes(1));
        assert!(matches!(
            verify(&v, now(), None),
            Err(BookingError::VoucherExpired(_))
        ));
    }

    #[test]
    fn test_verify_expiry_at_now_still_valid() {
        let mut v = make_voucher(VoucherQuantity::money(150));
        v.expires_at = Some(now());
        assert!(verify(&v, now(), None).is_ok());
    }

    #[test]
    fn test_verify_exhausted() {
        let v = make_voucher(VoucherQuantity::Money {
            original: 100,
            remaining: 0,
        });
        assert!(matches!(
            verify(&v, now(), None),
            Err(BookingError::VoucherExhausted(_))
        ));
    }

    #[test]
    fn test_verify_service_mismatch() {
        let mut v = make_voucher(VoucherQuantity::sessions(3));
        v.service_id = Some(5);
        assert!(matches!(
            verify(&v, now(), Some(6)),
            Err(BookingError::ServiceMismatch(_))
        ));
        assert!(verify(&v, now(), Some(5)).is_ok());
        assert!(verify(&v, now(), None).is_ok());
    }

    #[test]
    fn test_unrestricted_voucher_any_service() {
        let v = make_voucher(VoucherQuantity::sessions(3));
        assert!(verify(&v, now(), Some(99)).is_ok());
    }

    // ── lazy expiry / claim ──

    #[test]
    fn test_expire_if_due() {
        let mut v = make_voucher(VoucherQuantity::money(10));
        assert!(!v.expire_if_due(now()));
        v.expires_at = Some(now() - chrono::Duration::days(1));
        assert!(v.expire_if_due(now()));
        assert_eq!(v.status, VoucherStatus::Expired);
        assert!(!v.expire_if_due(now()));
    }

    #[test]
    fn test_expire_skips_non_active() {
        let mut v = make_voucher(VoucherQuantity::money(10));
        v.status = VoucherStatus::Cancelled;
        v.expires_at = Some(now() - chrono::Duration::days(1));
        assert!(!v.expire_if_due(now()));
        assert_eq!(v.status, VoucherStatus::Cancelled);
    }

    #[test]
    fn test_claim_is_one_time() {
        let mut v = make_voucher(VoucherQuantity::money(10));
        assert!(v.claim_for(7));
        assert_eq!(v.owner, VoucherOwner::User { user_id: 7 });
        assert!(!v.claim_for(8));
        assert_eq!(v.owner, VoucherOwner::User { user_id: 7 });
    }

    // ── redeem ──

    #[test]
    fn test_redeem_full_single_balance() {
        let v = make_voucher(VoucherQuantity::money(150));
        let r = redeem(&v, 150, Some(10), Some(3), None, now()).unwrap();
        assert_eq!(r.voucher.quantity.remaining(), 0);
        assert_eq!(r.voucher.status, VoucherStatus::Redeemed);
        assert_eq!(r.record.delta, RedemptionDelta::Value(150));
        assert_eq!(r.record.appointment_id, Some(10));
        assert_eq!(r.record.voucher_code, "SPA-TEST-0001");
        assert_eq!(r.expected_version, 0);
        assert_eq!(r.voucher.version, 1);
    }

    #[test]
    fn test_redeem_partial_keeps_active() {
        let v = make_voucher(VoucherQuantity::money(150));
        let r = redeem(&v, 40, None, None, Some("manual".into()), now()).unwrap();
        assert_eq!(r.voucher.quantity.remaining(), 110);
        assert_eq!(r.voucher.quantity.original(), 150);
        assert_eq!(r.voucher.status, VoucherStatus::Active);
        assert_eq!(r.record.notes.as_deref(), Some("manual"));
    }

    #[test]
    fn test_redeem_over_balance() {
        let v = make_voucher(VoucherQuantity::money(150));
        assert!(matches!(
            redeem(&v, 151, None, None, None, now()),
            Err(BookingError::InsufficientBalance {
                requested: 151,
                remaining: 150
            })
        ));
    }

    #[test]
    fn test_redeem_non_positive() {
        let v = make_voucher(VoucherQuantity::money(150));
        assert!(matches!(
            redeem(&v, 0, None, None, None, now()),
            Err(BookingError::InvalidAmount(0))
        ));
        assert!(matches!(
            redeem(&v, -5, None, None, None, now()),
            Err(BookingError::InvalidAmount(-5))
        ));
    }

    #[test]
    fn test_redeem_last_session_then_fail() {
        let v = make_voucher(VoucherQuantity::Sessions {
            original: 5,
            remaining: 1,
        });
        let r = redeem(&v, 1, None, None, None, now()).unwrap();
        assert_eq!(r.voucher.quantity.remaining(), 0);
        assert_eq!(r.voucher.status, VoucherStatus::Redeemed);
        assert_eq!(r.record.delta, RedemptionDelta::Sessions(1));

        assert!(matches!(
            redeem(&r.voucher, 1, None, None, None, now()),
            Err(BookingError::InsufficientSessions {
                requested: 1,
                remaining: 0
            })
        ));
        assert!(matches!(
            verify(&r.voucher, now(), None),
            Err(BookingError::VoucherInactive {
                status: VoucherStatus::Redeemed,
                ..
            })
        ));
    }

    #[test]
    fn test_balance_monotonic_non_negative() {
        let mut v = make_voucher(VoucherQuantity::money(100));
        let mut last = v.quantity.remaining();
        for amount in [30, 25, 45, 10, 1] {
            match redeem(&v, amount, None, None, None, now()) {
                Ok(r) => {
                    assert!(r.voucher.quantity.remaining() <= last);
                    assert!(r.voucher.quantity.remaining() >= 0);
                    last = r.voucher.quantity.remaining();
                    v = r.voucher;
                }
                Err(e) => assert!(matches!(e, BookingError::InsufficientBalance { .. })),
            }
        }
        assert_eq!(last, 0);
    }

    #[test]
    fn test_redeem_then_verify_reflects_balance() {
        let v = make_voucher(VoucherQuantity::money(100));
        let r = redeem(&v, 60, None, None, None, now()).unwrap();
        assert_eq!(verify(&r.voucher, now(), None).unwrap().quantity.remaining(), 40);
    }

    #[test]
    fn test_exhausted_but_still_active_reports_exhausted() {
        // storage drift: balance hit zero without the status flip
        let mut v = make_voucher(VoucherQuantity::sessions(1));
        v.quantity = VoucherQuantity::Sessions {
            original: 1,
            remaining: 0,
        };
        assert!(matches!(
            verify(&v, now(), None),
            Err(BookingError::VoucherExhausted(_))
        ));
    }

    // ── effective_price / booking_charge ──

    #[test]
    fn test_effective_price_partial_cover() {
        let v = make_voucher(VoucherQuantity::money(150));
        assert_eq!(effective_price(200, &v), 50);
        assert_eq!(booking_charge(200, &v), 150);
    }

    #[test]
    fn test_effective_price_full_cover() {
        let v = make_voucher(VoucherQuantity::money(500));
        assert_eq!(effective_price(200, &v), 0);
        assert_eq!(booking_charge(200, &v), 200);
    }

    #[test]
    fn test_effective_price_package() {
        let v = make_voucher(VoucherQuantity::sessions(2));
        assert_eq!(effective_price(200, &v), 0);
        assert_eq!(booking_charge(200, &v), 1);

        let empty = make_voucher(VoucherQuantity::Sessions {
            original: 2,
            remaining: 0,
        });
        assert_eq!(effective_price(200, &empty), 200);
    }

    // ── generate_code ──

    #[test]
    fn test_code_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let code = generate_code(&mut rng);
        assert_eq!(code.len(), 13);
        assert!(code.starts_with("SPA-"));
        assert_eq!(code.matches('-').count(), 2);
        assert!(code
            .chars()
            .filter(|c| *c != '-')
            .all(|c| CODE_ALPHABET.contains(&(c as u8))));
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  spa-k7qm-3xzt\n"), "SPA-K7QM-3XZT");
        assert_eq!(normalize_code("SPA-K7QM-3XZT"), "SPA-K7QM-3XZT");
    }

    #[test]
    fn test_codes_differ() {
        let mut rng = StdRng::seed_from_u64(7);
        let a = generate_code(&mut rng);
        let b = generate_code(&mut rng);
        assert_ne!(a, b);
    }
}
