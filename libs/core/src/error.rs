use thiserror::Error;

use crate::models::{AppointmentStatus, VoucherStatus};

pub type Result<T> = std::result::Result<T, BookingError>;

/// How a caller is expected to react to a [`BookingError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller bug or broken deployment. Nothing the end user can do.
    Fatal,
    /// Refresh availability / voucher state and try again.
    Recoverable,
    /// Shown to the end user as-is so they can fix their input.
    UserCorrectable,
    /// The self-service path ends here; the user has to contact staff.
    Terminal,
}

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid time label: {0:?}")]
    InvalidTimeLabel(String),

    #[error("appointment at {start} for {duration_min} min does not fit opening hours")]
    OutsideOpeningHours { start: String, duration_min: u32 },

    #[error("invalid time range: {0}")]
    InvalidRange(String),

    #[error("invalid client: {0}")]
    InvalidClient(String),

    #[error("slot is no longer available")]
    SlotNoLongerAvailable,

    #[error("appointment {0} not found")]
    AppointmentNotFound(i64),

    #[error("service {0} not found")]
    ServiceNotFound(i64),

    #[error("{0}")]
    TransitionNotPermitted(String),

    #[error("appointment can only be cancelled more than 24 hours in advance, please contact the spa")]
    CancellationWindowClosed,

    #[error("voucher {0} not found")]
    VoucherNotFound(String),

    #[error("voucher {code} is {status}")]
    VoucherInactive { code: String, status: VoucherStatus },

    #[error("voucher {0} has expired")]
    VoucherExpired(String),

    #[error("voucher {0} has no remaining balance")]
    VoucherExhausted(String),

    #[error("voucher {0} is not valid for this service")]
    ServiceMismatch(String),

    #[error("insufficient balance: requested {requested}, remaining {remaining}")]
    InsufficientBalance { requested: i64, remaining: i64 },

    #[error("insufficient sessions: requested {requested}, remaining {remaining}")]
    InsufficientSessions { requested: i64, remaining: i64 },

    #[error("redemption amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("voucher was modified concurrently, refresh and retry")]
    ConcurrentRedemptionConflict,

    #[error("voucher code {0} already exists")]
    VoucherCodeTaken(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("corrupt record: {0}")]
    CorruptRecord(String),
}

impl BookingError {
    pub fn category(&self) -> ErrorCategory {
        use BookingError::*;
        match self {
            InvalidConfiguration(_) | Storage(_) | CorruptRecord(_) => ErrorCategory::Fatal,
            SlotNoLongerAvailable | ConcurrentRedemptionConflict | VoucherCodeTaken(_) => {
                ErrorCategory::Recoverable
            }
            CancellationWindowClosed => ErrorCategory::Terminal,
            InvalidTimeLabel(_)
            | OutsideOpeningHours { .. }
            | InvalidRange(_)
            | InvalidClient(_)
            | AppointmentNotFound(_)
            | ServiceNotFound(_)
            | TransitionNotPermitted(_)
            | VoucherNotFound(_)
            | VoucherInactive { .. }
            | VoucherExpired(_)
            | VoucherExhausted(_)
            | ServiceMismatch(_)
            | InsufficientBalance { .. }
            | InsufficientSessions { .. }
            | InvalidAmount(_) => ErrorCategory::UserCorrectable,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BookingError::AppointmentNotFound(_)
                | BookingError::ServiceNotFound(_)
                | BookingError::VoucherNotFound(_)
        )
    }
}

/// Used by the store when a text column does not parse back into a domain value.
pub(crate) fn corrupt(what: impl Into<String>) -> BookingError {
    BookingError::CorruptRecord(what.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicts_are_recoverable() {
        assert_eq!(
            BookingError::SlotNoLongerAvailable.category(),
            ErrorCategory::Recoverable
        );
        assert_eq!(
            BookingError::ConcurrentRedemptionConflict.category(),
            ErrorCategory::Recoverable
        );
    }

    #[test]
    fn test_cancellation_window_is_terminal() {
        assert_eq!(
            BookingError::CancellationWindowClosed.category(),
            ErrorCategory::Terminal
        );
    }

    #[test]
    fn test_voucher_errors_are_user_facing() {
        let err = BookingError::VoucherInactive {
            code: "SPA-AAAA-BBBB".into(),
            status: VoucherStatus::Redeemed,
        };
        assert_eq!(err.category(), ErrorCategory::UserCorrectable);
        assert_eq!(err.to_string(), "voucher SPA-AAAA-BBBB is redeemed");
    }

    #[test]
    fn test_bad_grid_is_fatal() {
        let err = BookingError::InvalidConfiguration("step must be positive".into());
        assert_eq!(err.category(), ErrorCategory::Fatal);
    }

    #[test]
    fn test_not_found_detection() {
        assert!(BookingError::AppointmentNotFound(3).is_not_found());
        assert!(BookingError::VoucherNotFound("X".into()).is_not_found());
        assert!(!BookingError::SlotNoLongerAvailable.is_not_found());
    }

    #[test]
    fn test_status_transition_error_message() {
        let err = BookingError::TransitionNotPermitted(format!(
            "clients cannot move an appointment to {}",
            AppointmentStatus::Completed
        ));
        assert_eq!(
            err.to_string(),
            "clients cannot move an appointment to completed"
        );
    }
}
