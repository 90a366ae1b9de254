//! Spa scheduling core: slot grid, availability, voucher ledger and
//! appointment lifecycle, plus the SQLite store and notifiers they run on.

pub mod availability;
pub mod booking;
pub mod db;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod models;
pub mod notify;
pub mod slots;
pub mod store;
pub mod voucher;

pub use booking::{BookingConfirmation, BookingRequest, BookingService};
pub use error::{BookingError, ErrorCategory, Result};
pub use ledger::{VoucherLedger, VoucherQuote};
pub use lifecycle::Actor;
pub use slots::{OpeningHours, SlotGrid, TimeSlot};
pub use store::BookingStore;
