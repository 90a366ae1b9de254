use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use spa_core::models::{Appointment, ClientRef};
use spa_core::{BookingConfirmation, BookingRequest};
use std::sync::Arc;

use super::{extract_user, optional_staff};
use crate::{error::ApiError, models::*, AppState};

/// GET /api/availability: free start times for one therapist and day.
pub async fn availability(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<ApiResponse<AvailabilityResponse>>, ApiError> {
    let slots = state
        .booking
        .available_slots(query.therapist_id, query.date, query.service_id)
        .await?;

    Ok(Json(ApiResponse::success(AvailabilityResponse {
        therapist_id: query.therapist_id,
        date: query.date,
        slots,
    })))
}

/// POST /api/bookings: create an appointment, optionally paid with a voucher.
///
/// Clients book for themselves (or as a guest) in the default status; staff
/// (with `X-Staff-Id`) may book for anyone and pick the initial status.
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<BookingRequest>,
) -> Result<Json<ApiResponse<BookingConfirmation>>, ApiError> {
    if optional_staff(&headers)?.is_none() {
        if request.status.is_some() {
            return Err(ApiError::Forbidden("Only staff can set the booking status"));
        }
        if let ClientRef::User { user_id } = request.client {
            if extract_user(&headers)? != Some(user_id) {
                return Err(ApiError::Forbidden("Cannot book on behalf of another user"));
            }
        }
    }

    let confirmation = state.booking.book(request, state.now()).await?;
    Ok(Json(ApiResponse::success(confirmation)))
}

/// POST /api/bookings/{id}/cancel: client self-cancellation. Registered
/// clients send `X-User-Id`, guests send their booking phone in the body.
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<CancelBookingRequest>,
) -> Result<Json<ApiResponse<Appointment>>, ApiError> {
    let user_id = extract_user(&headers)?;
    let appointment = state
        .booking
        .cancel_by_client(id, user_id, body.phone, state.now())
        .await?;
    Ok(Json(ApiResponse::success(appointment)))
}

/// POST /api/vouchers/verify: check a code, binding a guest voucher to the
/// calling user. With a service the response also carries the price to pay.
pub async fn verify_voucher(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<VerifyVoucherRequest>,
) -> Result<Json<ApiResponse<VerifyVoucherResponse>>, ApiError> {
    let user_id = extract_user(&headers)?;
    let ledger = state.booking.ledger();

    let response = match body.service_id {
        Some(service_id) => {
            let quote = ledger
                .quote(&body.code, service_id, state.now(), user_id)
                .await?;
            VerifyVoucherResponse {
                voucher: quote.voucher,
                price: Some(quote.price),
                effective_price: Some(quote.effective_price),
            }
        }
        None => VerifyVoucherResponse {
            voucher: ledger
                .verify_code(&body.code, state.now(), None, user_id)
                .await?,
            price: None,
            effective_price: None,
        },
    };
    Ok(Json(ApiResponse::success(response)))
}
