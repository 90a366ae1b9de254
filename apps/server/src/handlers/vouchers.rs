use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use spa_core::models::{Voucher, VoucherRedemption};
use std::sync::Arc;

use super::extract_staff;
use crate::{error::ApiError, models::*, AppState};

#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    pub voucher: Voucher,
    pub redemption: VoucherRedemption,
}

/// POST /api/staff/vouchers: issue a new voucher under a generated code.
pub async fn issue_voucher(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<IssueVoucherRequest>,
) -> Result<Json<ApiResponse<Voucher>>, ApiError> {
    let staff_id = extract_staff(&headers)?;
    let voucher = state
        .booking
        .ledger()
        .issue(&body.into_new_voucher(), state.now())
        .await?;
    tracing::info!(voucher = %voucher.code, staff_id, "voucher issued by staff");
    Ok(Json(ApiResponse::success(voucher)))
}

/// POST /api/staff/vouchers/{code}/redeem: manual redemption at the desk.
pub async fn redeem_voucher(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(code): Path<String>,
    Json(body): Json<RedeemRequest>,
) -> Result<Json<ApiResponse<RedeemResponse>>, ApiError> {
    let staff_id = extract_staff(&headers)?;
    let (voucher, redemption) = state
        .booking
        .ledger()
        .redeem_code(
            &code,
            body.amount,
            body.appointment_id,
            Some(staff_id),
            body.notes,
            state.now(),
        )
        .await?;
    Ok(Json(ApiResponse::success(RedeemResponse {
        voucher,
        redemption,
    })))
}

/// POST /api/staff/vouchers/{code}/cancel
pub async fn cancel_voucher(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Result<Json<ApiResponse<Voucher>>, ApiError> {
    let staff_id = extract_staff(&headers)?;
    let voucher = state.booking.ledger().cancel(&code, staff_id).await?;
    Ok(Json(ApiResponse::success(voucher)))
}

/// GET /api/staff/vouchers/{code}/redemptions
pub async fn redemption_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Result<Json<ApiResponse<Vec<VoucherRedemption>>>, ApiError> {
    extract_staff(&headers)?;
    let history = state.booking.ledger().history(&code).await?;
    Ok(Json(ApiResponse::success(history)))
}
