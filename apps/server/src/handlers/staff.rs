use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use spa_core::models::{Appointment, BlockedRange, NewBlockedRange};
use spa_core::Actor;
use std::sync::Arc;

use super::extract_staff;
use crate::{error::ApiError, models::*, AppState};

/// PUT /api/staff/appointments/{id}/status: any transition, including
/// reopening a cancelled appointment.
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<StatusUpdateRequest>,
) -> Result<Json<ApiResponse<Appointment>>, ApiError> {
    let staff_id = extract_staff(&headers)?;
    let appointment = state
        .booking
        .change_status(id, body.status, &Actor::Staff { staff_id }, state.now())
        .await?;
    Ok(Json(ApiResponse::success(appointment)))
}

/// DELETE /api/staff/appointments/{id}
pub async fn delete_appointment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<DeletedResponse>>, ApiError> {
    let staff_id = extract_staff(&headers)?;
    state.booking.delete_appointment(id, staff_id).await?;
    Ok(Json(ApiResponse::success(DeletedResponse { id, deleted: true })))
}

/// POST /api/staff/blocks: take a therapist out of service for a range.
pub async fn create_block(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBlockRequest>,
) -> Result<Json<ApiResponse<BlockedRange>>, ApiError> {
    let staff_id = extract_staff(&headers)?;
    let blocked = state
        .booking
        .block_time(NewBlockedRange {
            therapist_id: body.therapist_id,
            date: body.date,
            start_time: body.start_time,
            end_time: body.end_time,
            reason: body.reason,
            created_by: staff_id,
        })
        .await?;
    Ok(Json(ApiResponse::success(blocked)))
}

/// DELETE /api/staff/blocks/{id}
pub async fn delete_block(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<DeletedResponse>>, ApiError> {
    extract_staff(&headers)?;
    if !state.booking.unblock(id).await? {
        return Err(ApiError::NotFound(format!("blocked range {} not found", id)));
    }
    Ok(Json(ApiResponse::success(DeletedResponse { id, deleted: true })))
}
