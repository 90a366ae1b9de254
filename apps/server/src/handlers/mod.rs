pub mod client;
pub mod health;
pub mod staff;
pub mod vouchers;

use axum::http::HeaderMap;

use crate::error::ApiError;

const STAFF_HEADER: &str = "x-staff-id";
const USER_HEADER: &str = "x-user-id";

fn header_id(headers: &HeaderMap, name: &str) -> Result<Option<i64>, ApiError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .map(Some)
            .ok_or(ApiError::Unauthorized("Malformed identity header")),
    }
}

/// Helper: the calling staff member, set by the gateway.
pub fn extract_staff(headers: &HeaderMap) -> Result<i64, ApiError> {
    optional_staff(headers)?.ok_or(ApiError::Unauthorized("Missing X-Staff-Id header"))
}

pub fn optional_staff(headers: &HeaderMap) -> Result<Option<i64>, ApiError> {
    header_id(headers, STAFF_HEADER)
}

/// Helper: the calling registered client, if any.
pub fn extract_user(headers: &HeaderMap) -> Result<Option<i64>, ApiError> {
    header_id(headers, USER_HEADER)
}
