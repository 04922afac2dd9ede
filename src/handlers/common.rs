use crate::ApiResponse;
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

/// Success response with a message for the shopper (toast text)
pub fn message_response<T: Serialize>(data: T, message: impl Into<String>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(ApiResponse::success(data).with_message(message)),
    )
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T, message: impl Into<String>) -> impl IntoResponse {
    (
        StatusCode::CREATED,
        Json(ApiResponse::success(data).with_message(message)),
    )
}

/// Pagination and name filter shared by list endpoints
#[derive(Debug, Default, Deserialize)]
pub struct PaginationParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub query: Option<String>,
}
