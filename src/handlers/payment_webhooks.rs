use crate::{errors::ServiceError, handlers::AppState};
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use tracing::info;

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

// POST /api/v1/payments/stripe/webhook
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = state
        .services
        .payments
        .handle_stripe_webhook(&body, signature)
        .await?;

    info!(outcome = ?outcome, "Stripe webhook processed");
    Ok(Json(json!({ "received": true, "outcome": outcome })))
}
