use super::common::{message_response, success_response};
use crate::{auth::RequestContext, errors::ServiceError, handlers::AppState};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    /// Provider order id returned by PayPal's checkout
    pub provider_reference: String,
}

#[derive(Debug, Deserialize)]
pub struct StripeSuccessParams {
    pub payment_intent: String,
}

/// Payment routes nested under `/orders`
pub fn order_payment_routes() -> Router<AppState> {
    Router::new()
        .route("/:id/pay", post(initiate_payment))
        .route("/:id/capture", post(confirm_payment))
        .route("/:id/stripe/success", get(stripe_success))
}

/// Admin fulfillment routes nested under `/admin/orders`
pub fn admin_fulfillment_routes() -> Router<AppState> {
    Router::new()
        .route("/:id/paid", post(mark_paid_cod))
        .route("/:id/delivered", post(mark_delivered))
}

pub async fn initiate_payment(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let intent = state.services.payments.initiate_payment(&ctx, id).await?;
    Ok(success_response(intent))
}

pub async fn confirm_payment(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<CaptureRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .payments
        .confirm_payment(&ctx, id, &payload.provider_reference)
        .await?;
    Ok(message_response(order, "Your order has been paid"))
}

pub async fn stripe_success(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Query(params): Query<StripeSuccessParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let landing = state
        .services
        .payments
        .stripe_success_landing(&ctx, id, &params.payment_intent)
        .await?;
    Ok(success_response(landing))
}

pub async fn mark_paid_cod(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.payments.mark_paid_cod(&ctx, id).await?;
    Ok(message_response(order, "Order marked as paid"))
}

pub async fn mark_delivered(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.payments.mark_delivered(&ctx, id).await?;
    Ok(message_response(order, "Order has been marked delivered"))
}
