use super::common::{message_response, success_response, PaginationParams};
use crate::{
    auth::RequestContext,
    entities::{PaymentMethod, ShippingAddress},
    errors::ServiceError,
    handlers::AppState,
    services::commerce::customer_service::{UpdateProfileInput, UpdateUserInput},
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, put},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodRequest {
    #[serde(rename = "type")]
    pub method: PaymentMethod,
}

/// Routes for the signed-in user's own account
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_profile).put(update_profile))
        .route("/address", put(update_address))
        .route("/payment-method", put(update_payment_method))
}

/// Admin user management routes
pub fn admin_user_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
}

async fn get_profile(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ServiceError> {
    let user = state.services.customer.get_profile(&ctx).await?;
    Ok(success_response(user))
}

async fn update_profile(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<UpdateProfileInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let user = state.services.customer.update_profile(&ctx, payload).await?;
    Ok(message_response(user, "User updated successfully"))
}

async fn update_address(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<ShippingAddress>,
) -> Result<impl IntoResponse, ServiceError> {
    let user = state.services.customer.update_address(&ctx, payload).await?;
    Ok(message_response(user, "User updated successfully"))
}

async fn update_payment_method(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<PaymentMethodRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let user = state
        .services
        .customer
        .update_payment_method(&ctx, payload.method)
        .await?;
    Ok(message_response(user, "User updated successfully"))
}

async fn list_users(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    ctx.require_admin()?;
    let users = state
        .services
        .customer
        .list_users(params.page, params.query)
        .await?;
    Ok(success_response(users))
}

async fn get_user(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    ctx.require_admin()?;
    let user = state.services.customer.get_user(id).await?;
    Ok(success_response(user))
}

async fn update_user(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserInput>,
) -> Result<impl IntoResponse, ServiceError> {
    ctx.require_admin()?;
    let user = state.services.customer.update_user(id, payload).await?;
    Ok(message_response(user, "User updated successfully"))
}

async fn delete_user(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    ctx.require_admin()?;
    state.services.customer.delete_user(id).await?;
    Ok(message_response(id, "User deleted successfully"))
}
