use super::common::{message_response, success_response, PaginationParams};
use crate::{auth::RequestContext, errors::ServiceError, handlers::AppState, ApiResponse};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use uuid::Uuid;

/// Customer order routes
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order).get(get_my_orders))
        .route("/:id", get(get_order))
}

/// Admin order routes
pub fn admin_order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/summary", get(orders_summary))
        .route("/:id", delete(delete_order))
}

/// Place an order from the caller's cart.
///
/// Checkout failures carry `redirectTo` pointing at the step to fix.
pub async fn create_order(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ServiceError> {
    let placed = state.services.orders.create_order(&ctx).await?;
    let redirect_to = placed.redirect_to.clone();

    Ok((
        StatusCode::CREATED,
        Json(
            ApiResponse::success(placed)
                .with_message("Order created successfully")
                .with_redirect(redirect_to),
        ),
    ))
}

pub async fn get_order(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.get_order(&ctx, id).await?;
    Ok(success_response(order))
}

pub async fn get_my_orders(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let orders = state
        .services
        .orders
        .get_my_orders(&ctx, params.page, params.limit)
        .await?;
    Ok(success_response(orders))
}

pub async fn list_orders(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    ctx.require_admin()?;
    let orders = state
        .services
        .orders
        .list_orders(params.page, params.limit, params.query)
        .await?;
    Ok(success_response(orders))
}

pub async fn orders_summary(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ServiceError> {
    ctx.require_admin()?;
    let summary = state.services.orders.orders_summary().await?;
    Ok(success_response(summary))
}

pub async fn delete_order(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    ctx.require_admin()?;
    state.services.orders.delete_order(id).await?;
    Ok(message_response(id, "Order deleted successfully"))
}
