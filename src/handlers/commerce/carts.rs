use crate::handlers::common::{message_response, success_response};
use crate::{auth::RequestContext, errors::ServiceError, AppState};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

/// Creates the router for cart endpoints
pub fn carts_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/items", post(add_to_cart))
        .route("/items/:product_id", delete(remove_from_cart))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: Uuid,
}

/// The caller's cart; `data` is null when nothing has been added yet.
async fn get_cart(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.cart.get_cart(&ctx).await?;
    Ok(success_response(cart))
}

/// Add one unit of a product
async fn add_to_cart(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<AddItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .services
        .cart
        .add_item(&ctx, payload.product_id)
        .await?;
    Ok(message_response(outcome.cart, outcome.message))
}

/// Remove one unit of a product
async fn remove_from_cart(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .services
        .cart
        .remove_item(&ctx, product_id)
        .await?;
    Ok(message_response(outcome.cart, outcome.message))
}
