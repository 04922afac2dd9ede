use crate::handlers::common::{created_response, message_response, success_response};
use crate::{
    auth::RequestContext,
    errors::ServiceError,
    services::commerce::product_catalog_service::{ProductInput, ProductSearchQuery},
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use uuid::Uuid;

/// Storefront product routes
pub fn products_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(search_products))
        .route("/latest", get(latest_products))
        .route("/featured", get(featured_products))
        .route("/categories", get(categories))
        .route("/slug/:slug", get(get_product_by_slug))
        .route("/:id", get(get_product))
}

/// Admin product management routes
pub fn admin_products_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_product))
        .route("/:id", put(update_product).delete(delete_product))
}

/// Search with `q`, `category`, `price=min-max`, `rating`, `sort`, `page`, `limit`.
async fn search_products(
    State(state): State<AppState>,
    Query(query): Query<ProductSearchQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = state.services.product_catalog.search_products(query).await?;
    Ok(success_response(page))
}

async fn latest_products(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    let products = state.services.product_catalog.get_latest_products().await?;
    Ok(success_response(products))
}

async fn featured_products(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    let products = state.services.product_catalog.get_featured_products().await?;
    Ok(success_response(products))
}

async fn categories(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    let categories = state.services.product_catalog.get_all_categories().await?;
    Ok(success_response(categories))
}

async fn get_product_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state
        .services
        .product_catalog
        .get_product_by_slug(&slug)
        .await?;
    Ok(success_response(product))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.product_catalog.get_product_by_id(id).await?;
    Ok(success_response(product))
}

async fn create_product(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<ProductInput>,
) -> Result<impl IntoResponse, ServiceError> {
    ctx.require_admin()?;
    let product = state.services.product_catalog.create_product(payload).await?;
    Ok(created_response(product, "Product created successfully"))
}

async fn update_product(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProductInput>,
) -> Result<impl IntoResponse, ServiceError> {
    ctx.require_admin()?;
    let product = state
        .services
        .product_catalog
        .update_product(id, payload)
        .await?;
    Ok(message_response(product, "Product updated successfully"))
}

async fn delete_product(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    ctx.require_admin()?;
    state.services.product_catalog.delete_product(id).await?;
    Ok(message_response(id, "Product deleted successfully"))
}
