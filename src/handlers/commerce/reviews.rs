use crate::handlers::common::{message_response, success_response};
use crate::{
    auth::RequestContext,
    errors::ServiceError,
    services::commerce::review_service::ReviewInput,
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use uuid::Uuid;

/// Review routes nested under `/products`
pub fn reviews_routes() -> Router<AppState> {
    Router::new()
        .route("/:id/reviews", get(product_reviews).post(submit_review))
        .route("/:id/reviews/mine", get(my_review))
}

async fn product_reviews(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let reviews = state.services.reviews.get_product_reviews(product_id).await?;
    Ok(success_response(reviews))
}

async fn my_review(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let review = state
        .services
        .reviews
        .get_user_review(&ctx, product_id)
        .await?;
    Ok(success_response(review))
}

/// Create or replace the caller's review. The product id in the path wins over
/// the body.
async fn submit_review(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(product_id): Path<Uuid>,
    Json(mut payload): Json<ReviewInput>,
) -> Result<impl IntoResponse, ServiceError> {
    payload.product_id = product_id;
    let review = state
        .services
        .reviews
        .create_or_update_review(&ctx, payload)
        .await?;
    Ok(message_response(review, "Review updated successfully"))
}
