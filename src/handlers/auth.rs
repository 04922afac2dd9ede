use crate::{
    auth::RequestContext,
    errors::{Navigation, ServiceError},
    handlers::AppState,
    services::commerce::customer_service::{SignInInput, SignUpInput},
};
use axum::{extract::State, routing::post, Json, Router};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/sign-up", post(sign_up))
        .route("/sign-in", post(sign_in))
        .route("/sign-out", post(sign_out))
}

/// Register and sign in; answers with a redirect carrying the auth cookie.
pub async fn sign_up(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<SignUpInput>,
) -> Result<Navigation, ServiceError> {
    state.services.customer.sign_up(&ctx, payload).await
}

pub async fn sign_in(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<SignInInput>,
) -> Result<Navigation, ServiceError> {
    state.services.customer.sign_in(&ctx, payload).await
}

pub async fn sign_out(State(state): State<AppState>) -> Navigation {
    state.services.customer.sign_out()
}
