use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{LoginRequest, RegisterRequest, UserWithToken},
        errors::AuthError,
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

#[instrument(skip(state, body))]
pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserWithToken>), AuthError> {
    let Json(payload) = body?;
    let (user, token) = state.credentials.register(payload).await?;
    Ok((StatusCode::CREATED, Json(UserWithToken::new(user, token))))
}

#[instrument(skip(state, body))]
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<UserWithToken>, AuthError> {
    let Json(payload) = body?;
    let (user, token) = state.credentials.login(payload).await?;
    Ok(Json(UserWithToken::new(user, token)))
}
