//! Error kinds surfaced by register/login and their HTTP mapping.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use super::repo::StoreError;
use super::repo_types::UniqueField;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("{}", conflict_message(.0))]
    Conflict(UniqueField),

    /// Unknown email and wrong password share this variant and its message.
    #[error("Incorrect email or password")]
    InvalidCredentials,

    #[error("Account is inactive")]
    AccountInactive,

    #[error("Service temporarily unavailable")]
    StoreUnavailable(#[source] StoreError),

    #[error("Internal server error")]
    Internal(#[source] anyhow::Error),
}

fn conflict_message(field: &UniqueField) -> &'static str {
    match field {
        UniqueField::Email => "Email already registered",
        UniqueField::Username => "Username already taken",
    }
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) | AuthError::Conflict(_) => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::AccountInactive => StatusCode::FORBIDDEN,
            AuthError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(field) => AuthError::Conflict(field),
            other => AuthError::StoreUnavailable(other),
        }
    }
}

/// Bodies that fail to parse or deserialize are input errors like any other.
impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        AuthError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        // Display never includes the source, so store/hash details stay in the logs.
        (self.status_code(), Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
