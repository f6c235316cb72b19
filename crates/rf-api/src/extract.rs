//! Request extractors.

use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, FromRequest, HttpRequest};
use rf_core::error::AppError;
use rf_core::models::UserId;

use crate::error::ApiError;
use crate::handlers::AppState;

/// The authenticated caller, taken from `Authorization: Bearer <token>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

fn authenticate(req: &HttpRequest) -> Result<AuthUser, ApiError> {
    let Some(state) = req.app_data::<web::Data<AppState>>() else {
        tracing::error!("AppState missing from app data");
        return Err(AppError::ServerBusy.into());
    };

    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(AppError::Unauthenticated)?;

    state
        .auth
        .authenticate(token)
        .map(AuthUser)
        .ok_or_else(|| AppError::Unauthenticated.into())
}
