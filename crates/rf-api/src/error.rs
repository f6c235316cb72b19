//! # Response envelope and error mapping
//!
//! Every body has the shape `{ "code", "msg", "data" }`. Each `AppError`
//! variant owns exactly one code, one HTTP status and one fixed message, so
//! nothing from the storage layer can leak into a response.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use rf_core::error::AppError;
use serde::Serialize;

/// Stable response codes shared with the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResCode {
    Success = 1000,
    InvalidParam = 1001,
    ServerBusy = 1005,
    NeedLogin = 1007,
    PostNotExist = 1010,
    NoPermission = 1011,
}

impl ResCode {
    pub fn msg(self) -> &'static str {
        match self {
            ResCode::Success => "success",
            ResCode::InvalidParam => "invalid request parameters",
            ResCode::ServerBusy => "server busy",
            ResCode::NeedLogin => "login required",
            ResCode::PostNotExist => "post does not exist",
            ResCode::NoPermission => "no permission",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub code: i64,
    pub msg: &'static str,
    pub data: Option<T>,
}

pub fn success<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(Envelope {
        code: ResCode::Success as i64,
        msg: ResCode::Success.msg(),
        data: Some(data),
    })
}

/// `AppError` carried to the HTTP boundary.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn code(&self) -> ResCode {
        match self.0 {
            AppError::InvalidInput(_) => ResCode::InvalidParam,
            AppError::NotFound(..) => ResCode::PostNotExist,
            AppError::PermissionDenied(_) => ResCode::NoPermission,
            AppError::Unauthenticated => ResCode::NeedLogin,
            AppError::ServerBusy => ResCode::ServerBusy,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code().msg())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self.0 {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(..) => StatusCode::NOT_FOUND,
            AppError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::ServerBusy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        tracing::debug!(error = %self.0, "request failed");
        let code = self.code();
        HttpResponse::build(self.status_code()).json(Envelope::<()> {
            code: code as i64,
            msg: code.msg(),
            data: None,
        })
    }
}
