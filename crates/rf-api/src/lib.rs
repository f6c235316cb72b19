//! # rf-api
//!
//! The HTTP routing layer for Rusty-Forum. Every response, success or
//! failure, uses the `{ code, msg, data }` envelope from [`error`].

pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;

use actix_web::{web, Error, HttpRequest};
use rf_core::error::AppError;

use crate::error::ApiError;

fn invalid_request(detail: String, _req: &HttpRequest) -> Error {
    tracing::debug!(%detail, "rejected request input");
    ApiError::from(AppError::InvalidInput(detail)).into()
}

/// Mounts the post routes under `/api/posts`.
///
/// Extractor failures (bad JSON, non-numeric IDs, bad query strings) are
/// folded into the invalid-parameter envelope.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/posts")
            .app_data(
                web::JsonConfig::default()
                    .error_handler(|err, req| invalid_request(err.to_string(), req)),
            )
            .app_data(
                web::PathConfig::default()
                    .error_handler(|err, req| invalid_request(err.to_string(), req)),
            )
            .app_data(
                web::QueryConfig::default()
                    .error_handler(|err, req| invalid_request(err.to_string(), req)),
            )
            .route("", web::post().to(handlers::create_post))
            // Registered before `/{id}` so "images" is never parsed as an ID.
            .route("/images", web::post().to(handlers::upload_image))
            .route("/user/{user_id}", web::get().to(handlers::list_user_posts))
            .route("/board/{board_id}", web::get().to(handlers::list_board_posts))
            .route("/{id}", web::get().to(handlers::get_post))
            .route("/{id}", web::put().to(handlers::update_post))
            .route("/{id}", web::delete().to(handlers::delete_post)),
    );
}
