//! # AppError
//!
//! Centralized error handling for the Rusty-Forum authoring engine.
//! Every failure a caller can observe maps to exactly one variant here.

use thiserror::Error;

/// The primary error type for all rf-core operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Malformed or missing fields, or an image set that failed
    /// ownership/availability validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Referenced resource is absent (or soft-deleted, for posts).
    #[error("{0} not found with ID {1}")]
    NotFound(&'static str, i64),

    /// Requester is not allowed to touch the resource (e.g. not the author).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No authenticated identity was attached to the request.
    #[error("authentication required")]
    Unauthenticated,

    /// Any storage or transaction failure. Details are logged where they
    /// happen and never carried in this variant.
    #[error("server busy")]
    ServerBusy,
}

impl AppError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        AppError::InvalidInput(msg.into())
    }

    pub fn post_not_found(id: i64) -> Self {
        AppError::NotFound("post", id)
    }
}

/// A specialized Result type for Rusty-Forum logic.
pub type Result<T> = std::result::Result<T, AppError>;
