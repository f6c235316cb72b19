//! Collapsing storage failures into the public taxonomy.

use rf_core::error::{AppError, Result};

/// Logs a sqlx failure with its operation and entity, then hides it behind
/// `ServerBusy`. Engine-specific text never leaves this crate.
pub(crate) trait OrBusy<T> {
    fn or_busy(self, operation: &'static str, entity_id: Option<i64>) -> Result<T>;
}

impl<T> OrBusy<T> for std::result::Result<T, sqlx::Error> {
    fn or_busy(self, operation: &'static str, entity_id: Option<i64>) -> Result<T> {
        self.map_err(|err| {
            tracing::error!(operation, entity_id = ?entity_id, error = %err, "storage failure");
            AppError::ServerBusy
        })
    }
}
