//! # View counter
//!
//! Detached, best-effort bookkeeping for detail reads. The increment runs as
//! its own task on the runtime, so it is never awaited by the reader and is
//! not cancelled when the request future is dropped.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::models::PostId;
use crate::traits::PostRepo;

#[derive(Clone)]
pub struct ViewCounter {
    repo: Arc<dyn PostRepo>,
}

impl ViewCounter {
    pub fn new(repo: Arc<dyn PostRepo>) -> Self {
        Self { repo }
    }

    /// Fires one increment for `post_id`. Failures are logged and dropped.
    ///
    /// The handle is only useful to tests; request paths discard it.
    pub fn record(&self, post_id: PostId) -> JoinHandle<()> {
        let repo = Arc::clone(&self.repo);
        tokio::spawn(async move {
            if let Err(err) = repo.increment_view_count(post_id).await {
                tracing::warn!(post_id, error = %err, "view count update failed");
            }
        })
    }
}
