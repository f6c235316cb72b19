//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    BoardId, ListedPost, NewPost, Page, Paginated, PostDetail, PostId, PostPatch, StagedImage,
    UserId,
};

/// Post persistence contract. Every mutating method is one atomic unit:
/// callers observe either the whole change or none of it.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PostRepo: Send + Sync {
    // Authoring
    async fn create_post(&self, draft: NewPost) -> Result<PostId>;
    async fn update_post(&self, id: PostId, requester: UserId, patch: PostPatch) -> Result<()>;
    async fn soft_delete_post(&self, id: PostId, requester: UserId) -> Result<()>;

    // Reads
    async fn get_post(&self, id: PostId) -> Result<PostDetail>;
    async fn list_by_author(&self, author: UserId, page: Page) -> Result<Paginated<ListedPost>>;
    async fn list_by_board(&self, board: BoardId, page: Page) -> Result<Paginated<ListedPost>>;

    /// Storage-side `view_count = view_count + 1`.
    async fn increment_view_count(&self, id: PostId) -> Result<()>;

    /// Records an uploaded image as staged (unattached) for `uploader`.
    async fn stage_image(&self, uploader: UserId, image_url: &str) -> Result<StagedImage>;
}

/// Media storage contract for handling uploads.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Saves raw bytes and returns the public URL of the stored file.
    /// Oversized or non-image payloads fail with `InvalidInput`.
    async fn save_upload(&self, data: Vec<u8>, content_type: &str) -> Result<String>;
}

/// Identity contract: turns a bearer credential into a user.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait AuthProvider: Send + Sync {
    /// Returns the authenticated user, or `None` for a bad credential.
    fn authenticate(&self, token: &str) -> Option<UserId>;

    /// Mints a credential for `user`.
    fn issue_token(&self, user: UserId) -> String;
}
