//! # PostService
//!
//! The engine's front door. Request adapters call these methods with an
//! already-authenticated user; storage and media collaborators are injected.

use std::sync::Arc;

use crate::counter::ViewCounter;
use crate::error::{AppError, Result};
use crate::models::{
    BoardId, ListedPost, NewPost, Page, Paginated, PostDetail, PostId, PostPatch, StagedImage,
    UserId,
};
use crate::traits::{MediaStore, PostRepo};

#[derive(Clone)]
pub struct PostService {
    repo: Arc<dyn PostRepo>,
    media: Arc<dyn MediaStore>,
    views: ViewCounter,
}

impl PostService {
    pub fn new(repo: Arc<dyn PostRepo>, media: Arc<dyn MediaStore>) -> Self {
        let views = ViewCounter::new(Arc::clone(&repo));
        Self { repo, media, views }
    }

    pub async fn create_post(&self, draft: NewPost) -> Result<PostId> {
        draft.validate()?;
        let author = draft.author_id;
        let id = self.repo.create_post(draft).await?;
        tracing::info!(post_id = id, author_id = author, "post created");
        Ok(id)
    }

    /// Reads a post and schedules its view increment once the payload is built.
    pub async fn get_post(&self, id: PostId) -> Result<PostDetail> {
        let detail = self.repo.get_post(id).await?;
        let _ = self.views.record(id);
        Ok(detail)
    }

    pub async fn update_post(&self, id: PostId, requester: UserId, patch: PostPatch) -> Result<()> {
        self.repo.update_post(id, requester, patch.normalized()).await?;
        tracing::info!(post_id = id, requester, "post updated");
        Ok(())
    }

    pub async fn delete_post(&self, id: PostId, requester: UserId) -> Result<()> {
        self.repo.soft_delete_post(id, requester).await?;
        tracing::info!(post_id = id, requester, "post soft-deleted");
        Ok(())
    }

    pub async fn list_by_author(
        &self,
        author: UserId,
        page: u32,
        size: u32,
    ) -> Result<Paginated<ListedPost>> {
        self.repo.list_by_author(author, Page::new(page, size)?).await
    }

    pub async fn list_by_board(
        &self,
        board: BoardId,
        page: u32,
        size: u32,
    ) -> Result<Paginated<ListedPost>> {
        self.repo.list_by_board(board, Page::new(page, size)?).await
    }

    /// Stores the blob, then records it as a staged image owned by `uploader`.
    pub async fn stage_image(
        &self,
        uploader: UserId,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<StagedImage> {
        if data.is_empty() {
            return Err(AppError::invalid("empty upload"));
        }
        let url = self.media.save_upload(data, content_type).await?;
        self.repo.stage_image(uploader, &url).await
    }
}
