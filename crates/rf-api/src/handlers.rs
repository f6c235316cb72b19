//! # rf-api Handlers
//!
//! This module coordinates the flow between HTTP requests and the core
//! `PostService`. Handlers only translate; every rule lives in the core.

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::TryStreamExt;
use rf_core::error::AppError;
use rf_core::models::{BoardId, ImageId, NewPost, PostId, PostPatch, UserId};
use rf_core::service::PostService;
use rf_core::traits::AuthProvider;
use serde::Deserialize;
use serde_json::json;

use crate::error::{success, ApiError};
use crate::extract::AuthUser;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// State shared across all Actix-web workers.
pub struct AppState {
    pub posts: PostService,
    pub auth: Box<dyn AuthProvider>,
    /// Largest accepted image upload, in bytes.
    pub upload_limit: usize,
}

type ApiResult = Result<HttpResponse, ApiError>;

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    /// `0` means "no board".
    #[serde(default)]
    pub board_id: BoardId,
    #[serde(default)]
    pub tags: Vec<String>,
    /// IDs returned by the image upload endpoint.
    #[serde(default)]
    pub image_ids: Vec<ImageId>,
}

impl CreatePostRequest {
    fn into_draft(self, author_id: UserId) -> NewPost {
        NewPost {
            author_id,
            title: self.title,
            content: self.content,
            board_id: (self.board_id != 0).then_some(self.board_id),
            tags: self.tags,
            image_ids: self.image_ids,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

impl PageQuery {
    /// Applies defaults and the page-size ceiling. Zero values are left for
    /// the core to reject.
    fn window(&self) -> (u32, u32) {
        let page = self.page.unwrap_or(1);
        let size = self.size.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
        (page, size)
    }
}

pub async fn create_post(
    data: web::Data<AppState>,
    user: AuthUser,
    body: web::Json<CreatePostRequest>,
) -> ApiResult {
    let post_id = data.posts.create_post(body.into_inner().into_draft(user.0)).await?;
    Ok(success(json!({ "post_id": post_id })))
}

pub async fn get_post(data: web::Data<AppState>, path: web::Path<PostId>) -> ApiResult {
    let detail = data.posts.get_post(path.into_inner()).await?;
    Ok(success(detail))
}

pub async fn update_post(
    data: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<PostId>,
    body: web::Json<PostPatch>,
) -> ApiResult {
    data.posts
        .update_post(path.into_inner(), user.0, body.into_inner())
        .await?;
    Ok(success(()))
}

pub async fn delete_post(
    data: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<PostId>,
) -> ApiResult {
    data.posts.delete_post(path.into_inner(), user.0).await?;
    Ok(success(()))
}

pub async fn list_user_posts(
    data: web::Data<AppState>,
    path: web::Path<UserId>,
    query: web::Query<PageQuery>,
) -> ApiResult {
    let (page, size) = query.window();
    let listing = data
        .posts
        .list_by_author(path.into_inner(), page, size)
        .await?;
    Ok(success(json!({ "posts": listing.items, "total": listing.total })))
}

pub async fn list_board_posts(
    data: web::Data<AppState>,
    path: web::Path<BoardId>,
    query: web::Query<PageQuery>,
) -> ApiResult {
    let (page, size) = query.window();
    let listing = data
        .posts
        .list_by_board(path.into_inner(), page, size)
        .await?;
    Ok(success(json!({ "posts": listing.items, "total": listing.total })))
}

/// Stages an image from the multipart field `image`.
pub async fn upload_image(
    data: web::Data<AppState>,
    user: AuthUser,
    mut payload: Multipart,
) -> ApiResult {
    let malformed = |err: actix_multipart::MultipartError| {
        tracing::debug!(error = %err, "malformed multipart body");
        ApiError::from(AppError::invalid("malformed multipart body"))
    };

    while let Some(mut field) = payload.try_next().await.map_err(malformed)? {
        let is_image = field
            .content_disposition()
            .and_then(|cd| cd.get_name())
            .is_some_and(|name| name == "image");
        if !is_image {
            continue;
        }

        let content_type = field
            .content_type()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_default();

        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(malformed)? {
            if bytes.len() + chunk.len() > data.upload_limit {
                return Err(AppError::invalid("file exceeds the upload limit").into());
            }
            bytes.extend_from_slice(&chunk);
        }

        let staged = data.posts.stage_image(user.0, bytes, &content_type).await?;
        return Ok(success(staged));
    }

    Err(AppError::invalid("missing multipart field `image`").into())
}
