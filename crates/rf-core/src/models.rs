//! # Domain Models
//!
//! These structs represent the core entities of Rusty-Forum.
//! Identifiers are storage-generated 64-bit integers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AppError, Result};

pub type PostId = i64;
pub type UserId = i64;
pub type BoardId = i64;
pub type TagId = i64;
pub type ImageId = i64;

/// Post reference value of an image that is staged but not attached.
pub const UNATTACHED: PostId = 0;

/// Lifecycle flag of a post. Posts are never hard-deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Active,
    Deleted,
}

impl PostStatus {
    pub fn as_db(self) -> i32 {
        match self {
            PostStatus::Active => 1,
            PostStatus::Deleted => -1,
        }
    }

    pub fn from_db(raw: i32) -> Self {
        if raw == -1 {
            PostStatus::Deleted
        } else {
            PostStatus::Active
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    Active,
    Retired,
}

impl ImageStatus {
    pub fn as_db(self) -> i32 {
        match self {
            ImageStatus::Active => 1,
            ImageStatus::Retired => 0,
        }
    }

    pub fn from_db(raw: i32) -> Self {
        if raw == 1 {
            ImageStatus::Active
        } else {
            ImageStatus::Retired
        }
    }
}

/// The fundamental unit of authored content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub content: String,
    pub board_id: Option<BoardId>,
    /// Set once at creation, never reassigned.
    pub author_id: UserId,
    pub view_count: i64,
    pub like_count: i64,
    pub favorite_count: i64,
    pub comment_count: i64,
    pub status: PostStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
}

/// An uploaded image. `post_id == UNATTACHED` means staged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostImage {
    pub id: ImageId,
    pub uploader_id: UserId,
    pub image_url: String,
    pub status: ImageStatus,
    pub post_id: PostId,
    pub sort_order: i32,
}

impl PostImage {
    pub fn is_staged(&self) -> bool {
        self.post_id == UNATTACHED
    }
}

/// Detail view returned by a read: the row plus its associations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: Post,
    /// Ordered by tag name.
    pub tags: Vec<Tag>,
    /// Active images in display order.
    pub image_urls: Vec<String>,
}

/// Author display fields joined into board listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorCard {
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

/// One entry of a listing page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListedPost {
    #[serde(flatten)]
    pub post: Post,
    pub tags: Vec<Tag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorCard>,
}

/// Result of staging an upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagedImage {
    pub image_id: ImageId,
    pub image_url: String,
}

/// Everything needed to author a new post in one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewPost {
    pub author_id: UserId,
    pub title: String,
    pub content: String,
    pub board_id: Option<BoardId>,
    pub tags: Vec<String>,
    pub image_ids: Vec<ImageId>,
}

impl NewPost {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(AppError::invalid("title must not be empty"));
        }
        if self.content.trim().is_empty() {
            return Err(AppError::invalid("content must not be empty"));
        }
        check_image_count(&self.image_ids)
    }
}

/// Most images one post may carry.
pub const MAX_IMAGES_PER_POST: usize = 64;

pub fn check_image_count(image_ids: &[ImageId]) -> Result<()> {
    if image_ids.len() > MAX_IMAGES_PER_POST {
        return Err(AppError::invalid(format!(
            "a post takes at most {MAX_IMAGES_PER_POST} images"
        )));
    }
    Ok(())
}

/// A single optional field of an update.
///
/// `Cleared` is what an explicit `null`, blank text or `[]` becomes. The
/// engine treats it exactly like `Absent`: nothing is blanked by accident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    Absent,
    Cleared,
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Absent
    }
}

impl<T> Patch<T> {
    /// The value to write, if this field actually changes anything.
    pub fn as_set(&self) -> Option<&T> {
        match self {
            Patch::Set(v) => Some(v),
            Patch::Absent | Patch::Cleared => None,
        }
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Patch::Set(_))
    }
}

impl Patch<String> {
    /// Whitespace-only text counts as blank, matching `NewPost::validate`.
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim().is_empty() {
            Patch::Cleared
        } else {
            Patch::Set(value)
        }
    }

    fn normalized(self) -> Self {
        match self {
            Patch::Set(v) => Patch::text(v),
            other => other,
        }
    }
}

impl<T> Patch<Vec<T>> {
    pub fn list(values: Vec<T>) -> Self {
        if values.is_empty() {
            Patch::Cleared
        } else {
            Patch::Set(values)
        }
    }

    fn normalized(self) -> Self {
        match self {
            Patch::Set(v) => Patch::list(v),
            other => other,
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(v) => Patch::Set(v),
            None => Patch::Cleared,
        })
    }
}

/// Partial update of a post. Only `Set` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PostPatch {
    #[serde(default)]
    pub title: Patch<String>,
    #[serde(default)]
    pub content: Patch<String>,
    /// `0` is the wire encoding of "no board" and is never written.
    #[serde(default)]
    pub board_id: Patch<BoardId>,
    /// Full replacement of the tag set when `Set`.
    #[serde(default)]
    pub tags: Patch<Vec<String>>,
    /// Full replacement of the image attachments when `Set`.
    #[serde(default)]
    pub image_ids: Patch<Vec<ImageId>>,
}

impl PostPatch {
    /// Folds empty strings, empty lists and a zero board into `Cleared`.
    pub fn normalized(self) -> Self {
        let board_id = match self.board_id {
            Patch::Set(0) => Patch::Cleared,
            other => other,
        };
        PostPatch {
            title: self.title.normalized(),
            content: self.content.normalized(),
            board_id,
            tags: self.tags.normalized(),
            image_ids: self.image_ids.normalized(),
        }
    }

    pub fn touches_row(&self) -> bool {
        self.title.is_set() || self.content.is_set() || self.board_id.is_set()
    }
}

/// A validated pagination window. Page numbers are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub size: u32,
}

impl Page {
    pub fn new(page: u32, size: u32) -> Result<Self> {
        if page == 0 {
            return Err(AppError::invalid("page must be at least 1"));
        }
        if size == 0 {
            return Err(AppError::invalid("page size must be at least 1"));
        }
        Ok(Self { page, size })
    }

    pub fn offset(&self) -> i64 {
        (u64::from(self.page - 1) * u64::from(self.size)) as i64
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.size)
    }
}

/// A page of results with a total computed independently of the window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub size: u32,
}
