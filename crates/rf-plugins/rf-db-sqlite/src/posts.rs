//! # Post store
//!
//! Row-level lifecycle of a post: insert, live lookup, authorship check,
//! partial update and soft delete. Every function runs on the connection it
//! is handed, so callers decide the transaction scope.

use chrono::Utc;
use rf_core::error::{AppError, Result};
use rf_core::models::{NewPost, Post, PostId, PostPatch, PostStatus, UserId};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use crate::error::OrBusy;

/// Column list shared by every query that maps into [`Post`].
pub(crate) const POST_COLUMNS: &str = "p.id, p.title, p.content, p.board_id, p.author_id, \
     p.view_count, p.like_count, p.favorite_count, p.comment_count, \
     p.status, p.created_at, p.updated_at";

pub(crate) fn post_from_row(row: &SqliteRow) -> Post {
    Post {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        board_id: row.get("board_id"),
        author_id: row.get("author_id"),
        view_count: row.get("view_count"),
        like_count: row.get("like_count"),
        favorite_count: row.get("favorite_count"),
        comment_count: row.get("comment_count"),
        status: PostStatus::from_db(row.get("status")),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Inserts the base row with zeroed counters and ACTIVE status.
pub(crate) async fn insert(conn: &mut SqliteConnection, draft: &NewPost) -> Result<PostId> {
    draft.validate()?;

    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO posts (title, content, board_id, author_id, status, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(draft.title.as_str())
    .bind(draft.content.as_str())
    .bind(draft.board_id)
    .bind(draft.author_id)
    .bind(PostStatus::Active.as_db())
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await
    .or_busy("insert_post", None)?;

    Ok(result.last_insert_rowid())
}

/// Loads a post that is not soft-deleted.
pub(crate) async fn fetch_live(conn: &mut SqliteConnection, id: PostId) -> Result<Post> {
    let sql = format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.id = ? AND p.status != ?");
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(PostStatus::Deleted.as_db())
        .fetch_optional(&mut *conn)
        .await
        .or_busy("fetch_post", Some(id))?;

    row.as_ref()
        .map(post_from_row)
        .ok_or_else(|| AppError::post_not_found(id))
}

/// Loads a live post and checks that `requester` wrote it.
pub(crate) async fn authorize(
    conn: &mut SqliteConnection,
    id: PostId,
    requester: UserId,
) -> Result<Post> {
    let post = fetch_live(conn, id).await?;
    if post.author_id != requester {
        tracing::info!(post_id = id, requester, "mutation by non-author refused");
        return Err(AppError::PermissionDenied(format!(
            "only the author may modify post {id}"
        )));
    }
    Ok(post)
}

/// Writes the `Set` fields of `patch` and refreshes `updated_at`.
pub(crate) async fn apply_patch(
    conn: &mut SqliteConnection,
    id: PostId,
    patch: &PostPatch,
) -> Result<()> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE posts SET updated_at = ");
    qb.push_bind(Utc::now());
    if let Some(title) = patch.title.as_set() {
        qb.push(", title = ").push_bind(title.clone());
    }
    if let Some(content) = patch.content.as_set() {
        qb.push(", content = ").push_bind(content.clone());
    }
    if let Some(board_id) = patch.board_id.as_set() {
        qb.push(", board_id = ").push_bind(*board_id);
    }
    qb.push(" WHERE id = ").push_bind(id);

    qb.build()
        .execute(&mut *conn)
        .await
        .or_busy("update_post", Some(id))?;
    Ok(())
}

pub(crate) async fn mark_deleted(conn: &mut SqliteConnection, id: PostId) -> Result<()> {
    sqlx::query("UPDATE posts SET status = ?, updated_at = ? WHERE id = ?")
        .bind(PostStatus::Deleted.as_db())
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await
        .or_busy("soft_delete_post", Some(id))?;
    Ok(())
}

/// Atomic `view_count + 1` evaluated by the engine, not read-modify-write.
pub(crate) async fn increment_views(conn: &mut SqliteConnection, id: PostId) -> Result<()> {
    let result =
        sqlx::query("UPDATE posts SET view_count = view_count + 1 WHERE id = ? AND status != ?")
            .bind(id)
            .bind(PostStatus::Deleted.as_db())
            .execute(&mut *conn)
            .await
            .or_busy("increment_view_count", Some(id))?;

    if result.rows_affected() == 0 {
        return Err(AppError::post_not_found(id));
    }
    Ok(())
}
