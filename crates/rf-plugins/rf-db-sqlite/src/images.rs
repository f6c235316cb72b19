//! # Image association
//!
//! Claims staged images for a post. A claim is all-or-nothing: either every
//! requested image is owned by the requester, active and unattached, or
//! nothing is written.

use chrono::Utc;
use rf_core::error::{AppError, Result};
use rf_core::models::{
    check_image_count, ImageId, ImageStatus, PostId, StagedImage, UserId, UNATTACHED,
};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::error::OrBusy;

/// Binds `image_ids` to `post_id`, in request order.
///
/// The candidate count and the writes share the caller's transaction. Each
/// write is additionally conditional on the image still being staged, so a
/// claim that lost the image between the count and the write fails too.
pub(crate) async fn attach(
    conn: &mut SqliteConnection,
    post_id: PostId,
    requester: UserId,
    image_ids: &[ImageId],
) -> Result<()> {
    if image_ids.is_empty() {
        return Ok(());
    }
    // Bounds the IN list below SQLite's bound-parameter limit.
    check_image_count(image_ids)?;

    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM post_images WHERE user_id = ");
    qb.push_bind(requester)
        .push(" AND status = ")
        .push_bind(ImageStatus::Active.as_db())
        .push(" AND post_id = ")
        .push_bind(UNATTACHED)
        .push(" AND id IN (");
    let mut ids = qb.separated(", ");
    for id in image_ids {
        ids.push_bind(*id);
    }
    ids.push_unseparated(")");

    let available: i64 = qb
        .build_query_scalar()
        .fetch_one(&mut *conn)
        .await
        .or_busy("find_staged_images", Some(post_id))?;

    // Also rejects duplicates: distinct rows can never match a repeated ID.
    if available != image_ids.len() as i64 {
        tracing::info!(
            post_id,
            requester,
            requested = image_ids.len(),
            available,
            "image claim rejected"
        );
        return Err(AppError::invalid(
            "one or more images are missing, not yours, inactive or already attached",
        ));
    }

    for (position, image_id) in image_ids.iter().enumerate() {
        let claimed = sqlx::query(
            "UPDATE post_images SET post_id = ?, sort_order = ? \
             WHERE id = ? AND user_id = ? AND status = ? AND post_id = ?",
        )
        .bind(post_id)
        .bind(position as i64)
        .bind(*image_id)
        .bind(requester)
        .bind(ImageStatus::Active.as_db())
        .bind(UNATTACHED)
        .execute(&mut *conn)
        .await
        .or_busy("attach_image", Some(*image_id))?
        .rows_affected();

        if claimed != 1 {
            tracing::info!(post_id, image_id, "image claimed concurrently");
            return Err(AppError::invalid(format!("image {image_id} is no longer available")));
        }
    }
    Ok(())
}

/// Unbinds every image of the post. Rows are kept and become staged again.
///
/// Ownership is not re-checked here; only the images attached afterwards are.
pub(crate) async fn detach_all(conn: &mut SqliteConnection, post_id: PostId) -> Result<u64> {
    let result = sqlx::query("UPDATE post_images SET post_id = ?, sort_order = 0 WHERE post_id = ?")
        .bind(UNATTACHED)
        .bind(post_id)
        .execute(&mut *conn)
        .await
        .or_busy("detach_images", Some(post_id))?;
    Ok(result.rows_affected())
}

/// Wholesale replacement used by updates: detach everything, then attach.
pub(crate) async fn replace(
    conn: &mut SqliteConnection,
    post_id: PostId,
    requester: UserId,
    image_ids: &[ImageId],
) -> Result<()> {
    let detached = detach_all(conn, post_id).await?;
    tracing::debug!(post_id, detached, "previous images detached");
    attach(conn, post_id, requester, image_ids).await
}

/// Active image URLs of a post in display order.
pub(crate) async fn urls_for_post(conn: &mut SqliteConnection, post_id: PostId) -> Result<Vec<String>> {
    sqlx::query_scalar(
        "SELECT image_url FROM post_images \
         WHERE post_id = ? AND status = ? ORDER BY sort_order, id",
    )
    .bind(post_id)
    .bind(ImageStatus::Active.as_db())
    .fetch_all(&mut *conn)
    .await
    .or_busy("load_post_images", Some(post_id))
}

/// Records a fresh upload as a staged image.
pub(crate) async fn stage(
    conn: &mut SqliteConnection,
    uploader: UserId,
    image_url: &str,
) -> Result<StagedImage> {
    let result = sqlx::query(
        "INSERT INTO post_images (user_id, image_url, status, post_id, sort_order, created_at) \
         VALUES (?, ?, ?, ?, 0, ?)",
    )
    .bind(uploader)
    .bind(image_url)
    .bind(ImageStatus::Active.as_db())
    .bind(UNATTACHED)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .or_busy("stage_image", None)?;

    Ok(StagedImage {
        image_id: result.last_insert_rowid(),
        image_url: image_url.to_string(),
    })
}
