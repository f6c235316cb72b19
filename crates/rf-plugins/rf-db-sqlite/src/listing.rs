//! # Listings
//!
//! Read-only paginated queries. `total` always comes from its own COUNT so
//! it does not depend on the requested window.

use rf_core::error::Result;
use rf_core::models::{
    AuthorCard, BoardId, ListedPost, Page, Paginated, Post, PostStatus, UserId,
};
use sqlx::{Row, SqliteConnection};

use crate::error::OrBusy;
use crate::posts::{post_from_row, POST_COLUMNS};
use crate::tags;

pub(crate) async fn by_author(
    conn: &mut SqliteConnection,
    author: UserId,
    page: Page,
) -> Result<Paginated<ListedPost>> {
    let total: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE author_id = ? AND status != ?")
            .bind(author)
            .bind(PostStatus::Deleted.as_db())
            .fetch_one(&mut *conn)
            .await
            .or_busy("count_author_posts", Some(author))?;

    let sql = format!(
        "SELECT {POST_COLUMNS} FROM posts p \
         WHERE p.author_id = ? AND p.status != ? \
         ORDER BY p.id DESC LIMIT ? OFFSET ?"
    );
    let posts: Vec<Post> = sqlx::query(&sql)
        .bind(author)
        .bind(PostStatus::Deleted.as_db())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&mut *conn)
        .await
        .or_busy("list_author_posts", Some(author))?
        .iter()
        .map(post_from_row)
        .collect();

    let entries = posts.into_iter().map(|post| (post, None)).collect();
    with_tags(conn, entries, total, page).await
}

/// Board listing with the author's display fields joined in.
pub(crate) async fn by_board(
    conn: &mut SqliteConnection,
    board: BoardId,
    page: Page,
) -> Result<Paginated<ListedPost>> {
    let total: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE board_id = ? AND status != ?")
            .bind(board)
            .bind(PostStatus::Deleted.as_db())
            .fetch_one(&mut *conn)
            .await
            .or_busy("count_board_posts", Some(board))?;

    let sql = format!(
        "SELECT {POST_COLUMNS}, u.username AS author_username, u.avatar_url AS author_avatar_url \
         FROM posts p LEFT JOIN users u ON u.id = p.author_id \
         WHERE p.board_id = ? AND p.status != ? \
         ORDER BY p.id DESC LIMIT ? OFFSET ?"
    );
    let rows = sqlx::query(&sql)
        .bind(board)
        .bind(PostStatus::Deleted.as_db())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&mut *conn)
        .await
        .or_busy("list_board_posts", Some(board))?;

    let entries = rows
        .iter()
        .map(|row| {
            let author = AuthorCard {
                username: row.get("author_username"),
                avatar_url: row.get("author_avatar_url"),
            };
            (post_from_row(row), Some(author))
        })
        .collect();
    with_tags(conn, entries, total, page).await
}

async fn with_tags(
    conn: &mut SqliteConnection,
    entries: Vec<(Post, Option<AuthorCard>)>,
    total: i64,
    page: Page,
) -> Result<Paginated<ListedPost>> {
    let ids: Vec<_> = entries.iter().map(|(post, _)| post.id).collect();
    let mut tags_by_post = tags::for_posts(conn, &ids).await?;

    let items = entries
        .into_iter()
        .map(|(post, author)| ListedPost {
            tags: tags_by_post.remove(&post.id).unwrap_or_default(),
            post,
            author,
        })
        .collect();

    Ok(Paginated {
        items,
        total,
        page: page.page,
        size: page.size,
    })
}
