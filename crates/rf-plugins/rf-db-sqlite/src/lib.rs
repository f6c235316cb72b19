//! # rf-db-sqlite Implementation
//!
//! This crate implements the `PostRepo` port on SQLite. Authoring calls run
//! the post store, tag resolver and image association steps inside one
//! [`tx::UnitOfWork`]. Listings read COUNT and page from one snapshot; single
//! reads use a plain pooled connection.

mod error;
mod images;
mod listing;
mod posts;
mod tags;
mod tx;

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use rf_core::error::Result;
use rf_core::models::{
    BoardId, ListedPost, NewPost, Page, Paginated, PostDetail, PostId, PostPatch, StagedImage,
    UserId,
};
use rf_core::traits::PostRepo;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

use crate::error::OrBusy;
use crate::tx::UnitOfWork;

/// How long a unit of work waits for the write lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `url` and runs migrations.
    ///
    /// In-memory URLs are pinned to a single, never-recycled connection so
    /// the whole store sees one database.
    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let in_memory = url.contains(":memory:");

        let mut options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);
        if !in_memory {
            // Readers keep going while a unit of work holds the write lock.
            options = options
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { max_connections.max(1) })
            .idle_timeout(if in_memory { None } else { Some(Duration::from_secs(600)) })
            .max_lifetime(if in_memory { None } else { Some(Duration::from_secs(1800)) })
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Wraps an existing pool. Migrations are applied before returning.
    pub async fn from_pool(pool: SqlitePool) -> anyhow::Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("sqlite schema ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn acquire(&self, operation: &'static str) -> Result<PoolConnection<Sqlite>> {
        self.pool.acquire().await.or_busy(operation, None)
    }
}

async fn create_in(conn: &mut SqliteConnection, draft: &NewPost) -> Result<PostId> {
    let id = posts::insert(conn, draft).await?;

    if !draft.tags.is_empty() {
        let tag_ids = tags::resolve(conn, &draft.tags).await?;
        tags::replace_for_post(conn, id, &tag_ids).await?;
    }
    images::attach(conn, id, draft.author_id, &draft.image_ids).await?;

    Ok(id)
}

async fn update_in(
    conn: &mut SqliteConnection,
    id: PostId,
    requester: UserId,
    patch: &PostPatch,
) -> Result<()> {
    posts::authorize(conn, id, requester).await?;
    posts::apply_patch(conn, id, patch).await?;

    if let Some(names) = patch.tags.as_set() {
        let tag_ids = tags::resolve(conn, names).await?;
        tags::replace_for_post(conn, id, &tag_ids).await?;
    }
    if let Some(image_ids) = patch.image_ids.as_set() {
        images::replace(conn, id, requester, image_ids).await?;
    }
    Ok(())
}

async fn soft_delete_in(conn: &mut SqliteConnection, id: PostId, requester: UserId) -> Result<()> {
    posts::authorize(conn, id, requester).await?;
    posts::mark_deleted(conn, id).await
}

#[async_trait]
impl PostRepo for SqliteStore {
    async fn create_post(&self, draft: NewPost) -> Result<PostId> {
        let mut uow = UnitOfWork::begin(&self.pool, "create_post", None).await?;
        let outcome = create_in(uow.conn(), &draft).await;
        uow.finish(outcome).await
    }

    async fn update_post(&self, id: PostId, requester: UserId, patch: PostPatch) -> Result<()> {
        // Blank text and empty lists mean "unchanged", never "clear".
        let patch = patch.normalized();
        let mut uow = UnitOfWork::begin(&self.pool, "update_post", Some(id)).await?;
        let outcome = update_in(uow.conn(), id, requester, &patch).await;
        uow.finish(outcome).await
    }

    async fn soft_delete_post(&self, id: PostId, requester: UserId) -> Result<()> {
        let mut uow = UnitOfWork::begin(&self.pool, "soft_delete_post", Some(id)).await?;
        let outcome = soft_delete_in(uow.conn(), id, requester).await;
        uow.finish(outcome).await
    }

    async fn get_post(&self, id: PostId) -> Result<PostDetail> {
        let mut conn = self.acquire("get_post").await?;
        let post = posts::fetch_live(&mut conn, id).await?;
        let tags = tags::for_post(&mut conn, id).await?;
        let image_urls = images::urls_for_post(&mut conn, id).await?;

        Ok(PostDetail {
            post,
            tags,
            image_urls,
        })
    }

    async fn list_by_author(&self, author: UserId, page: Page) -> Result<Paginated<ListedPost>> {
        let mut uow = UnitOfWork::begin_read(&self.pool, "list_by_author", Some(author)).await?;
        let outcome = listing::by_author(uow.conn(), author, page).await;
        uow.finish(outcome).await
    }

    async fn list_by_board(&self, board: BoardId, page: Page) -> Result<Paginated<ListedPost>> {
        let mut uow = UnitOfWork::begin_read(&self.pool, "list_by_board", Some(board)).await?;
        let outcome = listing::by_board(uow.conn(), board, page).await;
        uow.finish(outcome).await
    }

    async fn increment_view_count(&self, id: PostId) -> Result<()> {
        let mut conn = self.acquire("increment_view_count").await?;
        posts::increment_views(&mut conn, id).await
    }

    async fn stage_image(&self, uploader: UserId, image_url: &str) -> Result<StagedImage> {
        let mut conn = self.acquire("stage_image").await?;
        images::stage(&mut conn, uploader, image_url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rf_core::error::AppError;
    use rf_core::models::Patch;
    use rf_core::ViewCounter;
    use sqlx::Row;
    use std::sync::Arc;

    async fn store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:", 1)
            .await
            .expect("in-memory store")
    }

    /// A WAL file database with a real pool, for tests that need several
    /// connections writing at once.
    async fn file_store(dir: &tempfile::TempDir) -> Arc<SqliteStore> {
        let url = format!("sqlite://{}", dir.path().join("forum.db").display());
        Arc::new(SqliteStore::connect(&url, 8).await.expect("file store"))
    }

    fn draft(author: UserId, title: &str) -> NewPost {
        NewPost {
            author_id: author,
            title: title.to_string(),
            content: format!("{title} body"),
            ..Default::default()
        }
    }

    async fn stage(repo: &SqliteStore, uploader: UserId, name: &str) -> i64 {
        repo.stage_image(uploader, &format!("/static/uploads/{name}.png"))
            .await
            .unwrap()
            .image_id
    }

    async fn image_binding(repo: &SqliteStore, image_id: i64) -> (i64, i64) {
        let row = sqlx::query("SELECT post_id, sort_order FROM post_images WHERE id = ?")
            .bind(image_id)
            .fetch_one(repo.pool())
            .await
            .unwrap();
        (row.get("post_id"), row.get("sort_order"))
    }

    async fn count(repo: &SqliteStore, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(repo.pool())
            .await
            .unwrap()
    }

    fn tag_names(detail: &PostDetail) -> Vec<&str> {
        detail.tags.iter().map(|t| t.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_create_and_get_post() {
        let repo = store().await;
        let first = stage(&repo, 5, "a").await;
        let second = stage(&repo, 5, "b").await;

        let id = repo
            .create_post(NewPost {
                board_id: Some(2),
                tags: vec!["rust".into(), "async".into(), "rust".into()],
                image_ids: vec![second, first],
                ..draft(5, "Hello")
            })
            .await
            .expect("create");

        let detail = repo.get_post(id).await.unwrap();
        assert_eq!(detail.post.title, "Hello");
        assert_eq!(detail.post.content, "Hello body");
        assert_eq!(detail.post.board_id, Some(2));
        assert_eq!(detail.post.author_id, 5);
        assert_eq!(detail.post.view_count, 0);
        assert_eq!(tag_names(&detail), vec!["async", "rust"]);
        assert_eq!(
            detail.image_urls,
            vec!["/static/uploads/b.png", "/static/uploads/a.png"]
        );
        assert_eq!(image_binding(&repo, second).await, (id, 0));
        assert_eq!(image_binding(&repo, first).await, (id, 1));
    }

    #[tokio::test]
    async fn test_create_rejects_empty_title() {
        let repo = store().await;
        let err = repo.create_post(draft(1, "")).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(count(&repo, "posts").await, 0);
    }

    #[tokio::test]
    async fn test_claiming_an_attached_image_rolls_back_everything() {
        let repo = store().await;
        let a = stage(&repo, 5, "a").await;
        let b = stage(&repo, 5, "b").await;
        let c = stage(&repo, 5, "c").await;

        let owner = repo
            .create_post(NewPost {
                image_ids: vec![b],
                ..draft(5, "first")
            })
            .await
            .unwrap();
        assert_eq!(image_binding(&repo, b).await.0, owner);

        let err = repo
            .create_post(NewPost {
                tags: vec!["fresh".into()],
                image_ids: vec![a, b, c],
                ..draft(5, "second")
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(image_binding(&repo, a).await, (0, 0));
        assert_eq!(image_binding(&repo, c).await, (0, 0));
        assert_eq!(image_binding(&repo, b).await.0, owner);
        // Neither the post nor its tag survived the abort.
        assert_eq!(count(&repo, "posts").await, 1);
        assert_eq!(count(&repo, "tags").await, 0);
        assert_eq!(count(&repo, "post_tags").await, 0);
    }

    #[tokio::test]
    async fn test_cannot_claim_someone_elses_image() {
        let repo = store().await;
        let foreign = stage(&repo, 8, "x").await;

        let err = repo
            .create_post(NewPost {
                image_ids: vec![foreign],
                ..draft(5, "mine")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(image_binding(&repo, foreign).await, (0, 0));
    }

    #[tokio::test]
    async fn test_duplicate_and_retired_images_are_rejected() {
        let repo = store().await;
        let live = stage(&repo, 5, "live").await;
        let retired = stage(&repo, 5, "old").await;
        sqlx::query("UPDATE post_images SET status = 0 WHERE id = ?")
            .bind(retired)
            .execute(repo.pool())
            .await
            .unwrap();

        let dup = repo
            .create_post(NewPost {
                image_ids: vec![live, live],
                ..draft(5, "dup")
            })
            .await;
        assert!(matches!(dup, Err(AppError::InvalidInput(_))));

        let gone = repo
            .create_post(NewPost {
                image_ids: vec![retired],
                ..draft(5, "retired")
            })
            .await;
        assert!(matches!(gone, Err(AppError::InvalidInput(_))));
        assert_eq!(count(&repo, "posts").await, 0);
    }

    #[tokio::test]
    async fn test_update_leaves_absent_fields_alone() {
        let repo = store().await;
        let id = repo
            .create_post(NewPost {
                board_id: Some(4),
                tags: vec!["keep".into()],
                ..draft(9, "Original")
            })
            .await
            .unwrap();

        let patch = PostPatch {
            content: Patch::Set("edited".into()),
            title: Patch::Cleared,
            tags: Patch::Cleared,
            ..Default::default()
        };
        repo.update_post(id, 9, patch).await.unwrap();

        let detail = repo.get_post(id).await.unwrap();
        assert_eq!(detail.post.title, "Original");
        assert_eq!(detail.post.content, "edited");
        assert_eq!(detail.post.board_id, Some(4));
        assert_eq!(tag_names(&detail), vec!["keep"]);
        assert!(detail.post.updated_at >= detail.post.created_at);
    }

    #[tokio::test]
    async fn test_update_replaces_tag_set() {
        let repo = store().await;
        let id = repo
            .create_post(NewPost {
                tags: vec!["a".into(), "b".into()],
                ..draft(9, "tags")
            })
            .await
            .unwrap();

        let patch = PostPatch {
            tags: Patch::Set(vec!["b".into(), "c".into()]),
            ..Default::default()
        };
        repo.update_post(id, 9, patch).await.unwrap();
        assert_eq!(tag_names(&repo.get_post(id).await.unwrap()), vec!["b", "c"]);

        // A raw empty list reaching the store is still not a "clear all".
        let patch = PostPatch {
            tags: Patch::Set(vec![]),
            ..Default::default()
        };
        repo.update_post(id, 9, patch).await.unwrap();
        assert_eq!(tag_names(&repo.get_post(id).await.unwrap()), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_tags_are_shared_and_case_sensitive() {
        let repo = store().await;
        let one = repo
            .create_post(NewPost {
                tags: vec!["Rust".into()],
                ..draft(1, "one")
            })
            .await
            .unwrap();
        let two = repo
            .create_post(NewPost {
                tags: vec!["Rust".into(), "rust".into()],
                ..draft(2, "two")
            })
            .await
            .unwrap();

        let one = repo.get_post(one).await.unwrap();
        let two = repo.get_post(two).await.unwrap();
        assert_eq!(two.tags.len(), 2);
        assert!(two.tags.contains(&one.tags[0]));
        assert_eq!(count(&repo, "tags").await, 2);
    }

    #[tokio::test]
    async fn test_empty_tag_name_is_invalid() {
        let repo = store().await;
        let err = repo
            .create_post(NewPost {
                tags: vec!["ok".into(), String::new()],
                ..draft(1, "bad tag")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(count(&repo, "posts").await, 0);
    }

    #[tokio::test]
    async fn test_update_replaces_images_wholesale() {
        let repo = store().await;
        let a = stage(&repo, 5, "a").await;
        let b = stage(&repo, 5, "b").await;
        let c = stage(&repo, 5, "c").await;
        let id = repo
            .create_post(NewPost {
                image_ids: vec![a, b],
                ..draft(5, "gallery")
            })
            .await
            .unwrap();

        let patch = PostPatch {
            image_ids: Patch::Set(vec![c, a]),
            ..Default::default()
        };
        repo.update_post(id, 5, patch).await.unwrap();

        assert_eq!(image_binding(&repo, c).await, (id, 0));
        assert_eq!(image_binding(&repo, a).await, (id, 1));
        // Detached, not deleted.
        assert_eq!(image_binding(&repo, b).await, (0, 0));
        assert_eq!(count(&repo, "post_images").await, 3);
        assert_eq!(
            repo.get_post(id).await.unwrap().image_urls,
            vec!["/static/uploads/c.png", "/static/uploads/a.png"]
        );
    }

    #[tokio::test]
    async fn test_failed_image_replacement_keeps_old_attachments() {
        let repo = store().await;
        let a = stage(&repo, 5, "a").await;
        let foreign = stage(&repo, 6, "f").await;
        let id = repo
            .create_post(NewPost {
                image_ids: vec![a],
                ..draft(5, "post")
            })
            .await
            .unwrap();

        let patch = PostPatch {
            title: Patch::Set("renamed".into()),
            image_ids: Patch::Set(vec![foreign]),
            ..Default::default()
        };
        let err = repo.update_post(id, 5, patch).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let detail = repo.get_post(id).await.unwrap();
        assert_eq!(detail.post.title, "post");
        assert_eq!(image_binding(&repo, a).await, (id, 0));
    }

    #[tokio::test]
    async fn test_update_by_non_author_is_denied() {
        let repo = store().await;
        let id = repo.create_post(draft(9, "mine")).await.unwrap();
        let before = repo.get_post(id).await.unwrap();

        let patch = PostPatch {
            title: Patch::Set("hijacked".into()),
            tags: Patch::Set(vec!["spam".into()]),
            ..Default::default()
        };
        let err = repo.update_post(id, 3, patch).await.unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied(_)));

        let after = repo.get_post(id).await.unwrap();
        assert_eq!(before, after);
        assert_eq!(count(&repo, "tags").await, 0);

        let err = repo.soft_delete_post(id, 3).await.unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_soft_delete_hides_post_everywhere() {
        let repo = store().await;
        let keep = repo.create_post(draft(7, "keep")).await.unwrap();
        let gone = repo.create_post(draft(7, "gone")).await.unwrap();

        repo.soft_delete_post(gone, 7).await.unwrap();

        assert_eq!(repo.get_post(gone).await, Err(AppError::NotFound("post", gone)));
        let listed = repo.list_by_author(7, Page::new(1, 10).unwrap()).await.unwrap();
        assert_eq!(listed.total, 1);
        assert_eq!(listed.items[0].post.id, keep);

        // No resurrection and no further mutation.
        let patch = PostPatch {
            title: Patch::Set("back".into()),
            ..Default::default()
        };
        assert_eq!(
            repo.update_post(gone, 7, patch).await,
            Err(AppError::NotFound("post", gone))
        );
        assert_eq!(
            repo.soft_delete_post(gone, 7).await,
            Err(AppError::NotFound("post", gone))
        );
        assert_eq!(count(&repo, "posts").await, 2);
    }

    #[tokio::test]
    async fn test_missing_post_is_not_found() {
        let repo = store().await;
        assert_eq!(repo.get_post(404).await, Err(AppError::NotFound("post", 404)));
        assert_eq!(
            repo.increment_view_count(404).await,
            Err(AppError::NotFound("post", 404))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_views_are_all_counted() {
        let repo = Arc::new(store().await);
        let id = repo.create_post(draft(1, "popular")).await.unwrap();
        let counter = ViewCounter::new(repo.clone());

        let readers: Vec<_> = (0..25)
            .map(|_| {
                let repo = Arc::clone(&repo);
                let counter = counter.clone();
                tokio::spawn(async move {
                    repo.get_post(id).await.unwrap();
                    counter.record(id)
                })
            })
            .collect();

        for reader in readers {
            reader.await.unwrap().await.unwrap();
        }

        let detail = repo.get_post(id).await.unwrap();
        assert_eq!(detail.post.view_count, 25);
    }

    #[tokio::test]
    async fn test_board_listing_paginates_with_independent_total() {
        let repo = store().await;
        sqlx::query("INSERT INTO users (id, username, avatar_url) VALUES (?, ?, ?)")
            .bind(5_i64)
            .bind("alice")
            .bind("/avatars/alice.png")
            .execute(repo.pool())
            .await
            .unwrap();

        for n in 0..25 {
            repo.create_post(NewPost {
                board_id: Some(3),
                tags: vec![format!("t{}", n % 2)],
                ..draft(5, &format!("post {n}"))
            })
            .await
            .unwrap();
        }
        repo.create_post(NewPost {
            board_id: Some(4),
            ..draft(5, "elsewhere")
        })
        .await
        .unwrap();

        let page = repo.list_by_board(3, Page::new(2, 10).unwrap()).await.unwrap();
        assert_eq!(page.items.len(), 10);
        assert_eq!(page.total, 25);
        assert_eq!((page.page, page.size), (2, 10));
        // Newest first: page 2 starts at the 11th newest.
        assert_eq!(page.items[0].post.title, "post 14");
        let author = page.items[0].author.as_ref().unwrap();
        assert_eq!(author.username.as_deref(), Some("alice"));
        assert_eq!(author.avatar_url.as_deref(), Some("/avatars/alice.png"));
        assert_eq!(page.items[0].tags.len(), 1);

        let last = repo.list_by_board(3, Page::new(3, 10).unwrap()).await.unwrap();
        assert_eq!(last.items.len(), 5);
        assert_eq!(last.total, 25);

        let beyond = repo.list_by_board(3, Page::new(9, 10).unwrap()).await.unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total, 25);
    }

    #[tokio::test]
    async fn test_author_listing_skips_unknown_author_fields() {
        let repo = store().await;
        repo.create_post(draft(12, "solo")).await.unwrap();
        repo.create_post(draft(13, "other")).await.unwrap();

        let listed = repo.list_by_author(12, Page::new(1, 5).unwrap()).await.unwrap();
        assert_eq!(listed.total, 1);
        assert_eq!(listed.items[0].post.title, "solo");
        assert!(listed.items[0].author.is_none());
    }

    #[tokio::test]
    async fn test_blank_title_update_keeps_the_post_intact() {
        let repo = store().await;
        let id = repo.create_post(draft(1, "Title")).await.unwrap();

        let patch = PostPatch {
            title: Patch::Set("   ".into()),
            content: Patch::Set("\n\t".into()),
            ..Default::default()
        };
        repo.update_post(id, 1, patch).await.unwrap();

        let detail = repo.get_post(id).await.unwrap();
        assert_eq!(detail.post.title, "Title");
        assert_eq!(detail.post.content, "Title body");
    }

    #[tokio::test]
    async fn test_oversized_image_list_is_invalid_not_busy() {
        let repo = store().await;
        let id = repo.create_post(draft(5, "many")).await.unwrap();
        let ids: Vec<i64> = (1..=40_000).collect();

        let created = repo
            .create_post(NewPost {
                image_ids: ids.clone(),
                ..draft(5, "too many")
            })
            .await;
        assert!(matches!(created, Err(AppError::InvalidInput(_))));

        let patch = PostPatch {
            image_ids: Patch::Set(ids),
            ..Default::default()
        };
        let updated = repo.update_post(id, 5, patch).await;
        assert!(matches!(updated, Err(AppError::InvalidInput(_))));
        assert_eq!(count(&repo, "posts").await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_to_distinct_posts_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let repo = file_store(&dir).await;

        let mut ids = Vec::new();
        for author in 1..=16 {
            ids.push(repo.create_post(draft(author, "start")).await.unwrap());
        }

        for round in 0..5 {
            let writers: Vec<_> = ids
                .iter()
                .enumerate()
                .map(|(n, &id)| {
                    let repo = Arc::clone(&repo);
                    let author = n as i64 + 1;
                    tokio::spawn(async move {
                        let patch = PostPatch {
                            title: Patch::Set(format!("round {round}")),
                            tags: Patch::Set(vec![format!("r{round}"), format!("a{author}")]),
                            ..Default::default()
                        };
                        repo.update_post(id, author, patch).await
                    })
                })
                .collect();
            for writer in writers {
                assert_eq!(writer.await.unwrap(), Ok(()));
            }
        }

        for &id in &ids {
            assert_eq!(repo.get_post(id).await.unwrap().post.title, "round 4");
        }

        let deleters: Vec<_> = ids
            .iter()
            .enumerate()
            .map(|(n, &id)| {
                let repo = Arc::clone(&repo);
                tokio::spawn(async move { repo.soft_delete_post(id, n as i64 + 1).await })
            })
            .collect();
        for deleter in deleters {
            assert_eq!(deleter.await.unwrap(), Ok(()));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_creates_bind_a_staged_image_once() {
        let dir = tempfile::tempdir().unwrap();
        let repo = file_store(&dir).await;
        let image = stage(&repo, 7, "contested").await;

        let racers: Vec<_> = (0..8)
            .map(|n| {
                let repo = Arc::clone(&repo);
                tokio::spawn(async move {
                    repo.create_post(NewPost {
                        image_ids: vec![image],
                        ..draft(7, &format!("racer {n}"))
                    })
                    .await
                })
            })
            .collect();

        let mut winners = Vec::new();
        for racer in racers {
            match racer.await.unwrap() {
                Ok(id) => winners.push(id),
                Err(err) => assert!(matches!(err, AppError::InvalidInput(_)), "{err:?}"),
            }
        }

        assert_eq!(winners.len(), 1);
        assert_eq!(image_binding(&repo, image).await.0, winners[0]);
        // Losers left no post behind.
        assert_eq!(count(&repo, "posts").await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_listing_total_matches_page_under_concurrent_writes() {
        let dir = tempfile::tempdir().unwrap();
        let repo = file_store(&dir).await;

        let writer = {
            let repo = Arc::clone(&repo);
            tokio::spawn(async move {
                for n in 0..60 {
                    repo.create_post(NewPost {
                        board_id: Some(3),
                        ..draft(5, &format!("post {n}"))
                    })
                    .await
                    .unwrap();
                }
            })
        };

        // Fewer than one page of posts exist, so a consistent read always
        // returns every counted post.
        for _ in 0..60 {
            let page = repo
                .list_by_board(3, Page::new(1, 100).unwrap())
                .await
                .unwrap();
            assert_eq!(page.items.len() as i64, page.total);
        }
        writer.await.unwrap();

        let page = repo.list_by_board(3, Page::new(1, 100).unwrap()).await.unwrap();
        assert_eq!(page.total, 60);
    }

    #[tokio::test]
    async fn test_claim_lost_after_the_count_rolls_back() {
        let repo = store().await;
        let kept = stage(&repo, 5, "kept").await;
        let lost = stage(&repo, 5, "lost").await;

        // Swallow the write for `lost`, as if another unit had bound it first.
        sqlx::query(&format!(
            "CREATE TEMP TRIGGER lose_claim BEFORE UPDATE OF post_id ON post_images \
             WHEN OLD.id = {lost} BEGIN SELECT RAISE(IGNORE); END"
        ))
        .execute(repo.pool())
        .await
        .unwrap();

        let err = repo
            .create_post(NewPost {
                tags: vec!["late".into()],
                image_ids: vec![kept, lost],
                ..draft(5, "late")
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(image_binding(&repo, kept).await, (0, 0));
        assert_eq!(count(&repo, "posts").await, 0);
        assert_eq!(count(&repo, "post_tags").await, 0);
    }

    #[tokio::test]
    async fn test_large_pages_load_tags_in_batches() {
        let repo = store().await;
        for n in 0..520 {
            repo.create_post(NewPost {
                board_id: Some(8),
                tags: vec![format!("n{n}")],
                ..draft(5, &format!("post {n}"))
            })
            .await
            .unwrap();
        }

        let page = repo.list_by_board(8, Page::new(1, 1_000).unwrap()).await.unwrap();
        assert_eq!(page.total, 520);
        assert_eq!(page.items.len(), 520);
        assert!(page.items.iter().all(|item| item.tags.len() == 1));
        assert_eq!(page.items[519].tags[0].name, "n0");
    }
}
