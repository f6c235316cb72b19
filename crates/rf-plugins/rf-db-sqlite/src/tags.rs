//! # Tag resolver
//!
//! Name → ID resolution with lazy creation, and full replacement of a post's
//! tag links.

use std::collections::{BTreeSet, HashMap, HashSet};

use rf_core::error::{AppError, Result};
use rf_core::models::{PostId, Tag, TagId};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use crate::error::OrBusy;

/// Resolves every name to a tag ID, creating the missing ones.
///
/// Lookup is exact and case-sensitive. Duplicates collapse. Creation is
/// insert-if-absent followed by a select, so a concurrent creator of the
/// same name cannot make this fail.
pub(crate) async fn resolve(conn: &mut SqliteConnection, names: &[String]) -> Result<BTreeSet<TagId>> {
    let mut seen = HashSet::new();
    let mut ids = BTreeSet::new();

    for name in names {
        if name.is_empty() {
            return Err(AppError::invalid("tag names must not be empty"));
        }
        if !seen.insert(name.as_str()) {
            continue;
        }

        sqlx::query("INSERT INTO tags (name) VALUES (?) ON CONFLICT (name) DO NOTHING")
            .bind(name.as_str())
            .execute(&mut *conn)
            .await
            .or_busy("create_tag", None)?;

        let id: TagId = sqlx::query_scalar("SELECT id FROM tags WHERE name = ?")
            .bind(name.as_str())
            .fetch_one(&mut *conn)
            .await
            .or_busy("resolve_tag", None)?;
        ids.insert(id);
    }

    Ok(ids)
}

/// Makes `tag_ids` the post's entire tag set.
pub(crate) async fn replace_for_post(
    conn: &mut SqliteConnection,
    post_id: PostId,
    tag_ids: &BTreeSet<TagId>,
) -> Result<()> {
    sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
        .bind(post_id)
        .execute(&mut *conn)
        .await
        .or_busy("replace_post_tags", Some(post_id))?;

    for tag_id in tag_ids {
        sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES (?, ?)")
            .bind(post_id)
            .bind(*tag_id)
            .execute(&mut *conn)
            .await
            .or_busy("replace_post_tags", Some(post_id))?;
    }
    Ok(())
}

pub(crate) async fn for_post(conn: &mut SqliteConnection, post_id: PostId) -> Result<Vec<Tag>> {
    let rows = sqlx::query(
        "SELECT t.id, t.name FROM tags t \
         JOIN post_tags pt ON pt.tag_id = t.id \
         WHERE pt.post_id = ? ORDER BY t.name",
    )
    .bind(post_id)
    .fetch_all(&mut *conn)
    .await
    .or_busy("load_post_tags", Some(post_id))?;

    Ok(rows
        .into_iter()
        .map(|row| Tag {
            id: row.get("id"),
            name: row.get("name"),
        })
        .collect())
}

/// Post IDs per batched lookup, well under SQLite's bound-parameter limit.
const LOOKUP_CHUNK: usize = 500;

/// Batch variant for listings: one query per chunk of the page.
pub(crate) async fn for_posts(
    conn: &mut SqliteConnection,
    post_ids: &[PostId],
) -> Result<HashMap<PostId, Vec<Tag>>> {
    let mut by_post: HashMap<PostId, Vec<Tag>> = HashMap::new();

    for chunk in post_ids.chunks(LOOKUP_CHUNK) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT pt.post_id, t.id, t.name FROM tags t \
             JOIN post_tags pt ON pt.tag_id = t.id WHERE pt.post_id IN (",
        );
        let mut ids = qb.separated(", ");
        for id in chunk {
            ids.push_bind(*id);
        }
        ids.push_unseparated(") ORDER BY t.name");

        let rows = qb
            .build()
            .fetch_all(&mut *conn)
            .await
            .or_busy("load_listing_tags", None)?;

        for row in rows {
            by_post.entry(row.get("post_id")).or_default().push(Tag {
                id: row.get("id"),
                name: row.get("name"),
            });
        }
    }
    Ok(by_post)
}
