//! Post collaborator: the slice of post data the chat subsystem needs.

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use std::sync::Arc;

use crate::db::Database;
use crate::error::ChatResult;
use crate::ids::{PostId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostInfo {
    pub id: PostId,
    pub author_id: UserId,
    pub title: String,
    pub is_event: bool,
    /// Millisecond timestamp. `None` for posts without a schedule.
    pub event_starts_at: Option<i64>,
}

impl PostInfo {
    pub fn has_started(&self, now: i64) -> bool {
        self.event_starts_at.is_some_and(|start| start <= now)
    }
}

#[async_trait]
pub trait PostDirectory: Send + Sync {
    async fn find_post(&self, post_id: &PostId) -> ChatResult<Option<PostInfo>>;

    /// Add `user_id` to the post's interested users. Returns whether it was new.
    async fn add_interested_user(&self, post_id: &PostId, user_id: &UserId) -> ChatResult<bool>;
}

pub struct SqlitePostDirectory {
    db: Arc<Database>,
}

impl SqlitePostDirectory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or replace a post row. Used by local seeding and tests.
    pub async fn upsert_post(&self, post: PostInfo) -> ChatResult<()> {
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO posts (id, author_id, title, is_event, event_starts_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        post.id,
                        post.author_id,
                        post.title,
                        post.is_event,
                        post.event_starts_at
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn interested_users(&self, post_id: &PostId) -> ChatResult<Vec<UserId>> {
        let post_id = post_id.clone();
        self.db
            .read(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT user_id FROM post_interests WHERE post_id = ?1 ORDER BY created_at, rowid",
                )?;
                let rows = stmt.query_map([&post_id], |row| row.get(0))?;
                Ok(rows.collect::<rusqlite::Result<Vec<UserId>>>()?)
            })
            .await
    }
}

#[async_trait]
impl PostDirectory for SqlitePostDirectory {
    async fn find_post(&self, post_id: &PostId) -> ChatResult<Option<PostInfo>> {
        let post_id = post_id.clone();
        self.db
            .read(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT id, author_id, title, is_event, event_starts_at FROM posts WHERE id = ?1",
                        [&post_id],
                        |row| {
                            Ok(PostInfo {
                                id: row.get(0)?,
                                author_id: row.get(1)?,
                                title: row.get(2)?,
                                is_event: row.get(3)?,
                                event_starts_at: row.get(4)?,
                            })
                        },
                    )
                    .optional()?)
            })
            .await
    }

    async fn add_interested_user(&self, post_id: &PostId, user_id: &UserId) -> ChatResult<bool> {
        let (post_id, user_id) = (post_id.clone(), user_id.clone());
        let now = chrono::Utc::now().timestamp_millis();
        self.db
            .call(move |conn| {
                let added = conn.execute(
                    "INSERT OR IGNORE INTO post_interests (post_id, user_id, created_at) VALUES (?1, ?2, ?3)",
                    params![post_id, user_id, now],
                )?;
                Ok(added > 0)
            })
            .await
    }
}
