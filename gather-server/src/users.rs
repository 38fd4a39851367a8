//! User collaborator: display-safe lookups of user summaries.

use async_trait::async_trait;
use rusqlite::{params, params_from_iter};
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::Database;
use crate::error::ChatResult;
use crate::ids::UserId;
use crate::models::UserSummary;

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Batch lookup. Unknown ids are simply absent from the result.
    async fn find_users(&self, ids: &[UserId]) -> ChatResult<Vec<UserSummary>>;
}

/// Resolve `ids` into a lookup map, one round trip.
pub async fn summaries(
    users: &dyn UserDirectory,
    ids: &[UserId],
) -> ChatResult<HashMap<UserId, UserSummary>> {
    let mut unique: Vec<UserId> = ids.to_vec();
    unique.sort();
    unique.dedup();
    if unique.is_empty() {
        return Ok(HashMap::new());
    }
    Ok(users
        .find_users(&unique)
        .await?
        .into_iter()
        .map(|summary| (summary.id.clone(), summary))
        .collect())
}

/// Summary for `id`, or a placeholder when the directory no longer has it.
pub fn summary_or_placeholder(found: &HashMap<UserId, UserSummary>, id: &UserId) -> UserSummary {
    found
        .get(id)
        .cloned()
        .unwrap_or_else(|| UserSummary::placeholder(id.clone()))
}

pub struct SqliteUserDirectory {
    db: Arc<Database>,
}

impl SqliteUserDirectory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or refresh a user row. Used by local seeding and tests.
    pub async fn upsert_user(&self, user: UserSummary) -> ChatResult<()> {
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO users (id, username, profile_image_url) VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET username = excluded.username,
                         profile_image_url = excluded.profile_image_url",
                    params![user.id, user.username, user.profile_image_url],
                )?;
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl UserDirectory for SqliteUserDirectory {
    async fn find_users(&self, ids: &[UserId]) -> ChatResult<Vec<UserSummary>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = ids.to_vec();
        self.db
            .read(move |conn| {
                let placeholders = vec!["?"; ids.len()].join(", ");
                let sql = format!(
                    "SELECT id, username, profile_image_url FROM users WHERE id IN ({})",
                    placeholders
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
                    Ok(UserSummary {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        profile_image_url: row.get(2)?,
                    })
                })?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn summary(id: &str, name: &str) -> UserSummary {
        UserSummary {
            id: UserId::from(id),
            username: name.to_string(),
            profile_image_url: None,
        }
    }

    async fn directory() -> SqliteUserDirectory {
        let db = Arc::new(Database::open_in_memory(Duration::from_secs(1)).unwrap());
        let users = SqliteUserDirectory::new(db);
        users.upsert_user(summary("a", "alice")).await.unwrap();
        users.upsert_user(summary("b", "bob")).await.unwrap();
        users
    }

    #[tokio::test]
    async fn test_batch_lookup_skips_unknown_ids() {
        let users = directory().await;
        let found = users
            .find_users(&[UserId::from("a"), UserId::from("b"), UserId::from("ghost")])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_user_renders_placeholder() {
        let users = directory().await;
        let ids = [UserId::from("a"), UserId::from("ghost"), UserId::from("a")];
        let found = summaries(&users, &ids).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(summary_or_placeholder(&found, &ids[0]).username, "alice");
        assert_eq!(summary_or_placeholder(&found, &ids[1]).username, "Unknown user");
    }

    #[tokio::test]
    async fn test_upsert_refreshes_username() {
        let users = directory().await;
        users.upsert_user(summary("a", "alicia")).await.unwrap();
        let found = users.find_users(&[UserId::from("a")]).await.unwrap();
        assert_eq!(found[0].username, "alicia");
    }
}
