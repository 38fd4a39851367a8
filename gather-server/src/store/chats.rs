//! Chat Store: chat rows and their participant sets.
//!
//! Participant adds are `INSERT OR IGNORE` against the `(chat_id, user_id)`
//! primary key, so two racing adds can never duplicate a member.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{ChatError, ChatResult};
use crate::ids::{ChatId, PostId, UserId};
use crate::models::Chat;

const CHAT_COLUMNS: &str =
    "c.id, c.is_group, c.group_name, c.post_id, c.last_message_id, c.created_at, c.updated_at";

/// Canonical key for an unordered pair of users.
pub fn pair_key(a: &UserId, b: &UserId) -> String {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    format!("{}\u{1f}{}", low, high)
}

fn row_to_chat(row: &Row) -> rusqlite::Result<Chat> {
    Ok(Chat {
        id: row.get(0)?,
        participants: Vec::new(),
        is_group_chat: row.get::<_, i64>(1)? == 1,
        group_name: row.get(2)?,
        post_id: row.get(3)?,
        last_message_id: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn load_participants(conn: &Connection, chat_id: &ChatId) -> rusqlite::Result<Vec<UserId>> {
    let mut stmt = conn.prepare_cached(
        "SELECT user_id FROM chat_participants WHERE chat_id = ?1 ORDER BY joined_at ASC, rowid ASC",
    )?;
    let rows = stmt.query_map([chat_id], |row| row.get(0))?;
    rows.collect()
}

fn find_where(conn: &Connection, predicate: &str, value: &str) -> ChatResult<Option<Chat>> {
    let sql = format!("SELECT {} FROM chats c WHERE {} = ?1", CHAT_COLUMNS, predicate);
    let chat = conn.query_row(&sql, [value], row_to_chat).optional()?;
    match chat {
        Some(mut chat) => {
            chat.participants = load_participants(conn, &chat.id)?;
            Ok(Some(chat))
        }
        None => Ok(None),
    }
}

pub fn find_chat(conn: &Connection, chat_id: &ChatId) -> ChatResult<Option<Chat>> {
    find_where(conn, "c.id", chat_id.as_str())
}

pub fn find_chat_by_post(conn: &Connection, post_id: &PostId) -> ChatResult<Option<Chat>> {
    find_where(conn, "c.post_id", post_id.as_str())
}

fn insert_participants(conn: &Connection, chat_id: &ChatId, users: &[UserId], now: i64) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO chat_participants (chat_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
    )?;
    let mut added = 0;
    for user_id in users {
        added += stmt.execute(params![chat_id, user_id, now])?;
    }
    Ok(added)
}

fn expect_chat(conn: &Connection, chat_id: &ChatId) -> ChatResult<Chat> {
    find_chat(conn, chat_id)?
        .ok_or_else(|| ChatError::Internal(format!("chat {} vanished after write", chat_id)))
}

/// Find-or-create the private chat for `{a, b}`.
///
/// The unique `pair_key` makes the insert a no-op when the pair already has
/// a chat, so concurrent starts converge on one row.
pub fn find_or_create_private_chat(
    conn: &mut Connection,
    a: &UserId,
    b: &UserId,
    now: i64,
) -> ChatResult<(Chat, bool)> {
    let key = pair_key(a, b);
    let tx = conn.transaction()?;
    let candidate = ChatId::generate();
    let inserted = tx.execute(
        "INSERT OR IGNORE INTO chats (id, is_group, pair_key, created_at, updated_at)
         VALUES (?1, 0, ?2, ?3, ?3)",
        params![candidate, key, now],
    )?;
    if inserted == 1 {
        insert_participants(&tx, &candidate, &[a.clone(), b.clone()], now)?;
    }
    let chat_id: ChatId = tx.query_row("SELECT id FROM chats WHERE pair_key = ?1", [&key], |row| {
        row.get(0)
    })?;
    tx.commit()?;

    Ok((expect_chat(conn, &chat_id)?, inserted == 1))
}

pub fn create_group_chat(
    conn: &mut Connection,
    participants: &[UserId],
    group_name: &str,
    now: i64,
) -> ChatResult<Chat> {
    let tx = conn.transaction()?;
    let chat_id = ChatId::generate();
    tx.execute(
        "INSERT INTO chats (id, is_group, group_name, created_at, updated_at)
         VALUES (?1, 1, ?2, ?3, ?3)",
        params![chat_id, group_name, now],
    )?;
    insert_participants(&tx, &chat_id, participants, now)?;
    tx.commit()?;

    expect_chat(conn, &chat_id)
}

/// Find-or-create the chat bound to `post_id`, then make sure every user in
/// `members` participates. Returns the chat and whether it was created.
pub fn join_post_chat(
    conn: &mut Connection,
    post_id: &PostId,
    group_name: &str,
    members: &[UserId],
    now: i64,
) -> ChatResult<(Chat, bool)> {
    let tx = conn.transaction()?;
    let candidate = ChatId::generate();
    let inserted = tx.execute(
        "INSERT OR IGNORE INTO chats (id, is_group, group_name, post_id, created_at, updated_at)
         VALUES (?1, 1, ?2, ?3, ?4, ?4)",
        params![candidate, group_name, post_id, now],
    )?;
    let chat_id: ChatId = tx.query_row("SELECT id FROM chats WHERE post_id = ?1", [post_id], |row| {
        row.get(0)
    })?;
    let added = insert_participants(&tx, &chat_id, members, now)?;
    if added > 0 && inserted == 0 {
        touch(&tx, &chat_id, now)?;
    }
    tx.commit()?;

    Ok((expect_chat(conn, &chat_id)?, inserted == 1))
}

fn touch(conn: &Connection, chat_id: &ChatId, now: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE chats SET updated_at = MAX(updated_at, ?2) WHERE id = ?1",
        params![chat_id, now],
    )
}

/// Every chat `user_id` participates in, most recently active first.
pub fn chats_for_user(conn: &Connection, user_id: &UserId) -> ChatResult<Vec<Chat>> {
    let sql = format!(
        "SELECT {} FROM chats c
         JOIN chat_participants p ON p.chat_id = c.id
         WHERE p.user_id = ?1
         ORDER BY c.updated_at DESC, c.rowid DESC",
        CHAT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let chats = stmt
        .query_map([user_id], row_to_chat)?
        .collect::<rusqlite::Result<Vec<Chat>>>()?;

    chats
        .into_iter()
        .map(|mut chat| -> ChatResult<Chat> {
            chat.participants = load_participants(conn, &chat.id)?;
            Ok(chat)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use std::time::Duration;

    fn user(id: &str) -> UserId {
        UserId::from(id)
    }

    async fn database() -> Database {
        Database::open_in_memory(Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_pair_key_is_order_independent() {
        assert_eq!(pair_key(&user("a"), &user("b")), pair_key(&user("b"), &user("a")));
        assert_ne!(pair_key(&user("a"), &user("bc")), pair_key(&user("ab"), &user("c")));
    }

    #[tokio::test]
    async fn test_private_chat_is_reused() {
        let db = database().await;
        let (first, created) = db
            .call(|conn| find_or_create_private_chat(conn, &user("a"), &user("b"), 1))
            .await
            .unwrap();
        assert!(created);

        let (second, created) = db
            .call(|conn| find_or_create_private_chat(conn, &user("b"), &user("a"), 2))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(second.participants.len(), 2);
        assert!(!second.is_group_chat);
    }

    #[tokio::test]
    async fn test_post_chat_is_unique_per_post() {
        let db = database().await;
        let post = PostId::from("p1");

        let p = post.clone();
        let (first, created) = db
            .call(move |conn| join_post_chat(conn, &p, "Picnic", &[user("author"), user("x")], 1))
            .await
            .unwrap();
        assert!(created);

        let p = post.clone();
        let (second, created) = db
            .call(move |conn| join_post_chat(conn, &p, "Picnic", &[user("author"), user("y")], 2))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(second.participants, vec![user("author"), user("x"), user("y")]);
        assert_eq!(second.group_name.as_deref(), Some("Picnic"));
        assert_eq!(second.updated_at, 2);

        // Re-joining is a no-op and does not bump activity.
        let p = post.clone();
        let (third, _) = db
            .call(move |conn| join_post_chat(conn, &p, "Picnic", &[user("author"), user("y")], 3))
            .await
            .unwrap();
        assert_eq!(third.participants.len(), 3);
        assert_eq!(third.updated_at, 2);
    }

    #[tokio::test]
    async fn test_chats_for_user_ordered_by_activity() {
        let db = database().await;
        let older = db
            .call(|conn| create_group_chat(conn, &[user("a"), user("b")], "Older", 1))
            .await
            .unwrap();
        let newer = db
            .call(|conn| create_group_chat(conn, &[user("a"), user("c")], "Newer", 2))
            .await
            .unwrap();
        db.call(|conn| create_group_chat(conn, &[user("b"), user("c")], "Other", 3))
            .await
            .unwrap();

        let chats = db.read(|conn| chats_for_user(conn, &user("a"))).await.unwrap();
        let ids: Vec<ChatId> = chats.into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }
}
