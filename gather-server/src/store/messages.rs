//! Message Store: the append-only message log and read receipts.

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashMap;

use crate::error::{ChatError, ChatResult};
use crate::ids::{ChatId, MessageId, UserId};
use crate::models::{Message, MessageType};

const MESSAGE_COLUMNS: &str =
    "id, chat_id, sender_id, content, message_type, seq, created_at, updated_at";

/// A message about to be appended.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub content: Option<String>,
    pub message_type: MessageType,
}

fn row_to_message(row: &Row) -> rusqlite::Result<Message> {
    let kind: String = row.get(4)?;
    Ok(Message {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        sender_id: row.get(2)?,
        content: row.get(3)?,
        message_type: MessageType::parse(&kind).unwrap_or_default(),
        read_by: Vec::new(),
        seq: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn load_readers(conn: &Connection, message_id: &MessageId) -> rusqlite::Result<Vec<UserId>> {
    let mut stmt = conn.prepare_cached(
        "SELECT user_id FROM message_reads WHERE message_id = ?1 ORDER BY read_at ASC, rowid ASC",
    )?;
    let rows = stmt.query_map([message_id], |row| row.get(0))?;
    rows.collect()
}

/// Append a message and move the chat's last-message pointer in one
/// transaction.
///
/// `seq` comes from the chat's own counter, so history order stays total
/// even when two messages share a millisecond. `created_at` never runs
/// backwards within a chat.
pub fn append_message(conn: &mut Connection, new: NewMessage, now: i64) -> ChatResult<Message> {
    let tx = conn.transaction()?;

    let seq: i64 = tx
        .query_row(
            "UPDATE chats SET message_seq = message_seq + 1 WHERE id = ?1 RETURNING message_seq",
            [&new.chat_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| ChatError::NotFound("Chat room not found.".to_string()))?;

    let previous: Option<i64> = tx
        .query_row(
            "SELECT created_at FROM messages WHERE chat_id = ?1 ORDER BY seq DESC LIMIT 1",
            [&new.chat_id],
            |row| row.get(0),
        )
        .optional()?;
    let created_at = previous.map_or(now, |prev| prev.max(now));

    let id = MessageId::generate();
    tx.execute(
        "INSERT INTO messages (id, chat_id, sender_id, content, message_type, seq, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            id,
            new.chat_id,
            new.sender_id,
            new.content,
            new.message_type.as_str(),
            seq,
            created_at
        ],
    )?;
    tx.execute(
        "INSERT INTO message_reads (message_id, user_id, read_at) VALUES (?1, ?2, ?3)",
        params![id, new.sender_id, created_at],
    )?;
    tx.execute(
        "UPDATE chats SET last_message_id = ?2, updated_at = MAX(updated_at, ?3) WHERE id = ?1",
        params![new.chat_id, id, created_at],
    )?;
    tx.commit()?;

    Ok(Message {
        id,
        chat_id: new.chat_id,
        read_by: vec![new.sender_id.clone()],
        sender_id: new.sender_id,
        content: new.content,
        message_type: new.message_type,
        seq,
        created_at,
        updated_at: created_at,
    })
}

/// Full history of a chat in append order.
pub fn list_for_chat(conn: &Connection, chat_id: &ChatId) -> ChatResult<Vec<Message>> {
    let sql = format!(
        "SELECT {} FROM messages WHERE chat_id = ?1 ORDER BY seq ASC",
        MESSAGE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut messages = stmt
        .query_map([chat_id], row_to_message)?
        .collect::<rusqlite::Result<Vec<Message>>>()?;

    let mut readers: HashMap<MessageId, Vec<UserId>> = HashMap::new();
    let mut stmt = conn.prepare(
        "SELECT r.message_id, r.user_id FROM message_reads r
         JOIN messages m ON m.id = r.message_id
         WHERE m.chat_id = ?1
         ORDER BY r.read_at ASC, r.rowid ASC",
    )?;
    let rows = stmt.query_map([chat_id], |row| {
        Ok((row.get::<_, MessageId>(0)?, row.get::<_, UserId>(1)?))
    })?;
    for row in rows {
        let (message_id, user_id) = row?;
        readers.entry(message_id).or_default().push(user_id);
    }

    for message in &mut messages {
        message.read_by = readers.remove(&message.id).unwrap_or_default();
    }
    Ok(messages)
}

pub fn find_message(conn: &Connection, message_id: &MessageId) -> ChatResult<Option<Message>> {
    let sql = format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS);
    let message = conn.query_row(&sql, [message_id], row_to_message).optional()?;
    match message {
        Some(mut message) => {
            message.read_by = load_readers(conn, &message.id)?;
            Ok(Some(message))
        }
        None => Ok(None),
    }
}

/// Batch lookup used to resolve last-message pointers for an inbox.
///
/// Two queries regardless of how many ids are asked for.
pub fn find_messages(conn: &Connection, ids: &[MessageId]) -> ChatResult<HashMap<MessageId, Message>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");

    let sql = format!(
        "SELECT {} FROM messages WHERE id IN ({})",
        MESSAGE_COLUMNS, placeholders
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut found = stmt
        .query_map(params_from_iter(ids.iter()), row_to_message)?
        .map(|row| row.map(|message| (message.id.clone(), message)))
        .collect::<rusqlite::Result<HashMap<MessageId, Message>>>()?;

    let sql = format!(
        "SELECT message_id, user_id FROM message_reads WHERE message_id IN ({})
         ORDER BY read_at ASC, rowid ASC",
        placeholders
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
        Ok((row.get::<_, MessageId>(0)?, row.get::<_, UserId>(1)?))
    })?;
    for row in rows {
        let (message_id, user_id) = row?;
        if let Some(message) = found.get_mut(&message_id) {
            message.read_by.push(user_id);
        }
    }
    Ok(found)
}

/// Record that `user_id` read the message. Returns whether it was new.
pub fn mark_read(conn: &mut Connection, message_id: &MessageId, user_id: &UserId, now: i64) -> ChatResult<bool> {
    let tx = conn.transaction()?;
    let inserted = tx.execute(
        "INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at) VALUES (?1, ?2, ?3)",
        params![message_id, user_id, now],
    )?;
    if inserted > 0 {
        tx.execute(
            "UPDATE messages SET updated_at = MAX(updated_at, ?2) WHERE id = ?1",
            params![message_id, now],
        )?;
    }
    tx.commit()?;
    Ok(inserted > 0)
}
