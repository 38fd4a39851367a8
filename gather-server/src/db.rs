use rusqlite::Connection;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{ChatError, ChatResult};

/// Path value that opens a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// Shared SQLite handle.
///
/// Every store operation runs as one closure on the blocking pool, bounded by
/// `timeout`. All chats share the one connection: a slow call delays store
/// access for every room until it finishes, and callers behind it see
/// `Transient` once their own deadline passes.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    timeout: Duration,
}

impl Database {
    pub fn open(path: &str, timeout: Duration) -> ChatResult<Self> {
        if path == IN_MEMORY {
            return Self::open_in_memory(timeout);
        }

        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    ChatError::Internal(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        info!(path = %path, "Opened chat database");
        Self::with_connection(conn, timeout)
    }

    pub fn open_in_memory(timeout: Duration) -> ChatResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, timeout)
    }

    fn with_connection(conn: Connection, timeout: Duration) -> ChatResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(timeout)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            timeout,
        })
    }

    /// Run `f` against the connection under the store deadline.
    ///
    /// Used for writes: a timed-out write is reported, never retried.
    pub async fn call<F, T>(&self, f: F) -> ChatResult<T>
    where
        F: FnOnce(&mut Connection) -> ChatResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let task = tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| ChatError::Internal("database lock poisoned".to_string()))?;
            f(&mut guard)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(ChatError::Internal(format!("store task failed: {}", e))),
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Store call timed out"
                );
                Err(ChatError::Transient("store call timed out".to_string()))
            }
        }
    }

    /// Run a read-only closure, retrying once after a transient failure.
    pub async fn read<F, T>(&self, f: F) -> ChatResult<T>
    where
        F: Fn(&Connection) -> ChatResult<T> + Clone + Send + 'static,
        T: Send + 'static,
    {
        let first = f.clone();
        match self.call(move |conn| first(conn)).await {
            Err(err) if err.is_transient() => {
                warn!(error = %err, "Retrying read after transient store failure");
                self.call(move |conn| f(conn)).await
            }
            other => other,
        }
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        -- Chats (private pairs, groups, post-bound groups)
        CREATE TABLE IF NOT EXISTS chats (
            id TEXT PRIMARY KEY,
            is_group INTEGER NOT NULL DEFAULT 0,
            group_name TEXT,
            post_id TEXT UNIQUE,
            pair_key TEXT UNIQUE,
            last_message_id TEXT,
            message_seq INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chat_participants (
            chat_id TEXT NOT NULL REFERENCES chats(id),
            user_id TEXT NOT NULL,
            joined_at INTEGER NOT NULL,
            PRIMARY KEY (chat_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            chat_id TEXT NOT NULL REFERENCES chats(id),
            sender_id TEXT NOT NULL,
            content TEXT,
            message_type TEXT NOT NULL DEFAULT 'text',
            seq INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE (chat_id, seq)
        );

        CREATE TABLE IF NOT EXISTS message_reads (
            message_id TEXT NOT NULL REFERENCES messages(id),
            user_id TEXT NOT NULL,
            read_at INTEGER NOT NULL,
            PRIMARY KEY (message_id, user_id)
        );

        -- Collaborator tables (users and posts are owned elsewhere)
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            profile_image_url TEXT
        );

        CREATE TABLE IF NOT EXISTS posts (
            id TEXT PRIMARY KEY,
            author_id TEXT NOT NULL,
            title TEXT NOT NULL,
            is_event INTEGER NOT NULL DEFAULT 0,
            event_starts_at INTEGER
        );

        CREATE TABLE IF NOT EXISTS post_interests (
            post_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (post_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_chat_participants_user_id ON chat_participants(user_id);
        CREATE INDEX IF NOT EXISTS idx_chats_updated_at ON chats(updated_at);
        CREATE INDEX IF NOT EXISTS idx_message_reads_message_id ON message_reads(message_id);
        ",
    )
}
