//! Synchronous SQLite operations. Callers run these through
//! [`Database::call`](crate::db::Database::call) or
//! [`Database::read`](crate::db::Database::read).

pub mod chats;
pub mod messages;
