//! Business logic shared by the REST surface and the real-time gateway.

mod chats;
mod locks;
mod membership;
mod messages;

pub use chats::ChatDirectory;
pub use locks::ChatLocks;
pub use membership::{JoinedGroup, MembershipSynchronizer};
pub use messages::MessageService;

/// Wall clock in milliseconds, the unit every stored timestamp uses.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
