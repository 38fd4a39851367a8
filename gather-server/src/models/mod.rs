mod chat;
pub mod input;
mod message;
mod user;

pub use chat::{Chat, ChatView, Created};
pub use message::{Message, MessageType, MessageView};
pub use user::UserSummary;
