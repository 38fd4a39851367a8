use serde::{Deserialize, Serialize};

use crate::ids::{ChatId, UserId};
use crate::models::{MessageType, MessageView};
use crate::notifications::Notification;

/// Real-time wire events: `{ "event": <name>, "data": <payload> }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum WsEvent {
    /// Client -> server
    #[serde(rename = "sendMessage")]
    SendMessage {
        #[serde(rename = "chatId", default)]
        chat_id: ChatId,
        #[serde(default)]
        content: Option<String>,
        #[serde(rename = "type", default)]
        message_type: MessageType,
    },
    /// Persisted message, to every subscriber of the chat's room
    #[serde(rename = "receiveMessage")]
    ReceiveMessage(MessageView),
    /// Failed send, to the originating connection only
    #[serde(rename = "sendMessageError")]
    SendMessageError {
        reason: String,
        #[serde(rename = "chatId")]
        chat_id: Option<ChatId>,
    },
    #[serde(rename = "newNotification")]
    NewNotification(Notification),
    #[serde(rename = "connected")]
    Connected {
        #[serde(rename = "userId")]
        user_id: UserId,
        rooms: Vec<String>,
    },
    #[serde(rename = "error")]
    Error { message: String },
}
