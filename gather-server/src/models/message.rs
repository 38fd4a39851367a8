use serde::{Deserialize, Serialize};

use super::user::UserSummary;
use crate::ids::{ChatId, MessageId, UserId};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Video,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Video => "video",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(MessageType::Text),
            "image" => Some(MessageType::Image),
            "video" => Some(MessageType::Video),
            _ => None,
        }
    }
}

/// A persisted message. Immutable apart from `read_by` growth.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub content: Option<String>,
    pub message_type: MessageType,
    pub read_by: Vec<UserId>,
    /// Per-chat append position; the total order for history replay.
    pub seq: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Message {
    pub fn is_read_by(&self, user_id: &UserId) -> bool {
        self.read_by.iter().any(|reader| reader == user_id)
    }

    pub fn into_view(self, sender: UserSummary) -> MessageView {
        MessageView {
            id: self.id,
            chat: self.chat_id,
            sender,
            content: self.content,
            message_type: self.message_type,
            read_by: self.read_by,
            seq: self.seq,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// A message with its sender resolved, as clients receive it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: MessageId,
    pub chat: ChatId,
    pub sender: UserSummary,
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub read_by: Vec<UserId>,
    pub seq: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_wire_names() {
        assert_eq!(serde_json::to_string(&MessageType::Video).unwrap(), "\"video\"");
        let parsed: MessageType = serde_json::from_str("\"image\"").unwrap();
        assert_eq!(parsed, MessageType::Image);
        assert!(serde_json::from_str::<MessageType>("\"audio\"").is_err());
    }

    #[test]
    fn test_message_type_storage_names() {
        for kind in [MessageType::Text, MessageType::Image, MessageType::Video] {
            assert_eq!(MessageType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(MessageType::parse("document"), None);
    }

    #[test]
    fn test_view_uses_type_key() {
        let message = Message {
            id: MessageId::from("m1"),
            chat_id: ChatId::from("c1"),
            sender_id: UserId::from("u1"),
            content: Some("hi".to_string()),
            message_type: MessageType::Text,
            read_by: vec![UserId::from("u1")],
            seq: 1,
            created_at: 10,
            updated_at: 10,
        };
        let view = message.into_view(UserSummary::placeholder(UserId::from("u1")));
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["chat"], "c1");
        assert_eq!(json["readBy"][0], "u1");
        assert_eq!(json["sender"]["id"], "u1");
    }
}
