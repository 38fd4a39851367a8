use serde::{Deserialize, Serialize};

use super::message::MessageView;
use super::user::UserSummary;
use crate::error::{ChatError, ChatResult};
use crate::ids::{ChatId, MessageId, PostId, UserId};

/// A stored chat with its participant ids.
#[derive(Debug, Clone, PartialEq)]
pub struct Chat {
    pub id: ChatId,
    pub participants: Vec<UserId>,
    pub is_group_chat: bool,
    pub group_name: Option<String>,
    pub post_id: Option<PostId>,
    pub last_message_id: Option<MessageId>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Chat {
    pub fn has_participant(&self, user_id: &UserId) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    /// Gate for every read or write on the chat.
    pub fn ensure_participant(&self, user_id: &UserId, denial: &str) -> ChatResult<()> {
        if self.has_participant(user_id) {
            Ok(())
        } else {
            Err(ChatError::Forbidden(denial.to_string()))
        }
    }
}

/// A chat with participants and last message resolved for display.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatView {
    pub id: ChatId,
    pub participants: Vec<UserSummary>,
    pub is_group_chat: bool,
    pub group_name: Option<String>,
    pub post_id: Option<PostId>,
    pub last_message: Option<MessageView>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ChatView {
    pub fn participant_ids(&self) -> Vec<UserId> {
        self.participants.iter().map(|p| p.id.clone()).collect()
    }
}

/// Result of a find-or-create.
#[derive(Debug, Clone)]
pub struct Created<T> {
    pub value: T,
    pub created: bool,
}
