//! Input DTOs with garde validation.
//!
//! Services validate these before touching the store, so the REST and
//! real-time paths reject the same inputs with the same messages.

use garde::Validate;
use serde::Deserialize;

use super::message::MessageType;
use crate::error::ChatResult;

/// Validation constants
const MAX_USER_ID_LENGTH: usize = 128;
const MAX_GROUP_NAME_LENGTH: usize = 100;
const MAX_GROUP_PARTICIPANTS: usize = 256;
const MAX_MESSAGE_LENGTH: usize = 10000;

/// Input for starting (or reopening) a private chat
#[derive(Debug, Default, Deserialize, Validate)]
#[garde(context(()))]
#[serde(rename_all = "camelCase")]
pub struct StartPrivateChatInput {
    #[garde(length(max = MAX_USER_ID_LENGTH))]
    #[serde(default)]
    pub recipient_id: Option<String>,
}

/// Input for creating a group chat
#[derive(Debug, Default, Deserialize, Validate)]
#[garde(context(()))]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupChatInput {
    #[garde(length(max = MAX_GROUP_PARTICIPANTS), inner(length(max = MAX_USER_ID_LENGTH)))]
    #[serde(default)]
    pub participant_ids: Vec<String>,
    #[garde(length(max = MAX_GROUP_NAME_LENGTH))]
    #[serde(default)]
    pub group_name: String,
}

/// Input for sending a message, from either REST or the gateway
#[derive(Debug, Default, Clone, Deserialize, Validate)]
#[garde(context(()))]
pub struct SendMessageInput {
    #[garde(length(max = MAX_MESSAGE_LENGTH))]
    #[serde(default)]
    pub content: Option<String>,
    #[garde(skip)]
    #[serde(rename = "type", default)]
    pub message_type: MessageType,
}

impl SendMessageInput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            message_type: MessageType::Text,
        }
    }
}

/// Helper trait to turn garde reports into chat errors
pub trait ValidateExt {
    fn validate_input(&self) -> ChatResult<()>;
}

impl<T: Validate<Context = ()>> ValidateExt for T {
    fn validate_input(&self) -> ChatResult<()> {
        self.validate().map_err(Into::into)
    }
}
