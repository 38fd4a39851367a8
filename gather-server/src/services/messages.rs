use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::chats::{require_chat, ACCESS_DENIED};
use super::locks::ChatLocks;
use super::now_millis;
use crate::db::Database;
use crate::error::{ChatError, ChatResult};
use crate::ids::{ChatId, MessageId, UserId};
use crate::messages::WsEvent;
use crate::models::input::{SendMessageInput, ValidateExt};
use crate::models::{MessageType, MessageView};
use crate::notifications::{Notification, NotificationKind, NotificationSink};
use crate::state::{chat_room, RoomRegistry};
use crate::store::messages::{self, NewMessage};
use crate::users::{summaries, summary_or_placeholder, UserDirectory};

/// The one implementation of message history, send and read-marking.
/// REST handlers and the gateway both call into it.
pub struct MessageService {
    db: Arc<Database>,
    users: Arc<dyn UserDirectory>,
    rooms: Arc<RoomRegistry>,
    notifier: Arc<dyn NotificationSink>,
    locks: Arc<ChatLocks>,
}

impl MessageService {
    pub fn new(
        db: Arc<Database>,
        users: Arc<dyn UserDirectory>,
        rooms: Arc<RoomRegistry>,
        notifier: Arc<dyn NotificationSink>,
        locks: Arc<ChatLocks>,
    ) -> Self {
        Self {
            db,
            users,
            rooms,
            notifier,
            locks,
        }
    }

    /// History of a chat, oldest first.
    pub async fn list_messages(&self, caller: &UserId, chat_id: &ChatId) -> ChatResult<Vec<MessageView>> {
        let chat = require_chat(&self.db, chat_id).await?;
        chat.ensure_participant(caller, ACCESS_DENIED)?;

        let id = chat.id.clone();
        let history = self
            .db
            .read(move |conn| messages::list_for_chat(conn, &id))
            .await?;

        let senders: Vec<UserId> = history.iter().map(|m| m.sender_id.clone()).collect();
        let people = summaries(self.users.as_ref(), &senders).await?;
        Ok(history
            .into_iter()
            .map(|message| {
                let sender = summary_or_placeholder(&people, &message.sender_id);
                message.into_view(sender)
            })
            .collect())
    }

    /// Validate, persist and broadcast a message.
    ///
    /// The chat's lock is held from the participant check through the
    /// `receiveMessage` broadcast, so subscribers see messages in the order
    /// they were persisted.
    pub async fn send_message(
        &self,
        caller: &UserId,
        chat_id: &ChatId,
        input: SendMessageInput,
    ) -> ChatResult<MessageView> {
        input.validate_input()?;
        if chat_id.is_blank() {
            return Err(ChatError::InvalidArgument("Chat ID is required.".to_string()));
        }
        let has_content = input
            .content
            .as_deref()
            .is_some_and(|content| !content.trim().is_empty());
        if input.message_type == MessageType::Text && !has_content {
            return Err(ChatError::InvalidArgument(
                "Message content is required.".to_string(),
            ));
        }
        let content = if has_content { input.content } else { None };

        // Participants only ever grow, so the check holds once the lock is taken.
        let chat = require_chat(&self.db, chat_id).await?;
        chat.ensure_participant(caller, "Unauthorized to send message.")?;
        let guard = self.locks.chat(&chat.id).await;

        let new = NewMessage {
            chat_id: chat.id.clone(),
            sender_id: caller.clone(),
            content,
            message_type: input.message_type,
        };
        let message = self
            .db
            .call(move |conn| messages::append_message(conn, new, now_millis()))
            .await?;

        // Committed already: a failed sender lookup must not fail the send.
        let people = match summaries(self.users.as_ref(), std::slice::from_ref(caller)).await {
            Ok(people) => people,
            Err(e) => {
                warn!(chat_id = %chat.id, user_id = %caller, error = %e, "Sender lookup failed");
                HashMap::new()
            }
        };
        let view = message.into_view(summary_or_placeholder(&people, caller));

        let delivered = self
            .rooms
            .publish(&chat_room(&chat.id), &WsEvent::ReceiveMessage(view.clone()));
        drop(guard);

        info!(
            chat_id = %chat.id,
            message_id = %view.id,
            user_id = %caller,
            seq = view.seq,
            delivered,
            "Message sent"
        );

        for recipient in chat.participants.iter().filter(|p| *p != caller) {
            let notification = Notification {
                recipient: recipient.clone(),
                sender: caller.clone(),
                kind: NotificationKind::NewMessage,
                message: format!("{} sent you a message", view.sender.username),
                related_entity_id: Some(chat.id.to_string()),
                created_at: view.created_at,
            };
            if let Err(e) = self.notifier.notify(notification).await {
                warn!(chat_id = %chat.id, user_id = %recipient, error = %e, "Failed to push notification");
            }
        }

        Ok(view)
    }

    /// Add the caller to a message's read-by set. Re-marking is a no-op.
    pub async fn mark_message_read(&self, caller: &UserId, message_id: &MessageId) -> ChatResult<bool> {
        let id = message_id.clone();
        let message = self
            .db
            .read(move |conn| messages::find_message(conn, &id))
            .await?
            .ok_or_else(|| ChatError::NotFound("Message not found.".to_string()))?;

        let denied = "Unauthorized to mark read.";
        match require_chat(&self.db, &message.chat_id).await {
            Ok(chat) => chat.ensure_participant(caller, denied)?,
            Err(ChatError::NotFound(_)) => return Err(ChatError::Forbidden(denied.to_string())),
            Err(e) => return Err(e),
        }

        if message.is_read_by(caller) {
            return Ok(false);
        }
        let (id, reader) = (message.id.clone(), caller.clone());
        self.db
            .call(move |conn| messages::mark_read(conn, &id, &reader, now_millis()))
            .await
    }
}
