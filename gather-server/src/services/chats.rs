use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::locks::ChatLocks;
use super::now_millis;
use crate::db::Database;
use crate::error::{ChatError, ChatResult};
use crate::ids::{ChatId, MessageId, PostId, UserId};
use crate::models::input::{CreateGroupChatInput, StartPrivateChatInput, ValidateExt};
use crate::models::{Chat, ChatView, Created, Message};
use crate::posts::PostDirectory;
use crate::state::{chat_room, RoomRegistry};
use crate::store::{chats, messages};
use crate::users::{summaries, summary_or_placeholder, UserDirectory};

pub(crate) const CHAT_NOT_FOUND: &str = "Chat room not found.";
pub(crate) const ACCESS_DENIED: &str = "Unauthorized access to chat.";

/// Load a chat or fail with `NotFound`.
pub(crate) async fn require_chat(db: &Database, chat_id: &ChatId) -> ChatResult<Chat> {
    if chat_id.is_blank() {
        return Err(ChatError::InvalidArgument("Chat ID is required.".to_string()));
    }
    let id = chat_id.clone();
    db.read(move |conn| chats::find_chat(conn, &id))
        .await?
        .ok_or_else(|| ChatError::NotFound(CHAT_NOT_FOUND.to_string()))
}

/// Chat lifecycle: private pairs, groups and post-bound event chats.
pub struct ChatDirectory {
    db: Arc<Database>,
    users: Arc<dyn UserDirectory>,
    posts: Arc<dyn PostDirectory>,
    rooms: Arc<RoomRegistry>,
    locks: Arc<ChatLocks>,
}

impl ChatDirectory {
    pub fn new(
        db: Arc<Database>,
        users: Arc<dyn UserDirectory>,
        posts: Arc<dyn PostDirectory>,
        rooms: Arc<RoomRegistry>,
        locks: Arc<ChatLocks>,
    ) -> Self {
        Self {
            db,
            users,
            posts,
            rooms,
            locks,
        }
    }

    /// Find-or-create the private chat between the caller and the recipient.
    pub async fn start_private_chat(
        &self,
        caller: &UserId,
        input: StartPrivateChatInput,
    ) -> ChatResult<Created<ChatView>> {
        input.validate_input()?;
        let recipient = input
            .recipient_id
            .map(UserId::new)
            .filter(|id| !id.is_blank())
            .ok_or_else(|| ChatError::InvalidArgument("Recipient ID is required.".to_string()))?;
        if &recipient == caller {
            return Err(ChatError::InvalidArgument(
                "Cannot start a chat with yourself.".to_string(),
            ));
        }
        if self.users.find_users(std::slice::from_ref(&recipient)).await?.is_empty() {
            return Err(ChatError::NotFound("User not found.".to_string()));
        }

        let _guard = self.locks.pair(caller, &recipient).await;
        let (a, b) = (caller.clone(), recipient.clone());
        let (chat, created) = self
            .db
            .call(move |conn| chats::find_or_create_private_chat(conn, &a, &b, now_millis()))
            .await?;
        if created {
            self.subscribe_participants(&chat);
            info!(chat_id = %chat.id, user_id = %caller, recipient = %recipient, "Private chat created");
        }

        let value = self.resolve_one(chat).await?;
        Ok(Created { value, created })
    }

    pub async fn create_group_chat(
        &self,
        caller: &UserId,
        input: CreateGroupChatInput,
    ) -> ChatResult<ChatView> {
        input.validate_input()?;

        let mut participants: Vec<UserId> = Vec::with_capacity(input.participant_ids.len() + 1);
        for id in input.participant_ids.iter().map(UserId::new) {
            if !id.is_blank() && !participants.contains(&id) {
                participants.push(id);
            }
        }
        if participants.len() < 2 {
            return Err(ChatError::InvalidArgument(
                "At least two participant IDs are required.".to_string(),
            ));
        }
        let group_name = input.group_name.trim().to_string();
        if group_name.is_empty() {
            return Err(ChatError::InvalidArgument("Group name is required.".to_string()));
        }
        if !participants.contains(caller) {
            participants.push(caller.clone());
        }

        let found = self.users.find_users(&participants).await?;
        if found.len() != participants.len() {
            return Err(ChatError::NotFound(
                "One or more participant IDs are invalid.".to_string(),
            ));
        }

        let chat = self
            .db
            .call(move |conn| chats::create_group_chat(conn, &participants, &group_name, now_millis()))
            .await?;
        self.subscribe_participants(&chat);
        info!(
            chat_id = %chat.id,
            user_id = %caller,
            participants = chat.participants.len(),
            "Group chat created"
        );
        self.resolve_one(chat).await
    }

    /// Join the canonical chat of an event post, creating it on first use.
    ///
    /// The caller's live connections are subscribed to the chat's room before
    /// this returns.
    pub async fn join_or_create_post_chat(
        &self,
        caller: &UserId,
        post_id: &PostId,
    ) -> ChatResult<Created<ChatView>> {
        let post = self
            .posts
            .find_post(post_id)
            .await?
            .filter(|post| post.is_event)
            .ok_or_else(|| ChatError::NotFound("Event post not found.".to_string()))?;

        let (chat, created) = {
            let _guard = self.locks.post(post_id).await;
            // An author opening their own event's chat is its only member
            // until the first interested user joins.
            let members = vec![post.author_id.clone(), caller.clone()];
            let (post_id, title) = (post.id.clone(), post.title.clone());
            self.db
                .call(move |conn| chats::join_post_chat(conn, &post_id, &title, &members, now_millis()))
                .await?
        };

        if created {
            self.subscribe_participants(&chat);
        }
        let subscribed = self.rooms.subscribe_user(caller, &chat_room(&chat.id));
        info!(
            chat_id = %chat.id,
            post_id = %post_id,
            user_id = %caller,
            created,
            subscribed,
            "Joined post chat"
        );

        let value = self.resolve_one(chat).await?;
        Ok(Created { value, created })
    }

    /// Every chat the caller participates in, most recently active first.
    pub async fn get_user_chats(&self, caller: &UserId) -> ChatResult<Vec<ChatView>> {
        let user = caller.clone();
        let found = self
            .db
            .read(move |conn| chats::chats_for_user(conn, &user))
            .await?;
        self.resolve(found).await
    }

    /// Ids of every chat the user participates in. Used for the gateway's
    /// connect-time room snapshot.
    pub async fn chat_ids_for(&self, user_id: &UserId) -> ChatResult<Vec<ChatId>> {
        let user = user_id.clone();
        let found = self
            .db
            .read(move |conn| chats::chats_for_user(conn, &user))
            .await?;
        Ok(found.into_iter().map(|chat| chat.id).collect())
    }

    pub async fn get_chat_by_post(&self, caller: &UserId, post_id: &PostId) -> ChatResult<ChatView> {
        let id = post_id.clone();
        let chat = self
            .db
            .read(move |conn| chats::find_chat_by_post(conn, &id))
            .await?
            .ok_or_else(|| ChatError::NotFound("No chat exists for this post.".to_string()))?;
        chat.ensure_participant(caller, ACCESS_DENIED)?;
        self.resolve_one(chat).await
    }

    pub async fn get_chat(&self, caller: &UserId, chat_id: &ChatId) -> ChatResult<ChatView> {
        let chat = require_chat(&self.db, chat_id).await?;
        chat.ensure_participant(caller, ACCESS_DENIED)?;
        self.resolve_one(chat).await
    }

    /// Put already-connected participants of a new chat into its room.
    fn subscribe_participants(&self, chat: &Chat) {
        let room = chat_room(&chat.id);
        for participant in &chat.participants {
            self.rooms.subscribe_user(participant, &room);
        }
    }

    async fn resolve_one(&self, chat: Chat) -> ChatResult<ChatView> {
        self.resolve(vec![chat])
            .await?
            .pop()
            .ok_or_else(|| ChatError::Internal("chat resolution returned nothing".to_string()))
    }

    /// Resolve participants and last messages with one batch lookup each.
    async fn resolve(&self, found: Vec<Chat>) -> ChatResult<Vec<ChatView>> {
        let last_ids: Vec<MessageId> = found
            .iter()
            .filter_map(|chat| chat.last_message_id.clone())
            .collect();
        let mut last_messages: HashMap<MessageId, Message> = if last_ids.is_empty() {
            HashMap::new()
        } else {
            self.db
                .read(move |conn| messages::find_messages(conn, &last_ids))
                .await?
        };

        let mut user_ids: Vec<UserId> = found
            .iter()
            .flat_map(|chat| chat.participants.iter().cloned())
            .collect();
        user_ids.extend(last_messages.values().map(|m| m.sender_id.clone()));
        let people = summaries(self.users.as_ref(), &user_ids).await?;

        Ok(found
            .into_iter()
            .map(|chat| {
                let last_message = chat
                    .last_message_id
                    .as_ref()
                    .and_then(|id| last_messages.remove(id))
                    .map(|message| {
                        let sender = summary_or_placeholder(&people, &message.sender_id);
                        message.into_view(sender)
                    });
                ChatView {
                    participants: chat
                        .participants
                        .iter()
                        .map(|id| summary_or_placeholder(&people, id))
                        .collect(),
                    id: chat.id,
                    is_group_chat: chat.is_group_chat,
                    group_name: chat.group_name,
                    post_id: chat.post_id,
                    last_message,
                    created_at: chat.created_at,
                    updated_at: chat.updated_at,
                }
            })
            .collect())
    }
}
