use std::sync::Arc;
use tracing::{info, warn};

use super::chats::ChatDirectory;
use super::now_millis;
use crate::error::{ChatError, ChatResult};
use crate::ids::{PostId, UserId};
use crate::models::ChatView;
use crate::posts::PostDirectory;

#[derive(Debug, Clone)]
pub struct JoinedGroup {
    pub chat: ChatView,
    /// The post chat was created by this join.
    pub created: bool,
    pub interest_added: bool,
}

/// Keeps post interest and post-chat membership in step.
///
/// Order is fixed: chat membership first, then the post's interested-user
/// list. Both steps are idempotent, so retrying after a failure in the
/// second step converges.
pub struct MembershipSynchronizer {
    chats: Arc<ChatDirectory>,
    posts: Arc<dyn PostDirectory>,
}

impl MembershipSynchronizer {
    pub fn new(chats: Arc<ChatDirectory>, posts: Arc<dyn PostDirectory>) -> Self {
        Self { chats, posts }
    }

    /// Join the interest group of an event post.
    pub async fn join_interest_group(&self, caller: &UserId, post_id: &PostId) -> ChatResult<JoinedGroup> {
        let joined = self.chats.join_or_create_post_chat(caller, post_id).await?;

        let interest_added = match self.posts.add_interested_user(post_id, caller).await {
            Ok(added) => added,
            Err(e) => {
                warn!(
                    post_id = %post_id,
                    user_id = %caller,
                    chat_id = %joined.value.id,
                    error = %e,
                    "Joined post chat but failed to record interest"
                );
                return Err(e);
            }
        };

        Ok(JoinedGroup {
            chat: joined.value,
            created: joined.created,
            interest_added,
        })
    }

    /// Hook for the post collaborator's "mark interested" action.
    pub async fn mark_interested(&self, caller: &UserId, post_id: &PostId) -> ChatResult<JoinedGroup> {
        let post = self
            .posts
            .find_post(post_id)
            .await?
            .filter(|post| post.is_event)
            .ok_or_else(|| ChatError::NotFound("Event post not found.".to_string()))?;
        if post.has_started(now_millis()) {
            return Err(ChatError::InvalidArgument(
                "Cannot mark interest after the event has started.".to_string(),
            ));
        }

        let joined = self.join_interest_group(caller, post_id).await?;
        info!(post_id = %post_id, user_id = %caller, chat_id = %joined.chat.id, "Marked interested");
        Ok(joined)
    }
}
