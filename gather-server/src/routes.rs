//! REST surface for chats and messages.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

use crate::app::AppContext;
use crate::error::{ChatError, ChatResult};
use crate::identity::credential_from_headers;
use crate::ids::{ChatId, MessageId, PostId, UserId};
use crate::models::input::{CreateGroupChatInput, SendMessageInput, StartPrivateChatInput};

pub struct ChatRoutes;

impl ChatRoutes {
    pub fn routes(ctx: Arc<AppContext>) -> Router {
        Router::new()
            .route("/health", get(Self::handle_health))
            .route("/chats", get(Self::handle_user_chats))
            .route("/chats/private", post(Self::handle_start_private))
            .route("/chats/group", post(Self::handle_create_group))
            .route("/chats/join/:post_id", post(Self::handle_join_post_chat))
            .route("/chats/post/:post_id", get(Self::handle_chat_by_post))
            .route("/chats/:chat_id", get(Self::handle_get_chat))
            .route(
                "/chats/:chat_id/messages",
                get(Self::handle_list_messages).post(Self::handle_send_message),
            )
            .route("/messages/:message_id/read", put(Self::handle_mark_read))
            .with_state(ctx)
    }

    /// Caller identity from `Authorization: Bearer` or `x-auth-token`
    fn authenticate(headers: &HeaderMap, ctx: &AppContext) -> ChatResult<UserId> {
        let credential = credential_from_headers(headers).ok_or_else(|| {
            ChatError::Unauthenticated("No token, authorization denied".to_string())
        })?;
        ctx.verifier.verify(&credential)
    }

    fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ChatResult<T> {
        payload
            .map(|Json(value)| value)
            .map_err(|rejection| ChatError::InvalidArgument(rejection.body_text()))
    }

    async fn handle_health(State(ctx): State<Arc<AppContext>>) -> Response {
        Json(json!({
            "status": "ok",
            "connections": ctx.rooms.connection_count(),
        }))
        .into_response()
    }

    /// POST /chats/private
    async fn handle_start_private(
        State(ctx): State<Arc<AppContext>>,
        headers: HeaderMap,
        payload: Result<Json<StartPrivateChatInput>, JsonRejection>,
    ) -> Result<Response, ChatError> {
        let caller = Self::authenticate(&headers, &ctx)?;
        let input = Self::body(payload)?;
        let chat = ctx.chats.start_private_chat(&caller, input).await?;
        let status = if chat.created {
            StatusCode::CREATED
        } else {
            StatusCode::OK
        };
        Ok((status, Json(chat.value)).into_response())
    }

    /// POST /chats/group
    async fn handle_create_group(
        State(ctx): State<Arc<AppContext>>,
        headers: HeaderMap,
        payload: Result<Json<CreateGroupChatInput>, JsonRejection>,
    ) -> Result<Response, ChatError> {
        let caller = Self::authenticate(&headers, &ctx)?;
        let input = Self::body(payload)?;
        let chat = ctx.chats.create_group_chat(&caller, input).await?;
        Ok((StatusCode::CREATED, Json(chat)).into_response())
    }

    /// POST /chats/join/:post_id
    async fn handle_join_post_chat(
        State(ctx): State<Arc<AppContext>>,
        headers: HeaderMap,
        Path(post_id): Path<String>,
    ) -> Result<Response, ChatError> {
        let caller = Self::authenticate(&headers, &ctx)?;
        let joined = ctx
            .membership
            .join_interest_group(&caller, &PostId::from(post_id))
            .await?;
        Ok(Json(json!({ "msg": "Joined interest group", "chat": joined.chat })).into_response())
    }

    /// GET /chats
    async fn handle_user_chats(
        State(ctx): State<Arc<AppContext>>,
        headers: HeaderMap,
    ) -> Result<Response, ChatError> {
        let caller = Self::authenticate(&headers, &ctx)?;
        let chats = ctx.chats.get_user_chats(&caller).await?;
        Ok(Json(chats).into_response())
    }

    async fn handle_chat_by_post(
        State(ctx): State<Arc<AppContext>>,
        headers: HeaderMap,
        Path(post_id): Path<String>,
    ) -> Result<Response, ChatError> {
        let caller = Self::authenticate(&headers, &ctx)?;
        let chat = ctx
            .chats
            .get_chat_by_post(&caller, &PostId::from(post_id))
            .await?;
        Ok(Json(chat).into_response())
    }

    async fn handle_get_chat(
        State(ctx): State<Arc<AppContext>>,
        headers: HeaderMap,
        Path(chat_id): Path<String>,
    ) -> Result<Response, ChatError> {
        let caller = Self::authenticate(&headers, &ctx)?;
        let chat = ctx.chats.get_chat(&caller, &ChatId::from(chat_id)).await?;
        Ok(Json(chat).into_response())
    }

    /// GET /chats/:chat_id/messages
    async fn handle_list_messages(
        State(ctx): State<Arc<AppContext>>,
        headers: HeaderMap,
        Path(chat_id): Path<String>,
    ) -> Result<Response, ChatError> {
        let caller = Self::authenticate(&headers, &ctx)?;
        let messages = ctx
            .messages
            .list_messages(&caller, &ChatId::from(chat_id))
            .await?;
        Ok(Json(messages).into_response())
    }

    /// POST /chats/:chat_id/messages
    ///
    /// Fallback for clients without a live connection. Goes through the same
    /// service call as the gateway, so the message is also broadcast.
    async fn handle_send_message(
        State(ctx): State<Arc<AppContext>>,
        headers: HeaderMap,
        Path(chat_id): Path<String>,
        payload: Result<Json<SendMessageInput>, JsonRejection>,
    ) -> Result<Response, ChatError> {
        let caller = Self::authenticate(&headers, &ctx)?;
        let input = Self::body(payload)?;
        let message = ctx
            .messages
            .send_message(&caller, &ChatId::from(chat_id), input)
            .await?;
        Ok((StatusCode::CREATED, Json(message)).into_response())
    }

    /// PUT /messages/:message_id/read
    async fn handle_mark_read(
        State(ctx): State<Arc<AppContext>>,
        headers: HeaderMap,
        Path(message_id): Path<String>,
    ) -> Result<Response, ChatError> {
        let caller = Self::authenticate(&headers, &ctx)?;
        ctx.messages
            .mark_message_read(&caller, &MessageId::from(message_id))
            .await?;
        Ok(Json(json!({ "msg": "Message marked as read." })).into_response())
    }
}
