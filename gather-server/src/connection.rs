use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header, HeaderValue, StatusCode};
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::app::AppContext;
use crate::error::{ChatError, ErrorBody};
use crate::identity::{credential_from_headers, credential_from_query};
use crate::ids::{ChatId, UserId};
use crate::messages::WsEvent;
use crate::models::input::SendMessageInput;
use crate::state::{chat_room, ConnectionId};

/// Real-time gateway: authenticates upgrades, keeps room subscriptions and
/// relays inbound sends through the message service.
pub struct Gateway {
    ctx: Arc<AppContext>,
    handshake_timeout: Duration,
}

impl Gateway {
    pub fn new(ctx: Arc<AppContext>, handshake_timeout: Duration) -> Self {
        Self {
            ctx,
            handshake_timeout,
        }
    }

    /// Accept connections until the listener fails permanently.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    debug!(peer = %peer_addr, "New connection");
                    let gateway = self.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, gateway).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    /// Run one inbound send and report a failure to the originating
    /// connection only. Success is delivered by the room broadcast.
    pub async fn relay_send(
        &self,
        user_id: &UserId,
        conn_id: ConnectionId,
        chat_id: ChatId,
        input: SendMessageInput,
    ) {
        match self.ctx.messages.send_message(user_id, &chat_id, input).await {
            Ok(message) => {
                debug!(user_id = %user_id, chat_id = %chat_id, message_id = %message.id, "Relayed message");
            }
            Err(e) => {
                warn!(user_id = %user_id, chat_id = %chat_id, error = %e, "Send failed");
                let event = WsEvent::SendMessageError {
                    reason: e.client_message(),
                    chat_id: Some(chat_id),
                };
                if !self.ctx.rooms.send_to(conn_id, &event) {
                    debug!(user_id = %user_id, "Sender gone before error delivery");
                }
            }
        }
    }

    /// Subscribe a fresh connection to every chat its user belongs to.
    async fn subscribe_snapshot(&self, user_id: &UserId, conn_id: ConnectionId) -> Result<(), ChatError> {
        for chat_id in self.ctx.chats.chat_ids_for(user_id).await? {
            self.ctx.rooms.subscribe(conn_id, chat_room(&chat_id));
        }
        Ok(())
    }
}

fn reject(err: &ChatError) -> ErrorResponse {
    let body = serde_json::to_string(&ErrorBody {
        msg: err.client_message(),
    })
    .ok();
    let mut response = ErrorResponse::new(body);
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

/// Handle a single WebSocket connection from upgrade to disconnect.
pub async fn handle_connection(stream: TcpStream, gateway: Arc<Gateway>) {
    let ctx = gateway.ctx.clone();
    let peer = stream.peer_addr().ok();

    // Connecting: the credential is checked inside the upgrade itself, so a
    // rejected client never sees an open socket.
    let mut authenticated: Option<UserId> = None;
    let verifier = ctx.verifier.clone();
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let verified = credential_from_headers(request.headers())
            .or_else(|| credential_from_query(request.uri().query()))
            .ok_or_else(|| ChatError::Unauthenticated("No token, authorization denied".to_string()))
            .and_then(|credential| verifier.verify(&credential));
        match verified {
            Ok(user_id) => {
                authenticated = Some(user_id);
                Ok(response)
            }
            Err(e) => Err(reject(&e)),
        }
    };

    let handshake = tokio::time::timeout(gateway.handshake_timeout, accept_hdr_async(stream, callback)).await;
    let ws_stream = match handshake {
        Ok(Ok(ws_stream)) => ws_stream,
        Ok(Err(e)) => {
            warn!(peer = ?peer, "WebSocket handshake rejected: {}", e);
            return;
        }
        Err(_) => {
            warn!(peer = ?peer, "WebSocket handshake timed out");
            return;
        }
    };
    let Some(user_id) = authenticated else {
        warn!(peer = ?peer, "Handshake completed without an identity");
        return;
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Create channel for sending frames to this client
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let conn_id = ctx.rooms.register(user_id.clone(), tx);

    if let Err(e) = gateway.subscribe_snapshot(&user_id, conn_id).await {
        error!(user_id = %user_id, error = %e, "Failed to load chat rooms");
        ctx.rooms.unregister(conn_id);
        let event = WsEvent::Error {
            message: e.client_message(),
        };
        if let Ok(json) = serde_json::to_string(&event) {
            let _ = ws_sender.send(Message::Text(json.into())).await;
        }
        let _ = ws_sender.close().await;
        return;
    }

    let rooms = ctx.rooms.rooms_of(conn_id);
    info!(user_id = %user_id, conn_id, rooms = rooms.len(), "User connected");
    ctx.rooms.send_to(
        conn_id,
        &WsEvent::Connected {
            user_id: user_id.clone(),
            rooms,
        },
    );

    // Spawn task to forward frames from channel to WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    // Inbound sends run one at a time per connection, in arrival order. The
    // worker outlives a disconnect so queued sends still persist and reach
    // the other subscribers.
    let (send_queue, mut pending) = mpsc::unbounded_channel::<(ChatId, SendMessageInput)>();
    let worker = {
        let gateway = gateway.clone();
        let user_id = user_id.clone();
        tokio::spawn(async move {
            while let Some((chat_id, input)) = pending.recv().await {
                gateway.relay_send(&user_id, conn_id, chat_id, input).await;
            }
        })
    };

    loop {
        tokio::select! {
            res = ws_receiver.next() => {
                match res {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<WsEvent>(&text) {
                            Ok(WsEvent::SendMessage { chat_id, content, message_type }) => {
                                let input = SendMessageInput { content, message_type };
                                if send_queue.send((chat_id, input)).is_err() {
                                    error!(user_id = %user_id, "Send worker stopped");
                                    break;
                                }
                            }
                            Ok(other) => {
                                debug!(user_id = %user_id, event = ?other, "Ignoring server-bound event");
                                ctx.rooms.send_to(conn_id, &WsEvent::Error {
                                    message: "Unsupported event".to_string(),
                                });
                            }
                            Err(e) => {
                                warn!(user_id = %user_id, "Failed to parse frame: {}", e);
                                ctx.rooms.send_to(conn_id, &WsEvent::Error {
                                    message: "Malformed event".to_string(),
                                });
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!(user_id = %user_id, "Client sent close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(user_id = %user_id, "WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        info!(user_id = %user_id, "WebSocket stream ended");
                        break;
                    }
                    _ => {}
                }
            }
            // Write errors end the writer task
            _ = &mut send_task => {
                info!(user_id = %user_id, "Writer finished (likely connection lost)");
                break;
            }
        }
    }

    // Disconnected: only live subscriptions go away
    drop(send_queue);
    ctx.rooms.unregister(conn_id);
    send_task.abort();
    drop(worker);

    info!(user_id = %user_id, conn_id, "User disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::input::StartPrivateChatInput;

    fn user(id: &str) -> UserId {
        UserId::from(id)
    }

    #[test]
    fn test_rejection_carries_json_envelope() {
        let response = reject(&ChatError::Unauthenticated("Token is not valid".to_string()));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: ErrorBody = serde_json::from_str(response.body().as_deref().unwrap()).unwrap();
        assert_eq!(body.msg, "Token is not valid");
    }

    #[tokio::test]
    async fn test_relay_failure_goes_to_origin_only() {
        let ctx = Arc::new(AppContext::in_memory("test-secret").unwrap());
        ctx.seed_user("alice", "Alice").await.unwrap();
        ctx.seed_user("bob", "Bob").await.unwrap();
        let chat = ctx
            .chats
            .start_private_chat(
                &user("alice"),
                StartPrivateChatInput {
                    recipient_id: Some("bob".to_string()),
                },
            )
            .await
            .unwrap()
            .value;

        let (alice_tx, mut alice_rx) = mpsc::unbounded_channel();
        let (bob_tx, mut bob_rx) = mpsc::unbounded_channel();
        let alice_conn = ctx.rooms.register(user("alice"), alice_tx);
        let bob_conn = ctx.rooms.register(user("bob"), bob_tx);
        ctx.rooms.subscribe(alice_conn, chat_room(&chat.id));
        ctx.rooms.subscribe(bob_conn, chat_room(&chat.id));

        let gateway = Gateway::new(ctx.clone(), Duration::from_secs(1));
        gateway
            .relay_send(&user("alice"), alice_conn, chat.id.clone(), SendMessageInput::text("   "))
            .await;

        let frame: serde_json::Value = serde_json::from_str(&alice_rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["event"], "sendMessageError");
        assert_eq!(frame["data"]["reason"], "Message content is required.");
        assert_eq!(frame["data"]["chatId"], chat.id.as_str());
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_relay_success_reaches_every_subscriber() {
        let ctx = Arc::new(AppContext::in_memory("test-secret").unwrap());
        ctx.seed_user("alice", "Alice").await.unwrap();
        ctx.seed_user("bob", "Bob").await.unwrap();
        let chat = ctx
            .chats
            .start_private_chat(
                &user("alice"),
                StartPrivateChatInput {
                    recipient_id: Some("bob".to_string()),
                },
            )
            .await
            .unwrap()
            .value;

        // Alice on two devices
        let (phone_tx, mut phone_rx) = mpsc::unbounded_channel();
        let (laptop_tx, mut laptop_rx) = mpsc::unbounded_channel();
        let phone = ctx.rooms.register(user("alice"), phone_tx);
        let laptop = ctx.rooms.register(user("alice"), laptop_tx);
        ctx.rooms.subscribe(phone, chat_room(&chat.id));
        ctx.rooms.subscribe(laptop, chat_room(&chat.id));

        let gateway = Gateway::new(ctx.clone(), Duration::from_secs(1));
        gateway
            .relay_send(&user("alice"), phone, chat.id.clone(), SendMessageInput::text("hi"))
            .await;

        for rx in [&mut phone_rx, &mut laptop_rx] {
            let frame: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
            assert_eq!(frame["event"], "receiveMessage");
            assert_eq!(frame["data"]["sender"]["username"], "Alice");
        }
    }
}
