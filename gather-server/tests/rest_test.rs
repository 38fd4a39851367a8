//! REST surface tests driven through the router with `oneshot`.

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use gather_server::identity::JwtVerifier;
use gather_server::ids::UserId;
use gather_server::{AppContext, ChatRoutes};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "rest-test-secret";

async fn setup() -> (Arc<AppContext>, Router) {
    let ctx = Arc::new(AppContext::in_memory(SECRET).unwrap());
    for (id, name) in [("alice", "Alice"), ("bob", "Bob"), ("carol", "Carol"), ("mallory", "Mallory"), ("author", "Author")] {
        ctx.seed_user(id, name).await.unwrap();
    }
    ctx.seed_event("p1", "author", "Sunday picnic", None).await.unwrap();
    let router = ChatRoutes::routes(ctx.clone());
    (ctx, router)
}

fn token(user_id: &str) -> String {
    JwtVerifier::new(SECRET)
        .issue(&UserId::from(user_id), 3600)
        .unwrap()
}

async fn call(router: &Router, method: Method, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("Authorization", format!("Bearer {}", token(user)));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn start_private(router: &Router, caller: &str, recipient: &str) -> String {
    let (_, chat) = call(
        router,
        Method::POST,
        "/chats/private",
        Some(caller),
        Some(json!({ "recipientId": recipient })),
    )
    .await;
    chat["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_is_public() {
    let (_, router) = setup().await;
    let (status, body) = call(&router, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 0);
}

#[tokio::test]
async fn test_requests_without_token_are_unauthenticated() {
    let (_, router) = setup().await;
    let (status, body) = call(&router, Method::GET, "/chats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["msg"], "No token, authorization denied");
}

#[tokio::test]
async fn test_x_auth_token_header_is_accepted() {
    let (_, router) = setup().await;
    let request = Request::builder()
        .uri("/chats")
        .header("x-auth-token", token("alice"))
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_private_chat_created_then_reused() {
    let (_, router) = setup().await;
    let body = json!({ "recipientId": "bob" });

    let (status, first) = call(&router, Method::POST, "/chats/private", Some("alice"), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["isGroupChat"], false);
    assert_eq!(first["participants"].as_array().unwrap().len(), 2);

    let body = json!({ "recipientId": "alice" });
    let (status, second) = call(&router, Method::POST, "/chats/private", Some("bob"), Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["id"], second["id"]);
}

#[tokio::test]
async fn test_private_chat_validation_envelope() {
    let (_, router) = setup().await;

    let (status, body) = call(&router, Method::POST, "/chats/private", Some("alice"), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "Recipient ID is required.");

    let (status, body) = call(
        &router,
        Method::POST,
        "/chats/private",
        Some("alice"),
        Some(json!({ "recipientId": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "Cannot start a chat with yourself.");
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let (_, router) = setup().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/chats/group")
        .header("Authorization", format!("Bearer {}", token("alice")))
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_group_chat_creation() {
    let (_, router) = setup().await;
    let (status, chat) = call(
        &router,
        Method::POST,
        "/chats/group",
        Some("alice"),
        Some(json!({ "participantIds": ["bob", "carol"], "groupName": "Hikers" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(chat["isGroupChat"], true);
    assert_eq!(chat["groupName"], "Hikers");
    assert_eq!(chat["participants"].as_array().unwrap().len(), 3);

    let (status, body) = call(
        &router,
        Method::POST,
        "/chats/group",
        Some("alice"),
        Some(json!({ "participantIds": ["bob", "ghost"], "groupName": "Hikers" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["msg"], "One or more participant IDs are invalid.");
}

#[tokio::test]
async fn test_send_list_and_mark_read() {
    let (_, router) = setup().await;
    let chat_id = start_private(&router, "alice", "bob").await;
    let messages_uri = format!("/chats/{}/messages", chat_id);

    let (status, sent) = call(
        &router,
        Method::POST,
        &messages_uri,
        Some("alice"),
        Some(json!({ "content": "hi", "type": "text" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sent["readBy"], json!(["alice"]));

    let (status, history) = call(&router, Method::GET, &messages_uri, Some("bob"), None).await;
    assert_eq!(status, StatusCode::OK);
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["content"], "hi");
    assert_eq!(history[0]["sender"]["id"], "alice");

    let read_uri = format!("/messages/{}/read", sent["id"].as_str().unwrap());
    for _ in 0..2 {
        let (status, body) = call(&router, Method::PUT, &read_uri, Some("bob"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["msg"], "Message marked as read.");
    }

    let (_, history) = call(&router, Method::GET, &messages_uri, Some("alice"), None).await;
    assert_eq!(history[0]["readBy"], json!(["alice", "bob"]));

    let (_, chats) = call(&router, Method::GET, "/chats", Some("bob"), None).await;
    assert_eq!(chats[0]["lastMessage"]["content"], "hi");
}

#[tokio::test]
async fn test_outsider_gets_forbidden_not_data() {
    let (_, router) = setup().await;
    let chat_id = start_private(&router, "alice", "bob").await;
    let messages_uri = format!("/chats/{}/messages", chat_id);

    let (status, body) = call(&router, Method::GET, &messages_uri, Some("mallory"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["msg"], "Unauthorized access to chat.");

    let (status, _) = call(
        &router,
        Method::POST,
        &messages_uri,
        Some("mallory"),
        Some(json!({ "content": "hey" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&router, Method::GET, &format!("/chats/{}", chat_id), Some("mallory"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(&router, Method::GET, "/chats/nope/messages", Some("alice"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["msg"], "Chat room not found.");
}

#[tokio::test]
async fn test_blank_text_is_rejected_without_mutation() {
    let (_, router) = setup().await;
    let chat_id = start_private(&router, "alice", "bob").await;

    let (status, body) = call(
        &router,
        Method::POST,
        &format!("/chats/{}/messages", chat_id),
        Some("alice"),
        Some(json!({ "content": "  ", "type": "text" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "Message content is required.");

    let (_, chat) = call(&router, Method::GET, &format!("/chats/{}", chat_id), Some("alice"), None).await;
    assert!(chat["lastMessage"].is_null());
}

#[tokio::test]
async fn test_join_post_chat_and_lookup_by_post() {
    let (ctx, router) = setup().await;

    let (status, body) = call(&router, Method::POST, "/chats/join/p1", Some("bob"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["msg"], "Joined interest group");
    assert_eq!(body["chat"]["groupName"], "Sunday picnic");
    assert_eq!(body["chat"]["postId"], "p1");

    let (_, again) = call(&router, Method::POST, "/chats/join/p1", Some("bob"), None).await;
    assert_eq!(again["chat"]["id"], body["chat"]["id"]);
    assert_eq!(again["chat"]["participants"].as_array().unwrap().len(), 2);

    let (status, chat) = call(&router, Method::GET, "/chats/post/p1", Some("author"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chat["id"], body["chat"]["id"]);

    let (status, _) = call(&router, Method::GET, "/chats/post/p1", Some("carol"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&router, Method::POST, "/chats/join/missing", Some("bob"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let interested = ctx.posts.interested_users(&"p1".into()).await.unwrap();
    assert_eq!(interested, vec![UserId::from("bob")]);
}

#[tokio::test]
async fn test_rest_send_is_broadcast_to_room() {
    let (ctx, router) = setup().await;
    let chat_id = start_private(&router, "alice", "bob").await;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let conn = ctx.rooms.register(UserId::from("bob"), tx);
    ctx.rooms.subscribe(conn, format!("chat:{}", chat_id));

    let (status, _) = call(
        &router,
        Method::POST,
        &format!("/chats/{}/messages", chat_id),
        Some("alice"),
        Some(json!({ "content": "from rest" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
    assert_eq!(frame["event"], "receiveMessage");
    assert_eq!(frame["data"]["content"], "from rest");
}
