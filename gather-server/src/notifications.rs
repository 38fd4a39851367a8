//! Notification sink the chat subsystem pushes into.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::error::ChatResult;
use crate::ids::UserId;
use crate::messages::WsEvent;
use crate::state::{user_room, RoomRegistry};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub recipient: UserId,
    pub sender: UserId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    /// The chat the notification points at.
    pub related_entity_id: Option<String>,
    pub created_at: i64,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: Notification) -> ChatResult<()>;
}

/// Delivers notifications to the recipient's personal room.
pub struct RoomNotifier {
    rooms: Arc<RoomRegistry>,
}

impl RoomNotifier {
    pub fn new(rooms: Arc<RoomRegistry>) -> Self {
        Self { rooms }
    }
}

#[async_trait]
impl NotificationSink for RoomNotifier {
    async fn notify(&self, notification: Notification) -> ChatResult<()> {
        let room = user_room(&notification.recipient);
        let recipient = notification.recipient.clone();
        let delivered = self
            .rooms
            .publish(&room, &WsEvent::NewNotification(notification));
        debug!(user_id = %recipient, delivered, "Notification pushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_notification_reaches_personal_room() {
        let rooms = Arc::new(RoomRegistry::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        rooms.register(UserId::from("bob"), tx);

        let notifier = RoomNotifier::new(rooms.clone());
        notifier
            .notify(Notification {
                recipient: UserId::from("bob"),
                sender: UserId::from("alice"),
                kind: NotificationKind::NewMessage,
                message: "alice sent you a message".to_string(),
                related_entity_id: Some("c1".to_string()),
                created_at: 1,
            })
            .await
            .unwrap();

        let frame: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["event"], "newNotification");
        assert_eq!(frame["data"]["type"], "new_message");
        assert_eq!(frame["data"]["relatedEntityId"], "c1");
    }
}
