//! Event normalizer
//!
//! Every shard gets a `ShardHandler` sharing one bounded sender. Create,
//! update and delete notifications are filtered, wrapped in a
//! `DiscordMessage` and queued for the consumer.

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::client::DiscordClient;
use crate::message::DiscordMessage;
use crate::types::{MessageType, RawMessage, UserInfo};

/// Capacity of the queue between the shards and the consumer
pub const MESSAGE_QUEUE_CAPACITY: usize = 200;

/// Message callbacks registered on a single shard
#[derive(Clone)]
pub struct ShardHandler {
    client: DiscordClient,
    tx: mpsc::Sender<DiscordMessage>,
}

impl ShardHandler {
    pub(crate) fn new(client: DiscordClient, tx: mpsc::Sender<DiscordMessage>) -> Self {
        Self { client, tx }
    }

    /// Whether an event of `kind` carrying `raw` reaches the consumer
    pub fn accepts(&self, raw: &RawMessage, kind: MessageType) -> bool {
        if kind == MessageType::Delete {
            return true;
        }

        if raw.content.is_empty() {
            return false;
        }

        match &raw.author {
            Some(author) if author.bot => self.client.allow_bots(),
            _ => true,
        }
    }

    /// Filter and enqueue one event.
    ///
    /// Waits while the queue is full. serenity runs every event on its own
    /// task, so a full queue does not stall the shard: each further event
    /// parks one more task here until the consumer catches up. Returns
    /// whether a message was queued.
    pub async fn dispatch(&self, mut raw: RawMessage, kind: MessageType) -> bool {
        if !self.accepts(&raw, kind) {
            return false;
        }

        raw.from_gateway = true;

        let message = DiscordMessage::new(self.client.clone(), raw, kind);
        if self.tx.send(message).await.is_err() {
            debug!("Message receiver dropped, discarding {} event", kind);
            return false;
        }

        true
    }

    pub async fn on_message_create(&self, raw: RawMessage) -> bool {
        self.dispatch(raw, MessageType::Create).await
    }

    pub async fn on_message_update(&self, raw: RawMessage) -> bool {
        self.dispatch(raw, MessageType::Update).await
    }

    pub async fn on_message_delete(&self, raw: RawMessage) -> bool {
        self.dispatch(raw, MessageType::Delete).await
    }

    pub fn on_ready(&self, user: UserInfo) {
        info!("{} ({}) is connected to Discord", user.name, user.id);
        self.client.record_user(user);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientSettings;
    use crate::message::Message;
    use crate::testing::{author, raw_message};
    use serenity::all::{ChannelId, MessageId, MessageUpdateEvent};
    use std::time::Duration;

    fn handler(allow_bots: bool, capacity: usize) -> (ShardHandler, mpsc::Receiver<DiscordMessage>) {
        let settings = ClientSettings::new("token", "1", "2").allow_bots(allow_bots);
        let client = DiscordClient::with_settings(settings);
        let (tx, rx) = mpsc::channel(capacity);
        (ShardHandler::new(client, tx), rx)
    }

    #[tokio::test]
    async fn test_create_enqueues_one_message() {
        let (handler, mut rx) = handler(false, MESSAGE_QUEUE_CAPACITY);

        assert!(handler.on_message_create(raw_message(10, "hello")).await);

        let message = rx.recv().await.unwrap();
        assert_eq!(message.message_type(), MessageType::Create);
        assert_eq!(message.raw_message(), "hello");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_update_is_tagged_update() {
        let (handler, mut rx) = handler(false, MESSAGE_QUEUE_CAPACITY);

        assert!(handler.on_message_update(raw_message(10, "edited")).await);
        assert_eq!(rx.recv().await.unwrap().message_type(), MessageType::Update);
    }

    #[tokio::test]
    async fn test_empty_content_is_dropped() {
        let (handler, mut rx) = handler(true, MESSAGE_QUEUE_CAPACITY);

        assert!(!handler.on_message_create(raw_message(10, "")).await);
        assert!(!handler.on_message_update(raw_message(10, "")).await);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_bot_author_dropped_unless_allowed() {
        let mut raw = raw_message(10, "beep");
        raw.author = Some(author(99, "robot", true));

        let (strict, mut strict_rx) = handler(false, MESSAGE_QUEUE_CAPACITY);
        assert!(!strict.on_message_create(raw.clone()).await);
        assert!(strict_rx.try_recv().is_err());

        let (lenient, mut lenient_rx) = handler(true, MESSAGE_QUEUE_CAPACITY);
        assert!(lenient.on_message_create(raw).await);
        assert!(lenient_rx.recv().await.unwrap().is_bot());
    }

    #[tokio::test]
    async fn test_delete_is_never_filtered() {
        let (handler, mut rx) = handler(false, MESSAGE_QUEUE_CAPACITY);
        let raw = RawMessage::deleted(ChannelId::new(5), MessageId::new(6), None);

        assert!(handler.on_message_delete(raw).await);

        let message = rx.recv().await.unwrap();
        assert_eq!(message.message_type(), MessageType::Delete);
        assert_eq!(message.message_id(), "6");
        assert_eq!(message.user_id(), "");
    }

    #[tokio::test]
    async fn test_full_queue_applies_backpressure() {
        let (handler, mut rx) = handler(false, 1);

        assert!(handler.on_message_create(raw_message(10, "first")).await);

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            handler.on_message_create(raw_message(10, "second")),
        )
        .await;
        assert!(blocked.is_err(), "send should wait while the queue is full");

        assert_eq!(rx.recv().await.unwrap().raw_message(), "first");
        assert!(handler.on_message_create(raw_message(10, "third")).await);
        assert_eq!(rx.recv().await.unwrap().raw_message(), "third");
    }

    #[tokio::test]
    async fn test_full_queue_parks_every_waiting_event() {
        let (handler, mut rx) = handler(false, 1);
        assert!(handler.on_message_create(raw_message(10, "first")).await);

        let waiting: Vec<_> = ["second", "third"]
            .into_iter()
            .map(|content| {
                let handler = handler.clone();
                tokio::spawn(async move { handler.on_message_create(raw_message(10, content)).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(waiting.iter().all(|task| !task.is_finished()));

        let mut received = Vec::new();
        for _ in 0..3 {
            received.push(rx.recv().await.unwrap().raw_message().to_string());
        }
        for task in waiting {
            assert!(task.await.unwrap());
        }

        received.sort();
        assert_eq!(received, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_partial_update_is_dropped() {
        let (handler, mut rx) = handler(true, MESSAGE_QUEUE_CAPACITY);
        let event: MessageUpdateEvent = serde_json::from_value(serde_json::json!({
            "id": "1101",
            "channel_id": "200"
        }))
        .unwrap();
        let raw = RawMessage::from(&event);

        let message = DiscordMessage::new(handler.client.clone(), raw.clone(), MessageType::Update);
        assert!(matches!(
            message.timestamp(),
            Err(crate::error::DiscordError::MissingTimestamp)
        ));

        assert!(!handler.on_message_update(raw).await);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_queued_messages_are_marked_gateway() {
        let (handler, mut rx) = handler(false, MESSAGE_QUEUE_CAPACITY);
        let mut raw = raw_message(10, "hello");
        raw.from_gateway = false;

        assert!(handler.on_message_create(raw).await);
        assert!(rx.recv().await.unwrap().raw().from_gateway);
    }

    #[tokio::test]
    async fn test_dropped_receiver_discards() {
        let (handler, rx) = handler(false, MESSAGE_QUEUE_CAPACITY);
        drop(rx);
        assert!(!handler.on_message_create(raw_message(10, "lost")).await);
    }

    #[tokio::test]
    async fn test_ready_records_user() {
        let (handler, _rx) = handler(false, MESSAGE_QUEUE_CAPACITY);
        handler.on_ready(UserInfo {
            id: serenity::all::UserId::new(77),
            name: "cordbot".to_string(),
        });
        assert_eq!(handler.client.user_id(), "77");
        assert_eq!(handler.client.user_name(), "cordbot");
    }
}
