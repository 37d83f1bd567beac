//! Message consumer
//!
//! Drains the shared queue, logging each message and answering the
//! `ping` mention trigger.

use cordlink_discord::{DiscordClient, DiscordMessage, Message, MessageType};
use tokio::sync::mpsc;

/// Word that, following a mention of the bot, gets a reply
const PING_TRIGGER: &str = "ping";

pub async fn run(client: DiscordClient, mut messages: mpsc::Receiver<DiscordMessage>) {
    while let Some(message) = messages.recv().await {
        tracing::info!(
            "[{}] #{} {}: {}",
            message.message_type(),
            message.channel(),
            message.user_name(),
            message.message()
        );

        if client.is_me(&message) {
            continue;
        }

        if let Some(reply) = reply_for(&message) {
            if let Err(e) = client.send_message(&message.channel(), &reply).await {
                tracing::warn!("Failed to reply in {}: {}", message.channel(), e);
            }
        }
    }
}

/// Reply owed to `message`, if any
pub fn reply_for(message: &dyn Message) -> Option<String> {
    if message.message_type() != MessageType::Create {
        return None;
    }

    let (matched, _) = message.is_mention_trigger(PING_TRIGGER);
    matched.then(|| "pong".to_string())
}
