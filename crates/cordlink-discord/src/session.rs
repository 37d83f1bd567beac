//! Session and connector traits
//!
//! A `Session` is one open shard: its cache answers the lookup helpers and
//! its HTTP client carries the REST delegations. A `Connector` opens
//! sessions. The serenity-backed implementations live in `connector`.

use std::sync::Arc;

use async_trait::async_trait;
use serenity::all::{ChannelId, CreateEmbed, GuildId, MessageId, Permissions, UserId};

use crate::handler::ShardHandler;
use crate::types::{ChannelInfo, GuildInfo, MemberInfo, RawMessage, UserInfo};
use crate::Result;

/// Position of one shard in the topology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardSpec {
    pub id: u32,
    pub total: u32,
}

/// One connected shard
///
/// Cache reads are synchronous and never fail; `None` means this shard's
/// cache does not hold the record.
#[async_trait]
pub trait Session: Send + Sync {
    fn shard(&self) -> ShardSpec;

    fn current_user(&self) -> Option<UserInfo>;

    fn channel(&self, id: ChannelId) -> Option<ChannelInfo>;

    fn guild(&self, id: GuildId) -> Option<GuildInfo>;

    fn guilds(&self) -> Vec<GuildInfo>;

    fn member(&self, guild_id: GuildId, user_id: UserId) -> Option<MemberInfo>;

    fn user_channel_permissions(&self, user_id: UserId, channel_id: ChannelId)
    -> Option<Permissions>;

    /// Display color of the user's highest colored role
    fn user_color(&self, user_id: UserId, channel_id: ChannelId) -> Option<u32>;

    /// Cached messages of a channel, oldest first
    fn cached_messages(&self, channel_id: ChannelId) -> Vec<RawMessage>;

    async fn send_message(&self, channel_id: ChannelId, content: &str) -> Result<()>;

    async fn send_embed(&self, channel_id: ChannelId, embed: CreateEmbed) -> Result<()>;

    async fn edit_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: &str,
    ) -> Result<()>;

    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId) -> Result<()>;

    async fn send_file(&self, channel_id: ChannelId, name: &str, data: Vec<u8>) -> Result<()>;

    async fn ban(&self, guild_id: GuildId, user_id: UserId) -> Result<()>;

    async fn unban(&self, guild_id: GuildId, user_id: UserId) -> Result<()>;

    async fn typing(&self, channel_id: ChannelId) -> Result<()>;

    async fn create_dm_channel(&self, user_id: UserId) -> Result<ChannelId>;

    /// Guild an invite code points at, if the invite names one
    async fn invite_guild(&self, code: &str) -> Result<Option<GuildId>>;

    async fn accept_invite(&self, code: &str) -> Result<()>;

    async fn fetch_messages(
        &self,
        channel_id: ChannelId,
        limit: u8,
        before: Option<MessageId>,
    ) -> Result<Vec<RawMessage>>;
}

/// Opens shard sessions
#[async_trait]
pub trait Connector: Send + Sync {
    /// Shard count recommended by the gateway
    async fn recommended_shards(&self) -> Result<u32>;

    /// Register `handler` for the shard's events and open it.
    ///
    /// Returns once the shard is ready, or with the error that stopped it.
    async fn connect(&self, shard: ShardSpec, handler: ShardHandler) -> Result<Arc<dyn Session>>;
}
