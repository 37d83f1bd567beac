//! In-memory sessions for unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serenity::all::{ChannelId, ChannelType, CreateEmbed, GuildId, MessageId, Permissions, UserId};
use tokio::sync::mpsc;

use crate::client::{ClientSettings, DiscordClient};
use crate::error::{DiscordError, Result};
use crate::handler::ShardHandler;
use crate::message::DiscordMessage;
use crate::session::{Connector, Session, ShardSpec};
use crate::types::{Author, ChannelInfo, GuildInfo, MemberInfo, RawMessage, UserInfo};

static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1000);

pub fn author(id: u64, name: &str, bot: bool) -> Author {
    Author {
        id: UserId::new(id),
        name: name.to_string(),
        avatar: None,
        bot,
    }
}

/// Message from user 10 ("alice") in a channel
pub fn raw_message_in(channel: u64, guild: Option<u64>, content: &str) -> RawMessage {
    RawMessage {
        id: MessageId::new(NEXT_MESSAGE_ID.fetch_add(1, Ordering::SeqCst)),
        channel_id: ChannelId::new(channel),
        guild_id: guild.map(GuildId::new),
        author: Some(author(10, "alice", false)),
        content: content.to_string(),
        timestamp: Some("2024-05-01T12:30:00Z".to_string()),
        mentions: Vec::new(),
        from_gateway: true,
    }
}

pub fn raw_message(channel: u64, content: &str) -> RawMessage {
    raw_message_in(channel, None, content)
}

pub fn text_channel(id: u64, guild: u64, name: &str) -> ChannelInfo {
    ChannelInfo {
        id: ChannelId::new(id),
        guild_id: Some(GuildId::new(guild)),
        name: name.to_string(),
        kind: ChannelType::Text,
    }
}

pub fn test_guild(id: u64, owner: u64, member_count: u64) -> GuildInfo {
    GuildInfo {
        id: GuildId::new(id),
        name: format!("guild-{}", id),
        owner_id: UserId::new(owner),
        member_count,
        roles: Vec::new(),
    }
}

/// Session backed by plain maps; REST calls are recorded as strings
pub struct FakeSession {
    shard: ShardSpec,
    current_user: Option<UserInfo>,
    channels: HashMap<ChannelId, ChannelInfo>,
    guilds: Vec<GuildInfo>,
    members: HashMap<(GuildId, UserId), MemberInfo>,
    permissions: HashMap<(UserId, ChannelId), Permissions>,
    colors: HashMap<(UserId, ChannelId), u32>,
    messages: Vec<RawMessage>,
    invites: HashMap<String, GuildId>,
    failing: bool,
    calls: Mutex<Vec<String>>,
    channel_lookups: Arc<AtomicUsize>,
}

impl FakeSession {
    pub fn new(shard_id: u32) -> Self {
        Self {
            shard: ShardSpec {
                id: shard_id,
                total: 1,
            },
            current_user: None,
            channels: HashMap::new(),
            guilds: Vec::new(),
            members: HashMap::new(),
            permissions: HashMap::new(),
            colors: HashMap::new(),
            messages: Vec::new(),
            invites: HashMap::new(),
            failing: false,
            calls: Mutex::new(Vec::new()),
            channel_lookups: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_shard(mut self, shard_id: u32) -> Self {
        self.shard.id = shard_id;
        self
    }

    pub fn with_current_user(mut self, id: u64, name: &str) -> Self {
        self.current_user = Some(UserInfo {
            id: UserId::new(id),
            name: name.to_string(),
        });
        self
    }

    pub fn with_channel(mut self, channel: ChannelInfo) -> Self {
        self.channels.insert(channel.id, channel);
        self
    }

    pub fn with_guild(mut self, guild: GuildInfo) -> Self {
        self.guilds.push(guild);
        self
    }

    pub fn with_member(mut self, guild: u64, user: u64, nick: Option<&str>) -> Self {
        let (guild, user) = (GuildId::new(guild), UserId::new(user));
        self.members.insert(
            (guild, user),
            MemberInfo {
                user_id: user,
                nick: nick.map(str::to_string),
            },
        );
        self
    }

    pub fn with_permissions(mut self, user: u64, channel: u64, permissions: Permissions) -> Self {
        self.permissions
            .insert((UserId::new(user), ChannelId::new(channel)), permissions);
        self
    }

    pub fn with_color(mut self, user: u64, channel: u64, color: u32) -> Self {
        self.colors
            .insert((UserId::new(user), ChannelId::new(channel)), color);
        self
    }

    pub fn with_cached_message(mut self, message: RawMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_invite(mut self, code: &str, guild: u64) -> Self {
        self.invites.insert(code.to_string(), GuildId::new(guild));
        self
    }

    /// Make every REST call fail
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn channel_lookups(&self) -> Arc<AtomicUsize> {
        self.channel_lookups.clone()
    }

    fn record(&self, call: String) -> Result<()> {
        if self.failing {
            return Err(DiscordError::NotFound);
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[async_trait]
impl Session for FakeSession {
    fn shard(&self) -> ShardSpec {
        self.shard
    }

    fn current_user(&self) -> Option<UserInfo> {
        self.current_user.clone()
    }

    fn channel(&self, id: ChannelId) -> Option<ChannelInfo> {
        self.channel_lookups.fetch_add(1, Ordering::SeqCst);
        self.channels.get(&id).cloned()
    }

    fn guild(&self, id: GuildId) -> Option<GuildInfo> {
        self.guilds.iter().find(|guild| guild.id == id).cloned()
    }

    fn guilds(&self) -> Vec<GuildInfo> {
        self.guilds.clone()
    }

    fn member(&self, guild_id: GuildId, user_id: UserId) -> Option<MemberInfo> {
        self.members.get(&(guild_id, user_id)).cloned()
    }

    fn user_channel_permissions(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
    ) -> Option<Permissions> {
        self.permissions.get(&(user_id, channel_id)).copied()
    }

    fn user_color(&self, user_id: UserId, channel_id: ChannelId) -> Option<u32> {
        self.colors.get(&(user_id, channel_id)).copied()
    }

    fn cached_messages(&self, channel_id: ChannelId) -> Vec<RawMessage> {
        self.messages
            .iter()
            .filter(|message| message.channel_id == channel_id)
            .cloned()
            .collect()
    }

    async fn send_message(&self, channel_id: ChannelId, content: &str) -> Result<()> {
        self.record(format!("send {} {}", channel_id, content))
    }

    async fn send_embed(&self, channel_id: ChannelId, _embed: CreateEmbed) -> Result<()> {
        self.record(format!("embed {}", channel_id))
    }

    async fn edit_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: &str,
    ) -> Result<()> {
        self.record(format!("edit {} {} {}", channel_id, message_id, content))
    }

    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId) -> Result<()> {
        self.record(format!("delete {} {}", channel_id, message_id))
    }

    async fn send_file(&self, channel_id: ChannelId, name: &str, data: Vec<u8>) -> Result<()> {
        self.record(format!("file {} {} {}", channel_id, name, data.len()))
    }

    async fn ban(&self, guild_id: GuildId, user_id: UserId) -> Result<()> {
        self.record(format!("ban {} {}", guild_id, user_id))
    }

    async fn unban(&self, guild_id: GuildId, user_id: UserId) -> Result<()> {
        self.record(format!("unban {} {}", guild_id, user_id))
    }

    async fn typing(&self, channel_id: ChannelId) -> Result<()> {
        self.record(format!("typing {}", channel_id))
    }

    async fn create_dm_channel(&self, user_id: UserId) -> Result<ChannelId> {
        self.record(format!("dm {}", user_id))?;
        Ok(ChannelId::new(user_id.get() * 100))
    }

    async fn invite_guild(&self, code: &str) -> Result<Option<GuildId>> {
        Ok(self.invites.get(code).copied())
    }

    async fn accept_invite(&self, code: &str) -> Result<()> {
        self.record(format!("accept {}", code))
    }

    async fn fetch_messages(
        &self,
        channel_id: ChannelId,
        limit: u8,
        _before: Option<MessageId>,
    ) -> Result<Vec<RawMessage>> {
        Ok(self
            .cached_messages(channel_id)
            .into_iter()
            .take(limit as usize)
            .map(|mut raw| {
                raw.from_gateway = false;
                raw.guild_id = None;
                raw
            })
            .collect())
    }
}

/// Connector handing out prepared sessions by shard id
pub struct FakeConnector {
    sessions: Vec<Arc<FakeSession>>,
    recommended: u32,
    fail_shard: Option<u32>,
    connected: Mutex<Vec<ShardSpec>>,
    handlers: Mutex<Vec<ShardHandler>>,
}

impl FakeConnector {
    pub fn new(sessions: Vec<Arc<FakeSession>>) -> Self {
        Self {
            sessions,
            recommended: 1,
            fail_shard: None,
            connected: Mutex::new(Vec::new()),
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn recommending(mut self, shards: u32) -> Self {
        self.recommended = shards;
        self
    }

    pub fn failing_on(mut self, shard_id: u32) -> Self {
        self.fail_shard = Some(shard_id);
        self
    }

    pub fn connected(&self) -> Vec<ShardSpec> {
        self.connected.lock().unwrap().clone()
    }

    pub fn handlers(&self) -> Vec<ShardHandler> {
        self.handlers.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn recommended_shards(&self) -> Result<u32> {
        Ok(self.recommended)
    }

    async fn connect(&self, shard: ShardSpec, handler: ShardHandler) -> Result<Arc<dyn Session>> {
        if self.fail_shard == Some(shard.id) {
            return Err(DiscordError::ShardClosed(shard.id));
        }

        let session = self
            .sessions
            .get(shard.id as usize)
            .cloned()
            .unwrap_or_else(|| Arc::new(FakeSession::new(shard.id)));

        if let Some(user) = session.current_user() {
            handler.on_ready(user);
        }

        self.connected.lock().unwrap().push(shard);
        self.handlers.lock().unwrap().push(handler);
        Ok(session as Arc<dyn Session>)
    }
}

pub async fn connected_client_with(
    settings: ClientSettings,
    sessions: Vec<FakeSession>,
) -> (DiscordClient, mpsc::Receiver<DiscordMessage>) {
    let client = DiscordClient::with_settings(settings);
    let shards = sessions.len() as u32;
    let connector = FakeConnector::new(sessions.into_iter().map(Arc::new).collect());
    let rx = client.listen_with(&connector, Some(shards)).await.unwrap();
    (client, rx)
}

pub async fn connected_client(
    sessions: Vec<FakeSession>,
) -> (DiscordClient, mpsc::Receiver<DiscordMessage>) {
    connected_client_with(ClientSettings::new("token", "1", "2"), sessions).await
}

pub async fn connected_client_shared(
    sessions: Vec<Arc<FakeSession>>,
) -> (DiscordClient, mpsc::Receiver<DiscordMessage>) {
    let client = DiscordClient::new("token", "1", "2");
    let shards = sessions.len() as u32;
    let connector = FakeConnector::new(sessions);
    let rx = client.listen_with(&connector, Some(shards)).await.unwrap();
    (client, rx)
}
