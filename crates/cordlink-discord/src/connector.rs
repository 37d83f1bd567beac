//! Serenity-backed sessions
//!
//! Each shard is its own serenity `Client` with its own cache, so a shard
//! only ever knows the guilds routed to it.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serenity::all::{
    ChannelId, Client, Context, CreateAttachment, CreateEmbed, CreateMessage, EditMessage,
    EventHandler, GatewayIntents, GetMessages, GuildChannel, GuildId, Member, Message, MessageId,
    MessageUpdateEvent, Permissions, Ready, UserId,
};
use serenity::cache::{Cache, Settings as CacheSettings};
use serenity::http::{Http, LightMethod, Request, Route};
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::client::ClientSettings;
use crate::error::{DiscordError, Result};
use crate::handler::ShardHandler;
use crate::session::{Connector, Session, ShardSpec};
use crate::types::{ChannelInfo, GuildInfo, MemberInfo, RawMessage, UserInfo};

/// Opens shards as independent serenity clients
pub struct SerenityConnector {
    token: String,
    intents: GatewayIntents,
    message_cache_size: usize,
}

impl SerenityConnector {
    pub fn new(settings: &ClientSettings) -> Self {
        Self {
            token: settings.token.clone(),
            intents: settings.intents,
            message_cache_size: settings.message_cache_size,
        }
    }
}

#[async_trait]
impl Connector for SerenityConnector {
    async fn recommended_shards(&self) -> Result<u32> {
        let http = Http::new(&self.token);
        let gateway = http.get_bot_gateway().await?;
        Ok(gateway.shards)
    }

    async fn connect(&self, shard: ShardSpec, handler: ShardHandler) -> Result<Arc<dyn Session>> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let events = GatewayEvents {
            handler,
            ready: Mutex::new(Some(ready_tx)),
        };

        let mut cache_settings = CacheSettings::default();
        cache_settings.max_messages = self.message_cache_size;

        let mut client = Client::builder(&self.token, self.intents)
            .event_handler(events)
            .cache_settings(cache_settings)
            .await?;

        let session = SerenitySession {
            shard,
            cache: client.cache.clone(),
            http: client.http.clone(),
        };

        let mut task =
            tokio::spawn(async move { client.start_shard(shard.id, shard.total).await });

        tokio::select! {
            ready = ready_rx => {
                if ready.is_ok() {
                    info!("Shard {}/{} is ready", shard.id, shard.total);
                    tokio::spawn(watch_shard(shard, task));
                    return Ok(Arc::new(session));
                }
                Err(shard_exit(shard, task.await))
            }
            finished = &mut task => Err(shard_exit(shard, finished)),
        }
    }
}

type ShardTask = JoinHandle<serenity::Result<()>>;

/// Error for a shard task that ended, whether or not it reported one
fn shard_exit(
    shard: ShardSpec,
    finished: std::result::Result<serenity::Result<()>, JoinError>,
) -> DiscordError {
    match finished {
        Ok(Err(e)) => e.into(),
        Ok(Ok(())) => DiscordError::ShardClosed(shard.id),
        Err(e) => {
            error!("Shard {}/{} task failed: {}", shard.id, shard.total, e);
            DiscordError::ShardClosed(shard.id)
        }
    }
}

/// Log how a shard that was ready eventually stopped
async fn watch_shard(shard: ShardSpec, task: ShardTask) {
    match task.await {
        Ok(Ok(())) => warn!("Shard {}/{} stopped", shard.id, shard.total),
        Ok(Err(e)) => error!("Shard {}/{} stopped: {}", shard.id, shard.total, e),
        Err(e) => error!("Shard {}/{} task failed: {}", shard.id, shard.total, e),
    }
}

/// Serenity event handler forwarding to a `ShardHandler`
struct GatewayEvents {
    handler: ShardHandler,
    ready: Mutex<Option<oneshot::Sender<()>>>,
}

#[serenity::async_trait]
impl EventHandler for GatewayEvents {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        self.handler.on_ready(UserInfo {
            id: ready.user.id,
            name: ready.user.name.clone(),
        });

        let sender = match self.ready.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        self.handler.on_message_create(RawMessage::from(&msg)).await;
    }

    async fn message_update(
        &self,
        _ctx: Context,
        _old_if_available: Option<Message>,
        new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        let raw = match new {
            Some(msg) => RawMessage::from(&msg),
            None => RawMessage::from(&event),
        };
        self.handler.on_message_update(raw).await;
    }

    async fn message_delete(
        &self,
        _ctx: Context,
        channel_id: ChannelId,
        deleted_message_id: MessageId,
        guild_id: Option<GuildId>,
    ) {
        self.handler
            .on_message_delete(RawMessage::deleted(channel_id, deleted_message_id, guild_id))
            .await;
    }
}

/// One open shard: its cache and HTTP client
pub struct SerenitySession {
    shard: ShardSpec,
    cache: Arc<Cache>,
    http: Arc<Http>,
}

#[async_trait]
impl Session for SerenitySession {
    fn shard(&self) -> ShardSpec {
        self.shard
    }

    fn current_user(&self) -> Option<UserInfo> {
        let user = self.cache.current_user();
        Some(UserInfo {
            id: user.id,
            name: user.name.clone(),
        })
    }

    fn channel(&self, id: ChannelId) -> Option<ChannelInfo> {
        self.cache
            .channel(id)
            .map(|channel| ChannelInfo::from(&*channel))
    }

    fn guild(&self, id: GuildId) -> Option<GuildInfo> {
        self.cache.guild(id).map(|guild| GuildInfo::from(&*guild))
    }

    fn guilds(&self) -> Vec<GuildInfo> {
        self.cache
            .guilds()
            .into_iter()
            .filter_map(|id| self.guild(id))
            .collect()
    }

    fn member(&self, guild_id: GuildId, user_id: UserId) -> Option<MemberInfo> {
        self.cache
            .member(guild_id, user_id)
            .map(|member| MemberInfo::from(&*member))
    }

    fn user_channel_permissions(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
    ) -> Option<Permissions> {
        let channel = GuildChannel::clone(&*self.cache.channel(channel_id)?);
        let guild = self.cache.guild(channel.guild_id)?;
        let member = guild.members.get(&user_id)?;
        Some(guild.user_permissions_in(&channel, member))
    }

    fn user_color(&self, user_id: UserId, channel_id: ChannelId) -> Option<u32> {
        let guild_id = self.cache.channel(channel_id)?.guild_id;
        let member = Member::clone(&*self.cache.member(guild_id, user_id)?);
        member.colour(&self.cache).map(|colour| colour.0)
    }

    fn cached_messages(&self, channel_id: ChannelId) -> Vec<RawMessage> {
        let Some(messages) = self.cache.channel_messages(channel_id) else {
            return Vec::new();
        };

        let mut raw: Vec<RawMessage> = messages.values().map(RawMessage::from).collect();
        raw.sort_by_key(|message| message.id);
        raw
    }

    async fn send_message(&self, channel_id: ChannelId, content: &str) -> Result<()> {
        channel_id.say(&self.http, content).await?;
        Ok(())
    }

    async fn send_embed(&self, channel_id: ChannelId, embed: CreateEmbed) -> Result<()> {
        channel_id
            .send_message(&self.http, CreateMessage::new().embed(embed))
            .await?;
        Ok(())
    }

    async fn edit_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: &str,
    ) -> Result<()> {
        channel_id
            .edit_message(&self.http, message_id, EditMessage::new().content(content))
            .await?;
        Ok(())
    }

    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId) -> Result<()> {
        channel_id.delete_message(&self.http, message_id).await?;
        Ok(())
    }

    async fn send_file(&self, channel_id: ChannelId, name: &str, data: Vec<u8>) -> Result<()> {
        let attachment = CreateAttachment::bytes(data, name);
        channel_id
            .send_files(&self.http, vec![attachment], CreateMessage::new())
            .await?;
        Ok(())
    }

    async fn ban(&self, guild_id: GuildId, user_id: UserId) -> Result<()> {
        guild_id.ban(&self.http, user_id, 0).await?;
        Ok(())
    }

    async fn unban(&self, guild_id: GuildId, user_id: UserId) -> Result<()> {
        guild_id.unban(&self.http, user_id).await?;
        Ok(())
    }

    async fn typing(&self, channel_id: ChannelId) -> Result<()> {
        channel_id.broadcast_typing(&self.http).await?;
        Ok(())
    }

    async fn create_dm_channel(&self, user_id: UserId) -> Result<ChannelId> {
        let channel = user_id.create_dm_channel(&self.http).await?;
        Ok(channel.id)
    }

    async fn invite_guild(&self, code: &str) -> Result<Option<GuildId>> {
        let invite = self.http.get_invite(code, false, false, None).await?;
        Ok(invite.guild.map(|guild| guild.id))
    }

    async fn accept_invite(&self, code: &str) -> Result<()> {
        debug!("Accepting invite {}", code);
        let request = Request::new(Route::Invite { code }, LightMethod::Post);
        if let Err(e) = self.http.request(request).await {
            warn!("Failed to accept invite {}: {}", code, e);
            return Err(e.into());
        }
        Ok(())
    }

    async fn fetch_messages(
        &self,
        channel_id: ChannelId,
        limit: u8,
        before: Option<MessageId>,
    ) -> Result<Vec<RawMessage>> {
        let mut builder = GetMessages::new().limit(limit);
        if let Some(before) = before {
            builder = builder.before(before);
        }

        let messages = channel_id.messages(&self.http, builder).await?;
        Ok(messages.iter().map(RawMessage::from).collect())
    }
}
