//! Discord client: shared state, lookups and REST delegations
//!
//! Shards do not share cache state, so every lookup scans the session list
//! and takes the first shard that holds the record.

use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, OnceLock};

use serenity::all::{
    ChannelId, ChannelType, CreateEmbed, GatewayIntents, GuildId, MessageId, Permissions, UserId,
};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error, warn};

use crate::error::{DiscordError, Result};
use crate::message::{DiscordMessage, Message};
use crate::session::Session;
use crate::types::{ChannelInfo, GuildInfo, MemberInfo, MessageType, UserInfo};

/// Permission bits that make a member a moderator
const MODERATOR_PERMISSIONS: Permissions = Permissions::ADMINISTRATOR
    .union(Permissions::MANAGE_CHANNELS)
    .union(Permissions::MANAGE_GUILD);

/// Intents requested when none are configured
pub fn default_intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
}

/// Parse a snowflake ID, rejecting zero and non-numeric input
pub(crate) fn parse_id<T: From<u64>>(raw: &str) -> Result<T> {
    match u64::from_str(raw.trim()) {
        Ok(id) if id != 0 => Ok(T::from(id)),
        _ => Err(DiscordError::InvalidId(raw.to_string())),
    }
}

/// Connection settings
#[derive(Clone)]
pub struct ClientSettings {
    pub token: String,
    pub owner_user_id: String,
    pub client_id: String,
    pub allow_bots: bool,
    pub intents: GatewayIntents,
    pub message_cache_size: usize,
}

impl ClientSettings {
    pub fn new(
        token: impl Into<String>,
        owner_user_id: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            owner_user_id: owner_user_id.into(),
            client_id: client_id.into(),
            allow_bots: false,
            intents: default_intents(),
            message_cache_size: 100,
        }
    }

    pub fn allow_bots(mut self, allow_bots: bool) -> Self {
        self.allow_bots = allow_bots;
        self
    }

    pub fn intents(mut self, intents: GatewayIntents) -> Self {
        self.intents = intents;
        self
    }

    pub fn message_cache_size(mut self, size: usize) -> Self {
        self.message_cache_size = size;
        self
    }
}

struct ClientInner {
    settings: ClientSettings,
    /// Set once by the first listen call
    listening: AtomicBool,
    /// Written once when every shard is open, read-only afterwards
    sessions: OnceLock<Vec<Arc<dyn Session>>>,
    /// Bot user reported by the first ready event
    user: OnceLock<UserInfo>,
}

/// Handle to the Discord connection, cheap to clone
#[derive(Clone)]
pub struct DiscordClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for DiscordClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordClient")
            .field("owner_user_id", &self.inner.settings.owner_user_id)
            .field("client_id", &self.inner.settings.client_id)
            .field("allow_bots", &self.inner.settings.allow_bots)
            .field("shards", &self.sessions().len())
            .finish()
    }
}

impl DiscordClient {
    /// Create a client from a bot token, the owner's user ID and the application client ID
    pub fn new(
        token: impl Into<String>,
        owner_user_id: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self::with_settings(ClientSettings::new(token, owner_user_id, client_id))
    }

    pub fn with_settings(settings: ClientSettings) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                settings,
                listening: AtomicBool::new(false),
                sessions: OnceLock::new(),
                user: OnceLock::new(),
            }),
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.inner.settings
    }

    pub fn owner_user_id(&self) -> &str {
        &self.inner.settings.owner_user_id
    }

    pub fn client_id(&self) -> &str {
        &self.inner.settings.client_id
    }

    pub fn allow_bots(&self) -> bool {
        self.inner.settings.allow_bots
    }

    pub(crate) fn listening_flag(&self) -> &AtomicBool {
        &self.inner.listening
    }

    pub(crate) fn install_sessions(&self, sessions: Vec<Arc<dyn Session>>) -> Result<()> {
        self.inner
            .sessions
            .set(sessions)
            .map_err(|_| DiscordError::AlreadyListening)
    }

    pub(crate) fn record_user(&self, user: UserInfo) {
        let _ = self.inner.user.set(user);
    }

    /// Open sessions, one per shard
    pub fn sessions(&self) -> &[Arc<dyn Session>] {
        self.inner
            .sessions
            .get()
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Session used for REST calls
    fn session(&self) -> Result<&Arc<dyn Session>> {
        self.sessions().first().ok_or(DiscordError::NotConnected)
    }

    fn current_user(&self) -> Option<UserInfo> {
        self.sessions()
            .first()
            .and_then(|session| session.current_user())
            .or_else(|| self.inner.user.get().cloned())
    }

    /// User ID of the connected bot, empty before any session is open
    pub fn user_id(&self) -> String {
        self.current_user()
            .map(|user| user.id.to_string())
            .unwrap_or_default()
    }

    /// Username of the connected bot, empty before any session is open
    pub fn user_name(&self) -> String {
        self.current_user().map(|user| user.name).unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Cache lookups
    // ------------------------------------------------------------------

    pub(crate) fn find_channel(&self, id: ChannelId) -> Result<ChannelInfo> {
        self.sessions()
            .iter()
            .find_map(|session| session.channel(id))
            .ok_or(DiscordError::NotFound)
    }

    pub(crate) fn find_guild(&self, id: GuildId) -> Result<GuildInfo> {
        self.sessions()
            .iter()
            .find_map(|session| session.guild(id))
            .ok_or(DiscordError::NotFound)
    }

    /// Resolve a channel from its ID
    pub fn channel(&self, channel_id: &str) -> Result<ChannelInfo> {
        self.find_channel(parse_id(channel_id)?)
    }

    /// Resolve a guild from its ID
    pub fn guild(&self, guild_id: &str) -> Result<GuildInfo> {
        self.find_guild(parse_id(guild_id)?)
    }

    /// Guilds cached by every shard
    pub fn guilds(&self) -> Vec<GuildInfo> {
        self.sessions()
            .iter()
            .flat_map(|session| session.guilds())
            .collect()
    }

    /// Number of guilds the bot is connected to
    pub fn channel_count(&self) -> usize {
        self.guilds().len()
    }

    /// Total member count across all guilds
    pub fn user_count(&self) -> u64 {
        self.guilds().iter().map(|guild| guild.member_count).sum()
    }

    /// Resolve a guild member.
    ///
    /// The member is looked up in the cache of the first shard holding the
    /// guild; a known guild without that member yields `NotFound`.
    pub fn guild_member(&self, user_id: &str, guild_id: &str) -> Result<MemberInfo> {
        let user_id: UserId = parse_id(user_id)?;
        let guild_id: GuildId = parse_id(guild_id)?;

        let session = self
            .sessions()
            .iter()
            .find(|session| session.guild(guild_id).is_some())
            .ok_or(DiscordError::NotFound)?;

        session
            .member(guild_id, user_id)
            .ok_or(DiscordError::NotFound)
    }

    /// Permissions of a user in a channel
    pub fn user_channel_permissions(&self, user_id: &str, channel_id: &str) -> Result<Permissions> {
        let user_id: UserId = parse_id(user_id)?;
        let channel_id: ChannelId = parse_id(channel_id)?;

        self.sessions()
            .iter()
            .find_map(|session| session.user_channel_permissions(user_id, channel_id))
            .ok_or(DiscordError::NotFound)
    }

    /// Display color of a user in a channel, 0 when unknown
    pub fn user_color(&self, user_id: &str, channel_id: &str) -> u32 {
        let (Ok(user_id), Ok(channel_id)) = (
            parse_id::<UserId>(user_id),
            parse_id::<ChannelId>(channel_id),
        ) else {
            return 0;
        };

        self.sessions()
            .iter()
            .filter_map(|session| session.user_color(user_id, channel_id))
            .find(|color| *color != 0)
            .unwrap_or(0)
    }

    /// Nickname of a message's author
    pub fn nickname(&self, message: &dyn Message) -> String {
        self.nickname_for_id(&message.user_id(), message.user_name(), &message.channel())
    }

    /// Guild nickname of a user in the channel's guild, `user_name` when there is none
    pub fn nickname_for_id(&self, user_id: &str, user_name: &str, channel_id: &str) -> String {
        self.channel(channel_id)
            .ok()
            .and_then(|channel| channel.guild_id)
            .and_then(|guild_id| self.guild_member(user_id, &guild_id.to_string()).ok())
            .and_then(|member| member.nick)
            .filter(|nick| !nick.is_empty())
            .unwrap_or_else(|| user_name.to_string())
    }

    // ------------------------------------------------------------------
    // Message checks
    // ------------------------------------------------------------------

    /// Whether the message was sent by this bot
    pub fn is_me(&self, message: &dyn Message) -> bool {
        let me = self.user_id();
        !me.is_empty() && message.user_id() == me
    }

    /// Whether the message is from the configured bot owner
    pub fn is_bot_owner(&self, message: &dyn Message) -> bool {
        let owner = self.owner_user_id();
        !owner.is_empty() && message.user_id() == owner
    }

    /// Whether the message was sent in a direct message channel.
    ///
    /// DM channels are not kept in the cache, so a gateway event that carries
    /// no guild and whose channel cannot be resolved counts as private.
    /// Fetched messages never carry a guild, so an unresolvable channel
    /// makes them not private.
    pub fn is_private(&self, message: &dyn Message) -> bool {
        match self.channel(&message.channel()) {
            Ok(channel) => channel.kind == ChannelType::Private,
            Err(_) => message.from_gateway() && message.payload_guild_id().is_none(),
        }
    }

    /// Whether the message is from the guild owner or the bot owner
    pub fn is_channel_owner(&self, message: &dyn Message) -> bool {
        let owner = self
            .channel(&message.channel())
            .ok()
            .and_then(|channel| channel.guild_id)
            .and_then(|guild_id| self.find_guild(guild_id).ok())
            .map(|guild| guild.owner_id.to_string());

        match owner {
            Some(owner) => owner == message.user_id() || self.is_bot_owner(message),
            None => false,
        }
    }

    /// Whether the message is from a guild moderator
    pub fn is_moderator(&self, message: &dyn Message) -> bool {
        if let Ok(permissions) =
            self.user_channel_permissions(&message.user_id(), &message.channel())
        {
            if permissions.intersects(MODERATOR_PERMISSIONS) {
                return true;
            }
        }

        self.is_channel_owner(message)
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// Cached messages of a channel, oldest first
    pub fn message_history(&self, channel_id: &str) -> Vec<DiscordMessage> {
        let Ok(channel_id) = parse_id::<ChannelId>(channel_id) else {
            return Vec::new();
        };

        let Some(session) = self
            .sessions()
            .iter()
            .find(|session| session.channel(channel_id).is_some())
        else {
            return Vec::new();
        };

        session
            .cached_messages(channel_id)
            .into_iter()
            .map(|mut raw| {
                raw.from_gateway = true;
                DiscordMessage::new(self.clone(), raw, MessageType::Create)
            })
            .collect()
    }

    /// Fetch up to `limit` messages of a channel, optionally before a message ID
    pub async fn get_messages(
        &self,
        channel_id: &str,
        limit: u8,
        before_id: Option<&str>,
    ) -> Result<Vec<DiscordMessage>> {
        let channel_id: ChannelId = parse_id(channel_id)?;
        let before = before_id.map(parse_id::<MessageId>).transpose()?;

        let messages = self
            .session()?
            .fetch_messages(channel_id, limit, before)
            .await?;

        Ok(messages
            .into_iter()
            .map(|raw| DiscordMessage::new(self.clone(), raw, MessageType::Create))
            .collect())
    }

    // ------------------------------------------------------------------
    // REST delegations
    // ------------------------------------------------------------------

    /// Send a text message
    pub async fn send_message(&self, channel_id: &str, content: &str) -> Result<()> {
        if channel_id.is_empty() {
            warn!("Empty channel could not send message: {}", content);
            return Ok(());
        }

        let channel_id = parse_id(channel_id)?;
        if let Err(e) = self.session()?.send_message(channel_id, content).await {
            error!("Error sending discord message: {}", e);
            return Err(e);
        }

        Ok(())
    }

    /// Send an embed message
    pub async fn send_embed_message(&self, channel_id: &str, embed: CreateEmbed) -> Result<()> {
        if channel_id.is_empty() {
            warn!("Empty channel could not send embed message: {:?}", embed);
            return Ok(());
        }

        let channel_id = parse_id(channel_id)?;
        if let Err(e) = self.session()?.send_embed(channel_id, embed).await {
            error!("Error sending discord embed message: {}", e);
            return Err(e);
        }

        Ok(())
    }

    /// Replace the content of a message
    pub async fn edit_message(&self, channel_id: &str, message_id: &str, content: &str) -> Result<()> {
        let channel_id = parse_id(channel_id)?;
        let message_id = parse_id(message_id)?;

        if let Err(e) = self
            .session()?
            .edit_message(channel_id, message_id, content)
            .await
        {
            error!("Error editing discord message: {}", e);
            return Err(e);
        }

        Ok(())
    }

    pub async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<()> {
        let channel_id = parse_id(channel_id)?;
        let message_id = parse_id(message_id)?;

        if let Err(e) = self.session()?.delete_message(channel_id, message_id).await {
            error!("Error deleting discord message: {}", e);
            return Err(e);
        }

        Ok(())
    }

    /// Upload the contents of `reader` as a file attachment
    pub async fn send_file<R>(&self, channel_id: &str, name: &str, mut reader: R) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        if channel_id.is_empty() {
            warn!("Empty channel could not send file: {}", name);
            return Ok(());
        }

        let channel_id = parse_id(channel_id)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;

        if let Err(e) = self.session()?.send_file(channel_id, name, data).await {
            error!("Error sending discord file: {}", e);
            return Err(e);
        }

        Ok(())
    }

    pub async fn ban_user(&self, guild_id: &str, user_id: &str) -> Result<()> {
        self.session()?
            .ban(parse_id(guild_id)?, parse_id(user_id)?)
            .await
    }

    pub async fn unban_user(&self, guild_id: &str, user_id: &str) -> Result<()> {
        self.session()?
            .unban(parse_id(guild_id)?, parse_id(user_id)?)
            .await
    }

    /// Join a guild through an invite code.
    ///
    /// Fails with `AlreadyJoined` when the invite's guild is already cached.
    pub async fn join(&self, invite_code: &str) -> Result<()> {
        let session = self.session()?;

        if let Ok(Some(guild_id)) = session.invite_guild(invite_code).await {
            if self.find_guild(guild_id).is_ok() {
                return Err(DiscordError::AlreadyJoined);
            }
        }

        session.accept_invite(invite_code).await
    }

    /// Show the typing indicator in a channel
    pub async fn typing(&self, channel_id: &str) -> Result<()> {
        self.session()?.typing(parse_id(channel_id)?).await
    }

    /// Send a direct message to a user
    pub async fn private_message(&self, user_id: &str, content: &str) -> Result<()> {
        let channel_id = self
            .session()?
            .create_dm_channel(parse_id(user_id)?)
            .await?;

        debug!("Opened DM channel {} for user {}", channel_id, user_id);
        self.send_message(&channel_id.to_string(), content).await
    }
}
