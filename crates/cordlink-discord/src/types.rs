//! Plain data copied out of serenity payloads and caches
//!
//! Gateway payloads differ per event (a full message on create, a partial
//! event on update, an id pair on delete); `RawMessage` is the single shape
//! they are folded into.

use serenity::all::{
    ChannelId, ChannelType, Guild, GuildChannel, GuildId, Member, Message, MessageId,
    MessageUpdateEvent, RoleId, User, UserId,
};

/// Which gateway event produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Create,
    Update,
    Delete,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Create => "create",
            MessageType::Update => "update",
            MessageType::Delete => "delete",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message author
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: UserId,
    pub name: String,
    /// Avatar hash, `a_`-prefixed when animated
    pub avatar: Option<String>,
    pub bot: bool,
}

impl From<&User> for Author {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            avatar: user.avatar.map(|hash| hash.to_string()),
            bot: user.bot,
        }
    }
}

/// Normalized message payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub guild_id: Option<GuildId>,
    pub author: Option<Author>,
    pub content: String,
    /// RFC 3339 creation timestamp
    pub timestamp: Option<String>,
    pub mentions: Vec<Author>,
    /// Delivered as a gateway event. REST message objects never carry a
    /// guild id, so `guild_id` is only authoritative when this is set.
    pub from_gateway: bool,
}

impl RawMessage {
    /// Payload of a delete notification, which only carries ids
    pub fn deleted(channel_id: ChannelId, id: MessageId, guild_id: Option<GuildId>) -> Self {
        Self {
            id,
            channel_id,
            guild_id,
            author: None,
            content: String::new(),
            timestamp: None,
            mentions: Vec::new(),
            from_gateway: true,
        }
    }
}

impl From<&Message> for RawMessage {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id,
            channel_id: msg.channel_id,
            guild_id: msg.guild_id,
            author: Some(Author::from(&msg.author)),
            content: msg.content.clone(),
            timestamp: Some(msg.timestamp.to_string()),
            mentions: msg.mentions.iter().map(Author::from).collect(),
            from_gateway: false,
        }
    }
}

impl From<&MessageUpdateEvent> for RawMessage {
    fn from(event: &MessageUpdateEvent) -> Self {
        Self {
            id: event.id,
            channel_id: event.channel_id,
            guild_id: event.guild_id,
            author: event.author.as_ref().map(Author::from),
            content: event.content.clone().unwrap_or_default(),
            timestamp: event.timestamp.map(|ts| ts.to_string()),
            mentions: event
                .mentions
                .as_ref()
                .map(|users| users.iter().map(Author::from).collect())
                .unwrap_or_default(),
            from_gateway: true,
        }
    }
}

/// The connected bot user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub id: UserId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    /// `None` for direct message channels
    pub guild_id: Option<GuildId>,
    pub name: String,
    pub kind: ChannelType,
}

impl From<&GuildChannel> for ChannelInfo {
    fn from(channel: &GuildChannel) -> Self {
        Self {
            id: channel.id,
            guild_id: Some(channel.guild_id),
            name: channel.name.clone(),
            kind: channel.kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInfo {
    pub id: RoleId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildInfo {
    pub id: GuildId,
    pub name: String,
    pub owner_id: UserId,
    pub member_count: u64,
    pub roles: Vec<RoleInfo>,
}

impl GuildInfo {
    pub fn role(&self, id: RoleId) -> Option<&RoleInfo> {
        self.roles.iter().find(|role| role.id == id)
    }
}

impl From<&Guild> for GuildInfo {
    fn from(guild: &Guild) -> Self {
        Self {
            id: guild.id,
            name: guild.name.clone(),
            owner_id: guild.owner_id,
            member_count: guild.member_count,
            roles: guild
                .roles
                .values()
                .map(|role| RoleInfo {
                    id: role.id,
                    name: role.name.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub user_id: UserId,
    pub nick: Option<String>,
}

impl From<&Member> for MemberInfo {
    fn from(member: &Member) -> Self {
        Self {
            user_id: member.user.id,
            nick: member.nick.clone(),
        }
    }
}
