//! Message facade
//!
//! `DiscordMessage` wraps a normalized payload and computes the display
//! name, human readable text and channel lazily, caching each on first use.

use std::sync::{LazyLock, OnceLock};

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use serenity::all::{ChannelId, RoleId};

use crate::client::{DiscordClient, parse_id};
use crate::error::{DiscordError, Result};
use crate::types::{ChannelInfo, MessageType, RawMessage};

const CDN_URL: &str = "https://cdn.discordapp.com";

static CHANNEL_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<#(\d+)>").expect("valid channel mention pattern"));

static ROLE_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@&(\d+)>").expect("valid role mention pattern"));

/// Uniform view over create, update and delete events
pub trait Message: Send + Sync {
    /// Channel ID
    fn channel(&self) -> String;

    /// Author display name (guild nickname when set)
    fn user_name(&self) -> &str;

    fn user_id(&self) -> String;

    /// URL of the author's avatar
    fn user_avatar(&self) -> String;

    /// Content with user, role and channel mentions replaced by names
    fn message(&self) -> &str;

    fn raw_message(&self) -> &str;

    fn message_id(&self) -> String;

    fn message_type(&self) -> MessageType;

    fn timestamp(&self) -> Result<DateTime<Utc>>;

    /// Guild ID carried by the event itself, if any
    fn payload_guild_id(&self) -> Option<String>;

    /// Whether the payload arrived as a gateway event rather than a REST fetch
    fn from_gateway(&self) -> bool;

    fn resolve_guild_id(&self) -> Result<String>;

    fn resolve_message_channel(&self) -> Result<ChannelInfo>;

    /// `(trigger matched, "<mention> <word>")` for messages addressed to the bot
    fn is_mention_trigger(&self, trigger: &str) -> (bool, String);

    fn is_bot(&self) -> bool;
}

/// A received Discord message
pub struct DiscordMessage {
    client: DiscordClient,
    raw: RawMessage,
    kind: MessageType,
    nick: OnceLock<String>,
    content: OnceLock<String>,
    channel: OnceLock<ChannelInfo>,
}

impl std::fmt::Debug for DiscordMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordMessage")
            .field("kind", &self.kind)
            .field("raw", &self.raw)
            .finish()
    }
}

impl DiscordMessage {
    pub fn new(client: DiscordClient, raw: RawMessage, kind: MessageType) -> Self {
        Self {
            client,
            raw,
            kind,
            nick: OnceLock::new(),
            content: OnceLock::new(),
            channel: OnceLock::new(),
        }
    }

    pub fn raw(&self) -> &RawMessage {
        &self.raw
    }

    pub fn client(&self) -> &DiscordClient {
        &self.client
    }

    /// The leading token when it mentions the bot (`<@ID>` or `<@!ID>`)
    pub fn mention_prefix(&self) -> Option<&str> {
        let first = self.raw.content.split_whitespace().next()?;
        let me = self.client.user_id();
        if me.is_empty() {
            return None;
        }

        if first == format!("<@{}>", me) || first == format!("<@!{}>", me) {
            Some(first)
        } else {
            None
        }
    }

    fn replace_user_mentions(&self, content: &str) -> String {
        let mut content = content.to_string();
        for user in &self.raw.mentions {
            let name = format!("@{}", user.name);
            content = content
                .replace(&format!("<@{}>", user.id), &name)
                .replace(&format!("<@!{}>", user.id), &name);
        }
        content
    }

    fn replace_role_names(&self, content: &str) -> String {
        ROLE_MENTION
            .replace_all(content, |caps: &Captures| {
                self.role_name(&caps[1])
                    .map(|name| format!("@{}", name))
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    fn role_name(&self, role_id: &str) -> Option<String> {
        let role_id: RoleId = parse_id(role_id).ok()?;
        let guild_id = self.client.find_channel(self.raw.channel_id).ok()?.guild_id?;
        let guild = self.client.find_guild(guild_id).ok()?;
        guild.role(role_id).map(|role| role.name.clone())
    }

    fn replace_channel_names(&self, content: &str) -> String {
        CHANNEL_MENTION
            .replace_all(content, |caps: &Captures| {
                parse_id::<ChannelId>(&caps[1])
                    .and_then(|id| self.client.find_channel(id))
                    .map(|channel| format!("#{}", channel.name))
                    .unwrap_or_else(|_| caps[0].to_string())
            })
            .into_owned()
    }
}

impl Message for DiscordMessage {
    fn channel(&self) -> String {
        self.raw.channel_id.to_string()
    }

    fn user_name(&self) -> &str {
        let Some(author) = &self.raw.author else {
            return "";
        };

        self.nick.get_or_init(|| {
            self.client
                .nickname_for_id(&author.id.to_string(), &author.name, &self.channel())
        })
    }

    fn user_id(&self) -> String {
        self.raw
            .author
            .as_ref()
            .map(|author| author.id.to_string())
            .unwrap_or_default()
    }

    fn user_avatar(&self) -> String {
        let Some(author) = &self.raw.author else {
            return String::new();
        };

        match &author.avatar {
            Some(hash) => format!("{}/avatars/{}/{}.png", CDN_URL, author.id, hash),
            None => format!(
                "{}/embed/avatars/{}.png",
                CDN_URL,
                (author.id.get() >> 22) % 6
            ),
        }
    }

    fn message(&self) -> &str {
        self.content.get_or_init(|| {
            let content = self.replace_user_mentions(&self.raw.content);
            let content = self.replace_role_names(&content);
            self.replace_channel_names(&content)
        })
    }

    fn raw_message(&self) -> &str {
        &self.raw.content
    }

    fn message_id(&self) -> String {
        self.raw.id.to_string()
    }

    fn message_type(&self) -> MessageType {
        self.kind
    }

    fn timestamp(&self) -> Result<DateTime<Utc>> {
        let raw = self
            .raw
            .timestamp
            .as_deref()
            .ok_or(DiscordError::MissingTimestamp)?;

        Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
    }

    fn payload_guild_id(&self) -> Option<String> {
        self.raw.guild_id.map(|id| id.to_string())
    }

    fn from_gateway(&self) -> bool {
        self.raw.from_gateway
    }

    fn resolve_guild_id(&self) -> Result<String> {
        let channel = self.resolve_message_channel()?;
        Ok(channel.guild_id.map(|id| id.to_string()).unwrap_or_default())
    }

    fn resolve_message_channel(&self) -> Result<ChannelInfo> {
        if let Some(channel) = self.channel.get() {
            return Ok(channel.clone());
        }

        let channel = self.client.find_channel(self.raw.channel_id)?;
        Ok(self.channel.get_or_init(|| channel).clone())
    }

    fn is_mention_trigger(&self, trigger: &str) -> (bool, String) {
        let mut parts = self.raw.content.split_whitespace();
        let (Some(first), Some(second)) = (parts.next(), parts.next()) else {
            return (false, String::new());
        };

        if self.mention_prefix().is_none() {
            return (false, String::new());
        }

        (second == trigger, format!("{} {}", first, second))
    }

    fn is_bot(&self) -> bool {
        self.raw.author.as_ref().is_some_and(|author| author.bot)
    }
}
