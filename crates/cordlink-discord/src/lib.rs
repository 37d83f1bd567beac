//! cordlink-discord: Discord gateway client wrapper
//!
//! Opens one serenity client per shard, folds message create/update/delete
//! events into a single bounded queue of `DiscordMessage` values, and answers
//! channel, guild, member and permission lookups from the shards' caches.

pub mod client;
pub mod connector;
pub mod error;
pub mod handler;
mod listen;
pub mod message;
pub mod session;
pub mod types;

#[cfg(test)]
mod testing;

pub use client::{ClientSettings, DiscordClient, default_intents};
pub use connector::{SerenityConnector, SerenitySession};
pub use error::{DiscordError, Result};
pub use handler::{MESSAGE_QUEUE_CAPACITY, ShardHandler};
pub use message::{DiscordMessage, Message};
pub use session::{Connector, Session, ShardSpec};
pub use types::{
    Author, ChannelInfo, GuildInfo, MemberInfo, MessageType, RawMessage, RoleInfo, UserInfo,
};

// serenity types appearing in the public API
pub use serenity::all::{CreateEmbed, GatewayIntents, Permissions};
