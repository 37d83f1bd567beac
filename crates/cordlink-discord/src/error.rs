//! Error types (cordlink-discord)

use thiserror::Error;

/// Errors raised by the Discord client wrapper
///
/// `AlreadyJoined` and `NotFound` are the wrapper's own conditions; every
/// transport failure is passed through unchanged as `SerenityError`.
#[derive(Error, Debug)]
pub enum DiscordError {
    #[error("already joined")]
    AlreadyJoined,

    #[error("not found")]
    NotFound,

    #[error("no open Discord session")]
    NotConnected,

    #[error("client is already listening")]
    AlreadyListening,

    #[error("shard {id} is outside a topology of {total} shards")]
    InvalidShard { id: u32, total: u32 },

    #[error("shard {0} closed before becoming ready")]
    ShardClosed(u32),

    #[error("invalid id: {0:?}")]
    InvalidId(String),

    #[error("message has no timestamp")]
    MissingTimestamp,

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(#[from] chrono::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serenity error: {0}")]
    SerenityError(#[from] serenity::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, DiscordError>;
