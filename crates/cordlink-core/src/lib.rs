//! cordlink-core: shared pieces of the cordlink gateway
//!
//! Configuration loading and the error type it reports, used by the
//! gateway binary.

pub mod config;
pub mod error;

pub use config::{Config, DiscordConfig, ShardConfig};
pub use error::{Error, Result};
