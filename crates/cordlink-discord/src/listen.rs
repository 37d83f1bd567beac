//! Session manager
//!
//! Opens shards one after another, each with its own handler feeding the
//! shared message queue, and installs the finished session list once.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::client::DiscordClient;
use crate::connector::SerenityConnector;
use crate::error::{DiscordError, Result};
use crate::handler::{MESSAGE_QUEUE_CAPACITY, ShardHandler};
use crate::message::DiscordMessage;
use crate::session::{Connector, Session, ShardSpec};

impl DiscordClient {
    /// Open `shard_count` shards and return the message queue.
    ///
    /// `None` or 0 uses the shard count recommended by Discord.
    pub async fn listen(&self, shard_count: Option<u32>) -> Result<mpsc::Receiver<DiscordMessage>> {
        let connector = SerenityConnector::new(self.settings());
        self.listen_with(&connector, shard_count).await
    }

    /// Open the single shard `shard_id` of a `total_shards` topology run across processes
    pub async fn listen_configure(
        &self,
        total_shards: u32,
        shard_id: u32,
    ) -> Result<mpsc::Receiver<DiscordMessage>> {
        let connector = SerenityConnector::new(self.settings());
        self.listen_configure_with(&connector, total_shards, shard_id)
            .await
    }

    /// `listen` against any connector
    pub async fn listen_with(
        &self,
        connector: &dyn Connector,
        shard_count: Option<u32>,
    ) -> Result<mpsc::Receiver<DiscordMessage>> {
        let total = match shard_count {
            Some(count) if count >= 1 => count,
            _ => {
                let recommended = connector.recommended_shards().await?;
                info!("Using {} recommended shard(s)", recommended);
                recommended.max(1)
            }
        };

        let shards = (0..total).map(|id| ShardSpec { id, total }).collect();
        self.open_shards(connector, shards).await
    }

    /// `listen_configure` against any connector
    pub async fn listen_configure_with(
        &self,
        connector: &dyn Connector,
        total_shards: u32,
        shard_id: u32,
    ) -> Result<mpsc::Receiver<DiscordMessage>> {
        if shard_id >= total_shards {
            return Err(DiscordError::InvalidShard {
                id: shard_id,
                total: total_shards,
            });
        }

        let shard = ShardSpec {
            id: shard_id,
            total: total_shards,
        };
        self.open_shards(connector, vec![shard]).await
    }

    /// Shards already opened when a later one fails stay connected.
    async fn open_shards(
        &self,
        connector: &dyn Connector,
        shards: Vec<ShardSpec>,
    ) -> Result<mpsc::Receiver<DiscordMessage>> {
        if self.listening_flag().swap(true, Ordering::SeqCst) {
            return Err(DiscordError::AlreadyListening);
        }

        let (tx, rx) = mpsc::channel(MESSAGE_QUEUE_CAPACITY);
        let mut sessions: Vec<Arc<dyn Session>> = Vec::with_capacity(shards.len());

        for shard in shards {
            info!("Opening shard {}/{}", shard.id, shard.total);

            let handler = ShardHandler::new(self.clone(), tx.clone());
            match connector.connect(shard, handler).await {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    error!(
                        "Failed to open shard {}/{} ({} already open): {}",
                        shard.id,
                        shard.total,
                        sessions.len(),
                        e
                    );
                    return Err(e);
                }
            }
        }

        info!("{} shard(s) connected", sessions.len());
        self.install_sessions(sessions)?;

        Ok(rx)
    }
}
