//! cordlink-gateway: main binary
//!
//! Usage:
//!   cordlink-gateway                   - Connect using ./cordlink.toml or the environment
//!   cordlink-gateway --config <path>   - Connect using the given configuration file
//!   cordlink-gateway --help            - Show help

mod consumer;

use cordlink_core::Config;
use cordlink_discord::{ClientSettings, DiscordClient};
use tracing_subscriber::EnvFilter;

/// Run mode
#[derive(Debug, PartialEq, Eq)]
enum RunMode {
    /// Connect and consume messages
    Run { config_path: Option<String> },
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mode = parse_args(std::env::args().skip(1));

    let config_path = match mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("cordlink-gateway {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Run { config_path } => config_path,
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    let config = match config_path {
        Some(path) => Config::from_toml_file(&path),
        None => Config::load(),
    }
    .map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting cordlink-gateway...");

    let settings = ClientSettings::new(
        config.discord.token.clone(),
        config.discord.owner_user_id.clone(),
        config.discord.client_id.clone(),
    )
    .allow_bots(config.discord.allow_bots)
    .message_cache_size(config.discord.message_cache_size);
    let client = DiscordClient::with_settings(settings);

    let messages = match config.shards.single_shard() {
        Some((total, id)) => {
            tracing::info!("Running shard {} of {}", id, total);
            client.listen_configure(total, id).await
        }
        None => client.listen(config.shards.count).await,
    }
    .map_err(|e| anyhow::anyhow!("Failed to connect to Discord: {}", e))?;

    tracing::info!(
        "Connected as {} ({}) on {} shard(s), {} guild(s), {} user(s)",
        client.user_name(),
        client.user_id(),
        client.sessions().len(),
        client.guilds().len(),
        client.user_count()
    );
    tracing::info!("Press Ctrl+C to exit");

    tokio::select! {
        _ = consumer::run(client, messages) => {
            tracing::warn!("Message queue closed");
        }
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Shutting down...");
        }
    }

    Ok(())
}

/// Parse command line arguments
fn parse_args(args: impl IntoIterator<Item = String>) -> RunMode {
    let mut args = args.into_iter();
    let mut config_path = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return RunMode::Help,
            "--version" | "-v" => return RunMode::Version,
            "--config" | "-c" => config_path = args.next(),
            _ => {}
        }
    }

    RunMode::Run { config_path }
}

/// Print help message
fn print_help() {
    println!("cordlink-gateway - Discord gateway relay");
    println!();
    println!("Usage:");
    println!("  cordlink-gateway                  Connect and log incoming messages");
    println!("  cordlink-gateway --config <path>  Use a specific configuration file");
    println!("  cordlink-gateway --help           Show this help message");
    println!("  cordlink-gateway --version        Show version");
    println!();
    println!("Environment Variables:");
    println!("  DISCORD_BOT_TOKEN           Bot token (required)");
    println!("  DISCORD_OWNER_USER_ID       User ID of the bot owner");
    println!("  DISCORD_CLIENT_ID           Application client ID");
    println!("  DISCORD_ALLOW_BOTS          Pass messages from other bots (default: false)");
    println!("  DISCORD_MESSAGE_CACHE_SIZE  Messages cached per channel (default: 100)");
    println!("  DISCORD_SHARD_COUNT         Shards to open (default: recommended)");
    println!("  DISCORD_SHARD_ID            Run only this shard");
    println!("  DISCORD_SHARD_TOTAL         Shard topology size when DISCORD_SHARD_ID is set");
}
