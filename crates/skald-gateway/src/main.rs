//! Skald gateway binary.
//!
//! # Usage
//!
//! ```bash
//! # Development loopback (no homeserver)
//! SKALD_PASSWORD=hunter2 SKALD_API_KEY=secret \
//!     skald --bind 0.0.0.0:4785 --user-id @skald:example.org
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use skald_client::{MemoryClient, Room, RoomId, UserId};
use skald_gateway::GatewayConfig;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Skald webhook-to-chat relay
#[derive(Parser, Debug)]
#[command(name = "skald")]
#[command(about = "Relays HTTP webhooks into encrypted chat rooms")]
#[command(version)]
struct Args {
    /// Address to bind the webhook listener to
    #[arg(short, long, default_value = "0.0.0.0:4785")]
    bind: SocketAddr,

    /// User id to log in as
    #[arg(short, long, default_value = "@skald:example.org")]
    user_id: String,

    /// Login password (only used when no credentials are stored)
    #[arg(long, env = "SKALD_PASSWORD", hide_env_values = true)]
    password: String,

    /// Shared secret webhook callers must present
    #[arg(long, env = "SKALD_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Path of the persisted credentials record
    #[arg(long, default_value = "creds.json")]
    credentials_file: PathBuf,

    /// Sync long-poll interval in milliseconds
    #[arg(long, default_value = "30000")]
    poll_interval_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("skald gateway starting");
    tracing::warn!("no homeserver connector configured - using the in-memory loopback client");
    tracing::warn!("this is NOT suitable for production use!");

    let user_id = UserId::new(args.user_id.as_str());
    let client = MemoryClient::new(user_id.clone(), args.password.clone());

    // Give the loopback something to relay into.
    let sandbox = RoomId::new("!sandbox:skald");
    client.seed_room(Room {
        id: sandbox.clone(),
        name: "sandbox".to_string(),
        encrypted: false,
        members: vec![user_id],
    });
    tracing::info!("loopback room available at POST /{sandbox}");

    let config = GatewayConfig {
        bind: args.bind,
        api_key: args.api_key,
        password: args.password,
        credentials_file: args.credentials_file,
        poll_interval: Duration::from_millis(args.poll_interval_ms),
    };

    skald_gateway::run(config, Arc::new(client)).await?;

    Ok(())
}
