//! peerdrop command-line peer
//!
//! # Usage
//!
//! ```bash
//! # Show this client's identity and the other connected clients
//! peerdrop --relay ws://localhost:3000 list
//!
//! # Wait for a peer, then receive files into ./downloads
//! peerdrop receive --out ./downloads
//!
//! # Send files to a peer by identity
//! peerdrop send --to 3f2a9c... report.pdf photo.jpg
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use peerdrop_webrtc::{DataChannelMode, PeerClient, PeerClientHandle, PeerConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Peer-to-peer file transfer over WebRTC data channels
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Relay WebSocket URL
    #[arg(long, default_value = "ws://localhost:3000", env = "PEERDROP_RELAY")]
    relay: String,

    /// STUN servers (comma-separated); none means host candidates only
    #[arg(long, value_delimiter = ',', env = "PEERDROP_STUN")]
    stun_servers: Vec<String>,

    /// Bytes per chunk message
    #[arg(long, default_value_t = 16 * 1024, env = "PEERDROP_CHUNK_SIZE")]
    chunk_size: usize,

    /// Seconds to wait for a peer or a connection
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print this client's identity and the other connected clients
    List,
    /// Connect to a peer and send files, one after another
    Send {
        /// Identity of the receiving peer
        #[arg(long)]
        to: String,
        /// Files to send
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Wait for a peer to connect and save every received file
    Receive {
        /// Directory to save into
        #[arg(long, default_value = ".")]
        out: PathBuf,
        /// Exit after this many files
        #[arg(long)]
        count: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    let mut config = PeerConfig {
        relay_url: args.relay.clone(),
        stun_servers: args.stun_servers.clone(),
        data_channel_mode: DataChannelMode::Reliable,
        ..Default::default()
    };
    config.transfer.chunk_size = args.chunk_size;

    info!(version = env!("CARGO_PKG_VERSION"), relay = %config.relay_url, "peerdrop starting");

    let handle = PeerClient::start(config).await?;
    let timeout = Duration::from_secs(args.timeout);

    let identity = tokio::time::timeout(
        timeout,
        handle.wait_for(|status| status.local_id.is_some() && status.registry_received),
    )
    .await
    .context("timed out waiting for the relay")??;
    let local_id = identity.local_id.unwrap_or_default();

    let result = match args.command {
        Command::List => {
            println!("Your ID: {}", local_id);
            for peer in identity.peers {
                println!("  {}", peer);
            }
            Ok(())
        }
        Command::Send { to, files } => send(&handle, &to, files, timeout).await,
        Command::Receive { out, count } => {
            println!("Your ID: {}", local_id);
            receive(&handle, out, count).await
        }
    };

    handle.shutdown().await;
    result
}

async fn send(
    handle: &PeerClientHandle,
    to: &str,
    files: Vec<PathBuf>,
    timeout: Duration,
) -> anyhow::Result<()> {
    tokio::time::timeout(
        timeout,
        handle.wait_for(|status| status.peers.iter().any(|id| id == to)),
    )
    .await
    .with_context(|| format!("peer {} is not connected to the relay", to))??;

    handle.connect_to(to).await?;
    tokio::time::timeout(timeout, handle.wait_connected())
        .await
        .with_context(|| format!("timed out connecting to {}", to))??;

    for path in files {
        let report = handle
            .send_file(&path)
            .await
            .with_context(|| format!("failed to send {}", path.display()))?;
        println!(
            "Sent {} ({} bytes, {} chunks)",
            report.file_name, report.bytes_sent, report.chunks
        );
    }

    handle.flush().await?;
    Ok(())
}

async fn receive(
    handle: &PeerClientHandle,
    out: PathBuf,
    count: Option<usize>,
) -> anyhow::Result<()> {
    let mut saved = 0usize;

    loop {
        let target = saved + 1;
        let status = tokio::select! {
            status = handle.wait_for(|status| status.received >= target) => status?,
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, stopping");
                return Ok(());
            }
        };

        let new: Vec<usize> = (saved..status.received).collect();
        for path in handle.save_received(&new, &out).await? {
            println!("Saved {}", path.display());
        }
        saved = status.received;

        if count.is_some_and(|count| saved >= count) {
            return Ok(());
        }
    }
}

fn init_tracing() {
    // Initialize tracing with EnvFilter for RUST_LOG support
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
