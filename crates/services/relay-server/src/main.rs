//! Relay server binary entry point
//!
//! # Usage
//!
//! ```bash
//! # Listen on 0.0.0.0:3000
//! cargo run -p peerdrop-relay
//!
//! # Pick the port from the environment
//! PORT=8080 cargo run -p peerdrop-relay
//!
//! # Bind a specific interface
//! cargo run -p peerdrop-relay -- --host 127.0.0.1 --port 3000
//! ```

use clap::Parser;
use peerdrop_core::{RelayConfig, DEFAULT_RELAY_PORT};
use peerdrop_relay::RelayServer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// peerdrop signaling relay
///
/// Tracks connected clients and forwards offers, answers and ICE candidates
/// between them.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Interface to bind
    #[arg(long, default_value = "0.0.0.0", env = "PEERDROP_HOST")]
    host: String,

    /// TCP port to listen on
    #[arg(short, long, default_value_t = DEFAULT_RELAY_PORT, env = "PORT")]
    port: u16,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Set up Ctrl+C handler at the very start
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_handler = Arc::clone(&shutdown_flag);

    ctrlc::set_handler(move || {
        eprintln!("\nCtrl+C received, shutting down...");

        if shutdown_flag_handler.swap(true, Ordering::SeqCst) {
            eprintln!("Shutdown already in progress, forcing exit");
            std::process::exit(0);
        }

        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_secs(3));
            eprintln!("Graceful shutdown timeout (3s), forcing exit");
            std::process::exit(0);
        });
    })?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("relay-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args, shutdown_flag))
}

async fn async_main(
    args: Args,
    shutdown_flag: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %args.host,
        port = args.port,
        "peerdrop relay starting"
    );

    let config = RelayConfig {
        host: args.host,
        port: args.port,
    };
    let relay = RelayServer::bind(config).await?;
    info!("Relay running on {}. Press Ctrl+C to shutdown.", relay.local_addr());

    while !shutdown_flag.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }

    info!("Shutdown signal received, cleaning up...");
    relay.shutdown().await;
    info!("Relay shut down gracefully");

    Ok(())
}

fn init_tracing() {
    // Initialize tracing with EnvFilter for RUST_LOG support
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
