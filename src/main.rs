//! Pairlink - pairing handshake and WebRTC signalling relay
//!
//! Two devices that have never met pair through a short-lived
//! human-relayable shortcode, then exchange session descriptions and
//! ICE candidates through the relay until a direct connection stands.

use anyhow::Result;
use clap::Parser;
use pairlink_core::{Config, InMemoryChannelFactory, KeyedTokenSigner};
use pairlink_pairing::{PairingEngine, PairingRegistry};
use pairlink_server::{create_router, AppState};
use pairlink_signalling::{InMemoryConnectionStore, SignallingEngine, SignedAuthValidator};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Pairlink - pair devices and relay their WebRTC signalling
#[derive(Parser, Debug)]
#[command(name = "pairlink")]
#[command(version, about, long_about = None)]
struct Args {
    /// Server port
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Shortcode validity in milliseconds
    #[arg(long, default_value = "60000")]
    pairing_ttl_ms: u64,

    /// How long a redeeming initiator waits for confirmation, in milliseconds
    #[arg(long, default_value = "10000")]
    confirm_timeout_ms: u64,

    /// Token signing secret; a random one is generated when omitted
    #[arg(long)]
    secret: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    info!("Pairlink v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::new()
        .with_port(args.port)
        .with_pairing_ttl_ms(args.pairing_ttl_ms)
        .with_confirm_timeout_ms(args.confirm_timeout_ms);

    let signer = Arc::new(match args.secret {
        Some(secret) => KeyedTokenSigner::new(secret.as_str()),
        None => {
            warn!("no --secret given; tokens will not survive a restart");
            KeyedTokenSigner::generate()
        }
    });

    let registry = Arc::new(
        PairingRegistry::new(signer.clone()).with_ttl_ms(config.pairing_ttl_ms as i64),
    );
    let engine = Arc::new(
        PairingEngine::new(Arc::new(InMemoryChannelFactory::new()), signer.clone())
            .with_config(&config),
    );
    let signalling = SignallingEngine::new(
        Arc::new(InMemoryConnectionStore::new()),
        Arc::new(SignedAuthValidator::new(signer)),
    );

    let state = Arc::new(AppState::new(config.clone(), registry, engine, signalling));
    let router = create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);
    info!("Press Ctrl+C to stop.");

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Goodbye!");
    Ok(())
}
