//! Signaling relay server
//!
//! ```bash
//! rtc-overlay --bind 0.0.0.0:8000
//! RUST_LOG=rtc_overlay=debug rtc-overlay --idle-timeout-secs 60
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rtc_overlay::{RegistryConfig, RelayServer, ServerConfig};

/// Pairs a producer and a viewer per session and relays their negotiation
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8000", env = "RTC_OVERLAY_BIND")]
    bind: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    #[arg(long, default_value_t = 0, env = "RTC_OVERLAY_MAX_CONNECTIONS")]
    max_connections: usize,

    /// Tear down sessions without negotiation activity for this long
    #[arg(long, default_value_t = 300, env = "RTC_OVERLAY_IDLE_TIMEOUT_SECS")]
    idle_timeout_secs: u64,

    /// How often idle sessions are swept
    #[arg(long, default_value_t = 15, env = "RTC_OVERLAY_CLEANUP_INTERVAL_SECS")]
    cleanup_interval_secs: u64,

    /// Per-connection outbound queue capacity
    #[arg(long, default_value_t = 64, env = "RTC_OVERLAY_OUTBOUND_CAPACITY")]
    outbound_capacity: usize,

    /// Seconds between keepalive pings
    #[arg(long, default_value_t = 15, env = "RTC_OVERLAY_PING_INTERVAL_SECS")]
    ping_interval_secs: u64,

    /// Drop connections silent for this many seconds
    #[arg(long, default_value_t = 45, env = "RTC_OVERLAY_KEEPALIVE_TIMEOUT_SECS")]
    keepalive_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing()?;

    let config = ServerConfig::with_addr(args.bind)
        .max_connections(args.max_connections)
        .outbound_capacity(args.outbound_capacity)
        .ping_interval(Duration::from_secs(args.ping_interval_secs))
        .keepalive_timeout(Duration::from_secs(args.keepalive_timeout_secs));
    let registry_config = RegistryConfig::default()
        .idle_timeout(Duration::from_secs(args.idle_timeout_secs))
        .cleanup_interval(Duration::from_secs(args.cleanup_interval_secs));

    let server = RelayServer::with_registry_config(config, registry_config);

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    tracing::info!("Relay stopped");
    Ok(())
}

fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
    Ok(())
}
