//! logwire daemon
//!
//! Configures logging for the process, then keeps a configuration listener
//! open so the logging setup can be changed at runtime.
//!
//! ```text
//!   logwire-cli update-config ──TCP──▶ ┌──────────────┐
//!                                      │   listener   │──▶ engine.apply
//!                                      └──────────────┘
//!   tracing events ──▶ EngineLayer ──▶ engine ──▶ handlers (console, file, ...)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use logwire::config::schema::{ListenerConfig, DEFAULT_LISTEN_PORT};
use logwire::config::ConfigSource;
use logwire::engine::{init_tracing, LogEngine, LoggingEngine};
use logwire::lifecycle::setup_logging;
use logwire::net::ConfigListener;
use logwire::observability::metrics::init_metrics;

#[derive(Parser)]
#[command(name = "logwire")]
#[command(about = "Run with live-reconfigurable logging", long_about = None)]
struct Args {
    /// Logging config file or inline YAML/JSON. Falls back to LOG_CONFIG.
    #[arg(short, long)]
    config: Option<String>,

    /// Listener port. Overrides the document's `listen` key.
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind the listener on.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Expose Prometheus metrics on this address.
    #[arg(long)]
    metrics_address: Option<SocketAddr>,

    /// Seconds between heartbeat log lines (0 disables them).
    #[arg(long, default_value_t = 5)]
    heartbeat_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let engine: Arc<dyn LoggingEngine> = Arc::new(LogEngine::new());
    init_tracing(Arc::clone(&engine))?;

    let setup = setup_logging(Arc::clone(&engine), ConfigSource::from(args.config.clone()))?;
    tracing::info!("logwire v{} starting", env!("CARGO_PKG_VERSION"));

    if let Some(addr) = args.metrics_address {
        init_metrics(addr)?;
    }

    let port = args
        .port
        .or(setup.listen_port())
        .unwrap_or(DEFAULT_LISTEN_PORT);
    let listener_config = ListenerConfig {
        bind_address: format!("{}:{}", args.host, port),
        ..ListenerConfig::default()
    };
    let listener = ConfigListener::start(Arc::clone(&engine), listener_config, None).await?;

    let mut heartbeat = (args.heartbeat_secs > 0)
        .then(|| tokio::time::interval(Duration::from_secs(args.heartbeat_secs)));
    let mut beats: u64 = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = async {
                match heartbeat.as_mut() {
                    Some(interval) => { interval.tick().await; }
                    None => std::future::pending::<()>().await,
                }
            } => {
                beats += 1;
                tracing::debug!(beats, "heartbeat");
                tracing::info!(beats, "heartbeat");
                tracing::warn!(beats, "heartbeat");
                tracing::error!(beats, "heartbeat");
            }
        }
    }

    tracing::info!("Shutdown signal received");
    listener.stop().await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
