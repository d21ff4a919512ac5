//! boardgen daemon
//!
//! Serves the design-agent endpoint: POST /api/design with a prompt,
//! receive the run's evidence stream as server-sent events.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use boardgend::server;

#[derive(Parser)]
#[command(name = "boardgend")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "LLM circuit design agent daemon", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "BOARDGEN_ADDR", default_value = "127.0.0.1:8080")]
    addr: String,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Initialise the global tracing subscriber. Respects `RUST_LOG`; safe to
/// call more than once (later calls are ignored).
fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(args.json, level);

    let state = Arc::new(server::AppState::from_env());
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind(&args.addr).await?;
    tracing::info!(addr = %args.addr, version = env!("CARGO_PKG_VERSION"), "boardgend listening");
    axum::serve(listener, app).await?;
    Ok(())
}
