//! Margin HTTP Server
//!
//! Serves project files and streams AI thoughts about them over SSE.

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use margin_server::{ServerConfig, ThoughtServer};

/// Margin server - AI margin notes for project files
#[derive(Parser, Debug)]
#[command(name = "margin-server")]
#[command(about = "HTTP server streaming AI thoughts about project files")]
struct Args {
    #[command(flatten)]
    config: ServerConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();

    let server = ThoughtServer::new(args.config);
    server.run().await?;

    Ok(())
}
