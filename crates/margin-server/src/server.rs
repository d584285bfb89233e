//! Server configuration and runner.

use std::sync::Arc;

use margin::{CommandGenerator, Generator, Sandbox, ThoughtStream};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::routes::{AppState, app};

/// Runs the HTTP server until a shutdown signal arrives.
#[derive(Debug)]
pub struct ThoughtServer {
    config: ServerConfig,
}

impl ThoughtServer {
    /// Create a server from its configuration.
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Handler state backed by the configured generator command.
    pub fn state(&self) -> AppState {
        let generator: Arc<dyn Generator> =
            Arc::new(CommandGenerator::new(self.config.generator.to_config()));
        let stream = ThoughtStream::new(generator, self.config.stream.to_limits());
        AppState::new(Sandbox::new(&self.config.projects_dir), stream)
    }

    /// Run the server until shutdown signal.
    pub async fn run(self) -> Result<(), ServerError> {
        let app = app(self.state(), &self.config.allowed_origins)?;
        let listener = tokio::net::TcpListener::bind(self.config.addr)
            .await
            .map_err(ServerError::Bind)?;

        tracing::info!(
            projects_dir = %self.config.projects_dir.display(),
            generator = %self.config.generator.program,
            "Starting HTTP server on {}",
            self.config.addr
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(ServerError::Serve)?;

        tracing::info!("HTTP server shut down");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
