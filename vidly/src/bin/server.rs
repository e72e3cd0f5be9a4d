//! Vidly Server
//!
//! Serves the movie rental REST API.
//!
//! # Usage
//!
//! ```bash
//! # In-memory store
//! cargo run --bin vidly-server
//!
//! # PostgreSQL store
//! STORE_BACKEND=postgres DATABASE_URL=postgres://localhost/vidly cargo run --bin vidly-server
//! ```

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vidly::{Application, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,vidly=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Vidly server...");

    let config = Config::from_env()?;
    tracing::info!(
        address = %config.bind_address(),
        backend = ?config.store.backend,
        strategy = %config.workflow.strategy,
        "Configuration loaded"
    );

    let metrics = if config.server.metrics_enabled {
        Some(vidly_runtime::metrics::install_prometheus()?)
    } else {
        None
    };

    let app = Application::build(&config, metrics).await?;
    tracing::info!("Press Ctrl+C to shut down");
    app.run().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
