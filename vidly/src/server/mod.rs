//! HTTP server for Vidly.
//!
//! [`Application::build`] wires the store, the rental workflow and the
//! token registry from [`Config`]; [`Application::run`] serves until Ctrl+C
//! or SIGTERM, then drains open connections for at most
//! `SHUTDOWN_TIMEOUT` seconds.

pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;

use crate::auth::{self, AuthError, TokenRegistry};
use crate::config::{AdminSeed, Config, StoreBackend};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{info, warn};
use vidly_core::environment::{Clock, SystemClock};
use vidly_core::error::StoreError;
use vidly_core::store::{Database, Repository, UserDirectory};
use vidly_core::types::{User, UserId};
use vidly_core::validation::{self, ValidationError};
use vidly_postgres::{PgError, PgStore};
use vidly_runtime::RentalWorkflow;
use vidly_testing::InMemoryStore;

/// Startup and serving failures.
#[derive(Error, Debug)]
pub enum ServerError {
    /// `STORE_BACKEND=postgres` without `PostgreSQL` settings.
    #[error("PostgreSQL backend selected but not configured")]
    MissingPostgresConfig,

    /// Connecting to or migrating `PostgreSQL` failed.
    #[error(transparent)]
    Postgres(#[from] PgError),

    /// The admin seed is not a valid account.
    #[error("Invalid admin seed: {0}")]
    InvalidAdminSeed(#[from] ValidationError),

    /// The admin password could not be hashed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The store rejected a startup write.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Binding or serving failed.
    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A configured, bound server ready to run.
pub struct Application {
    listener: TcpListener,
    router: Router,
    shutdown_timeout: Duration,
}

impl Application {
    /// Build every component and bind the listener.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the store cannot be opened, the admin
    /// seed cannot be written, or the address cannot be bound.
    pub async fn build(config: &Config, metrics: Option<PrometheusHandle>) -> Result<Self, ServerError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = open_store(config).await?;

        let workflow = RentalWorkflow::new(Arc::clone(&store), Arc::clone(&clock))
            .with_strategy(config.workflow.strategy)
            .with_rollback_policy(config.workflow.rollback_policy());
        info!(
            strategy = %workflow.effective_strategy(),
            "Rental workflow ready"
        );

        if let Some(seed) = &config.auth.admin {
            seed_admin(&*store, seed).await?;
        }

        let tokens = TokenRegistry::new(config.auth.token_ttl, clock);
        let state = AppState::new(store, workflow, tokens);
        let router = build_router(state, metrics);

        let listener = TcpListener::bind(config.bind_address()).await?;
        info!(address = %listener.local_addr()?, "HTTP server bound");

        Ok(Self {
            listener,
            router,
            shutdown_timeout: config.server.shutdown_timeout,
        })
    }

    /// Serve until a shutdown signal arrives.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the server fails.
    pub async fn run(self) -> Result<(), ServerError> {
        let timeout = self.shutdown_timeout;
        let draining = Arc::new(Notify::new());
        let signal = Arc::clone(&draining);

        let server = axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                signal.notify_one();
            })
            .into_future();

        let deadline = async {
            draining.notified().await;
            tokio::time::sleep(timeout).await;
        };

        tokio::select! {
            result = server => result?,
            () = deadline => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "Shutdown timeout elapsed, dropping open connections"
                );
            }
        }

        info!("HTTP server stopped");
        Ok(())
    }
}

async fn open_store(config: &Config) -> Result<Arc<dyn Database>, ServerError> {
    match config.store.backend {
        StoreBackend::Memory => {
            warn!("Using the in-memory store; data is lost on exit");
            Ok(Arc::new(InMemoryStore::new()))
        },
        StoreBackend::Postgres => {
            let pg_config = config
                .store
                .postgres
                .as_ref()
                .ok_or(ServerError::MissingPostgresConfig)?;
            let store = PgStore::connect(pg_config).await?;
            store.migrate().await?;
            info!("PostgreSQL store connected and migrated");
            Ok(Arc::new(store))
        },
    }
}

/// Create the configured administrator unless the email is already taken.
async fn seed_admin(store: &dyn Database, seed: &AdminSeed) -> Result<(), ServerError> {
    if store.find_user_by_email(&seed.email).await?.is_some() {
        info!(email = %seed.email, "Admin account already present");
        return Ok(());
    }

    validation::user_name(&seed.name)?;
    validation::email(&seed.email)?;
    validation::password(&seed.password)?;

    let admin = Repository::<User>::insert(
        store,
        User {
            id: UserId::new(),
            name: seed.name.clone(),
            email: seed.email.clone(),
            password_hash: auth::hash_password(&seed.password)?,
            is_admin: true,
        },
    )
    .await?;

    info!(user_id = %admin.id, email = %admin.email, "Admin account created");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn seed(password: &str) -> AdminSeed {
        AdminSeed {
            name: "Administrator".to_string(),
            email: "root@vidly.test".to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn admin_seed_is_created_once() {
        let store = InMemoryStore::new();

        seed_admin(&store, &seed("S3cret!pw")).await.expect("first seed");
        seed_admin(&store, &seed("S3cret!pw")).await.expect("second seed");

        let users = Repository::<User>::list(&store).await.unwrap();
        assert_eq!(users.len(), 1);
        assert!(users[0].is_admin);
        assert!(auth::verify_password("S3cret!pw", &users[0].password_hash));
    }

    #[tokio::test]
    async fn weak_admin_password_is_rejected() {
        let store = InMemoryStore::new();
        let result = seed_admin(&store, &seed("password")).await;
        assert!(matches!(result, Err(ServerError::InvalidAdminSeed(_))));
    }
}
