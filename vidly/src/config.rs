//! Configuration management for the Vidly server.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Call `dotenvy::dotenv()` first to pick up a local `.env` file.

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use vidly_postgres::PgConfig;
use vidly_runtime::{ConsistencyStrategy, RetryPolicy};

/// Configuration could not be loaded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable holds a value that cannot be parsed.
    #[error("Invalid value '{value}' for {var}: {reason}")]
    Invalid {
        /// Variable name
        var: &'static str,
        /// Raw value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// A variable required by the chosen setup is unset.
    #[error("{0} must be set")]
    Missing(&'static str),
}

/// Where records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// In-process store; data is lost on exit
    #[default]
    Memory,
    /// `PostgreSQL` through `DATABASE_URL`
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(format!("expected 'memory' or 'postgres', got '{other}'")),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// How long open connections may drain after a shutdown signal
    pub shutdown_timeout: Duration,
    /// Whether `GET /metrics` is served
    pub metrics_enabled: bool,
}

/// Store settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Backend selection
    pub backend: StoreBackend,
    /// `PostgreSQL` settings, present when the backend is `Postgres`
    pub postgres: Option<PgConfig>,
}

/// Rental workflow settings.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// How multi-record writes are made atomic
    pub strategy: ConsistencyStrategy,
    /// Retries for each compensating write
    pub rollback_max_retries: usize,
    /// First retry delay; later delays double
    pub rollback_initial_delay: Duration,
}

impl WorkflowConfig {
    /// Retry policy for compensating writes.
    #[must_use]
    pub fn rollback_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.rollback_max_retries)
            .initial_delay(self.rollback_initial_delay)
            .build()
    }
}

/// Bootstrap administrator created at startup when absent.
#[derive(Debug, Clone)]
pub struct AdminSeed {
    /// Display name
    pub name: String,
    /// Login email
    pub email: String,
    /// Plain password, hashed before it is stored
    pub password: String,
}

/// Authentication settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Lifetime of issued tokens
    pub token_ttl: Duration,
    /// Administrator to create on startup
    pub admin: Option<AdminSeed>,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server
    pub server: ServerConfig,
    /// Persistence
    pub store: StoreConfig,
    /// Rental workflow
    pub workflow: WorkflowConfig,
    /// Authentication
    pub auth: AuthConfig,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is malformed, or when the
    /// `postgres` backend is selected without `DATABASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup` instead of the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Same as [`Config::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars(&lookup);

        let backend: StoreBackend = vars.parse("STORE_BACKEND", StoreBackend::default())?;
        let postgres = match backend {
            StoreBackend::Memory => None,
            StoreBackend::Postgres => {
                let url = vars
                    .get("DATABASE_URL")
                    .ok_or(ConfigError::Missing("DATABASE_URL"))?;
                Some(PgConfig {
                    url,
                    max_connections: vars.parse("DATABASE_MAX_CONNECTIONS", 10)?,
                    connect_timeout: Duration::from_secs(
                        vars.parse("DATABASE_CONNECT_TIMEOUT", 30)?,
                    ),
                })
            },
        };

        let admin = match (vars.get("ADMIN_EMAIL"), vars.get("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminSeed {
                name: vars
                    .get("ADMIN_NAME")
                    .unwrap_or_else(|| "Administrator".to_string()),
                email,
                password,
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("ADMIN_PASSWORD")),
            (None, Some(_)) => return Err(ConfigError::Missing("ADMIN_EMAIL")),
        };

        Ok(Self {
            server: ServerConfig {
                host: vars.get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: vars.parse("PORT", 3000)?,
                shutdown_timeout: Duration::from_secs(vars.parse("SHUTDOWN_TIMEOUT", 30)?),
                metrics_enabled: vars.parse("METRICS_ENABLED", true)?,
            },
            store: StoreConfig { backend, postgres },
            workflow: WorkflowConfig {
                strategy: vars.parse("CONSISTENCY_STRATEGY", ConsistencyStrategy::Auto)?,
                rollback_max_retries: vars.parse("ROLLBACK_MAX_RETRIES", 3)?,
                rollback_initial_delay: Duration::from_millis(
                    vars.parse("ROLLBACK_INITIAL_DELAY_MS", 50)?,
                ),
            },
            auth: AuthConfig {
                token_ttl: Duration::from_secs(vars.parse("TOKEN_TTL_SECONDS", 86_400)?),
                admin,
            },
        })
    }

    /// Address the server binds to.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

struct Vars<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    fn get(&self, var: &str) -> Option<String> {
        (self.0)(var).filter(|value| !value.trim().is_empty())
    }

    fn parse<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(var) {
            None => Ok(default),
            Some(value) => value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
                var,
                reason: err.to_string(),
                value,
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = load(&[]).expect("config loads");
        assert_eq!(config.bind_address(), "0.0.0.0:3000");
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(config.store.postgres.is_none());
        assert_eq!(config.workflow.strategy, ConsistencyStrategy::Auto);
        assert_eq!(config.workflow.rollback_max_retries, 3);
        assert_eq!(config.auth.token_ttl, Duration::from_secs(86_400));
        assert!(config.server.metrics_enabled);
        assert!(config.auth.admin.is_none());
    }

    #[test]
    fn postgres_backend_requires_url() {
        assert_eq!(
            load(&[("STORE_BACKEND", "postgres")]).err(),
            Some(ConfigError::Missing("DATABASE_URL"))
        );

        let config = load(&[
            ("STORE_BACKEND", "postgres"),
            ("DATABASE_URL", "postgres://localhost/vidly"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
        ])
        .expect("config loads");
        let pg = config.store.postgres.expect("postgres config");
        assert_eq!(pg.max_connections, 4);
        assert_eq!(pg.connect_timeout, Duration::from_secs(30));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = load(&[("CONSISTENCY_STRATEGY", "eventual")]).err();
        assert!(matches!(
            err,
            Some(ConfigError::Invalid { var: "CONSISTENCY_STRATEGY", .. })
        ));

        let err = load(&[("PORT", "http")]).err();
        assert!(matches!(err, Some(ConfigError::Invalid { var: "PORT", .. })));
    }

    #[test]
    fn admin_seed_needs_email_and_password() {
        let config = load(&[("ADMIN_EMAIL", "root@vidly.test"), ("ADMIN_PASSWORD", "S3cret!pw")])
            .expect("config loads");
        let admin = config.auth.admin.expect("admin seed");
        assert_eq!(admin.name, "Administrator");

        assert_eq!(
            load(&[("ADMIN_EMAIL", "root@vidly.test")]).err(),
            Some(ConfigError::Missing("ADMIN_PASSWORD"))
        );
    }
}
