//! `PostgreSQL` backend for Vidly.
//!
//! [`PgStore`] implements every store trait from `vidly-core` on a sqlx
//! connection pool. It supports native transactions: [`Database::begin`]
//! opens a [`PgSession`] whose reads lock the rows they touch
//! (`SELECT ... FOR UPDATE`) until the session commits or aborts.
//!
//! Outside a session every call runs on its own pooled connection and
//! commits immediately. Stock and rented-count changes are single
//! conditional `UPDATE ... RETURNING` statements, so two requests racing for
//! the last copy cannot both win even without a session.
//!
//! # Example
//!
//! ```ignore
//! use vidly_postgres::{PgConfig, PgStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PgStore::connect(&PgConfig::new("postgres://localhost/vidly")).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

mod queries;

use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions, Postgres};
use std::time::Duration;
use tokio::sync::Mutex;
use vidly_core::error::StoreError;
use vidly_core::store::{
    Database, Entity, RentalLedger, RentalStore, Repository, Session, StoreFuture, UserDirectory,
};
use vidly_core::types::{
    Customer, CustomerId, Genre, Movie, MovieId, Rental, RentalId, RentalKind, Transaction,
    TransactionId, User,
};

/// Errors raised while setting up the backend.
#[derive(Debug, thiserror::Error)]
pub enum PgError {
    /// The pool could not connect.
    #[error("Failed to connect to PostgreSQL: {0}")]
    Connect(#[source] sqlx::Error),

    /// A migration failed.
    #[error("Migration failed: {0}")]
    Migrate(#[source] sqlx::migrate::MigrateError),
}

/// Connection settings.
#[derive(Debug, Clone)]
pub struct PgConfig {
    /// Connection URL
    pub url: String,
    /// Pool size
    pub max_connections: u32,
    /// How long to wait for a pooled connection
    pub connect_timeout: Duration,
}

impl PgConfig {
    /// Settings for `url` with a pool of 10 and a 5 second timeout.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Store backed by a `PostgreSQL` connection pool.
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Open a pool with the given settings.
    ///
    /// # Errors
    ///
    /// Returns [`PgError::Connect`] if the database is unreachable.
    pub async fn connect(config: &PgConfig) -> Result<Self, PgError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect(&config.url)
            .await
            .map_err(PgError::Connect)?;

        tracing::info!(max_connections = config.max_connections, "Connected to PostgreSQL");
        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create or upgrade the schema.
    ///
    /// # Errors
    ///
    /// Returns [`PgError::Migrate`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), PgError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(PgError::Migrate)?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn acquire(&self) -> Result<PoolConnection<Postgres>, StoreError> {
        self.pool.acquire().await.map_err(queries::backend)
    }
}

/// A native transaction opened by [`PgStore`].
///
/// Dropping the session without committing rolls the transaction back.
pub struct PgSession {
    tx: Mutex<sqlx::Transaction<'static, Postgres>>,
}

impl std::fmt::Debug for PgSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgSession").finish_non_exhaustive()
    }
}

impl Session for PgSession {
    fn commit(self: Box<Self>) -> StoreFuture<'static, ()> {
        Box::pin(async move {
            self.tx
                .into_inner()
                .commit()
                .await
                .map_err(queries::backend)
        })
    }

    fn abort(self: Box<Self>) -> StoreFuture<'static, ()> {
        Box::pin(async move {
            self.tx
                .into_inner()
                .rollback()
                .await
                .map_err(queries::backend)
        })
    }
}

/// Implements [`RentalStore`] on top of `queries`.
///
/// `$acquire` yields something that derefs to `PgConnection`; `$lock` says
/// whether reads take row locks.
macro_rules! rental_store_via_queries {
    ($target:ty, lock = $lock:expr, |$this:ident| $acquire:expr) => {
        impl RentalStore for $target {
            fn find_customer(&self, id: CustomerId) -> StoreFuture<'_, Option<Customer>> {
                Box::pin(async move {
                    let $this = self;
                    let mut handle = $acquire;
                    queries::find_customer(&mut handle, id, $lock).await
                })
            }

            fn find_movie(&self, id: MovieId) -> StoreFuture<'_, Option<Movie>> {
                Box::pin(async move {
                    let $this = self;
                    let mut handle = $acquire;
                    queries::find_movie(&mut handle, id, $lock).await
                })
            }

            fn find_active_rental(
                &self,
                customer_id: CustomerId,
                movie_id: MovieId,
            ) -> StoreFuture<'_, Option<Rental>> {
                Box::pin(async move {
                    let $this = self;
                    let mut handle = $acquire;
                    queries::find_active_rental(&mut handle, customer_id, movie_id, $lock).await
                })
            }

            fn adjust_movie_stock(
                &self,
                id: MovieId,
                delta: i32,
                marker: Option<TransactionId>,
            ) -> StoreFuture<'_, Movie> {
                Box::pin(async move {
                    let $this = self;
                    let mut handle = $acquire;
                    queries::adjust_movie_stock(&mut handle, id, delta, marker).await
                })
            }

            fn adjust_customer_rentals(
                &self,
                id: CustomerId,
                delta: i32,
                marker: Option<TransactionId>,
            ) -> StoreFuture<'_, Customer> {
                Box::pin(async move {
                    let $this = self;
                    let mut handle = $acquire;
                    queries::adjust_customer_rentals(&mut handle, id, delta, marker).await
                })
            }

            fn insert_rental(&self, rental: Rental) -> StoreFuture<'_, Rental> {
                Box::pin(async move {
                    let $this = self;
                    let mut handle = $acquire;
                    queries::write_rental(&mut handle, &rental, false).await?;
                    Ok(rental)
                })
            }

            fn close_rental(&self, rental: Rental) -> StoreFuture<'_, Rental> {
                Box::pin(async move {
                    let $this = self;
                    let mut handle = $acquire;
                    queries::close_rental(&mut handle, &rental).await?;
                    Ok(rental)
                })
            }

            fn replace_rental(&self, rental: Rental) -> StoreFuture<'_, Rental> {
                Box::pin(async move {
                    let $this = self;
                    let mut handle = $acquire;
                    queries::write_rental(&mut handle, &rental, true).await?;
                    Ok(rental)
                })
            }

            fn delete_rental(&self, id: RentalId) -> StoreFuture<'_, Option<Rental>> {
                Box::pin(async move {
                    let $this = self;
                    let mut handle = $acquire;
                    queries::delete_rental(&mut handle, id).await
                })
            }

            fn save_transaction(&self, transaction: Transaction) -> StoreFuture<'_, Transaction> {
                Box::pin(async move {
                    let $this = self;
                    let mut handle = $acquire;
                    queries::save_transaction(&mut handle, &transaction).await?;
                    Ok(transaction)
                })
            }

            fn release_pending_markers(
                &self,
                transaction_id: TransactionId,
                movie_id: MovieId,
                customer_id: CustomerId,
            ) -> StoreFuture<'_, ()> {
                Box::pin(async move {
                    let $this = self;
                    let mut handle = $acquire;
                    queries::release_pending_markers(&mut handle, transaction_id, movie_id, customer_id)
                        .await
                })
            }
        }
    };
}

rental_store_via_queries!(PgStore, lock = false, |store| store.acquire().await?);
rental_store_via_queries!(PgSession, lock = true, |session| session.tx.lock().await);

impl RentalLedger for PgStore {
    fn find_rental(&self, id: RentalId) -> StoreFuture<'_, Option<Rental>> {
        Box::pin(async move {
            let mut conn = self.acquire().await?;
            queries::find_rental(&mut conn, id).await
        })
    }

    fn list_rentals(&self, kind: RentalKind) -> StoreFuture<'_, Vec<Rental>> {
        Box::pin(async move {
            let mut conn = self.acquire().await?;
            queries::list_rentals(&mut conn, kind).await
        })
    }

    fn find_transaction(&self, id: TransactionId) -> StoreFuture<'_, Option<Transaction>> {
        Box::pin(async move {
            let mut conn = self.acquire().await?;
            queries::find_transaction(&mut conn, id).await
        })
    }
}

impl UserDirectory for PgStore {
    fn find_user_by_email(&self, email: &str) -> StoreFuture<'_, Option<User>> {
        let email = email.to_string();
        Box::pin(async move {
            let mut conn = self.acquire().await?;
            queries::find_user_by_email(&mut conn, &email).await
        })
    }
}

macro_rules! repository_via_queries {
    (
        $entity:ty,
        find = $find:ident $(($lock:expr))?,
        list = $list:ident,
        insert = $insert:ident,
        update = $update:ident,
        delete = $delete:ident,
        delete_all = $delete_all:ident $(,)?
    ) => {
        impl Repository<$entity> for PgStore {
            fn find(&self, id: <$entity as Entity>::Id) -> StoreFuture<'_, Option<$entity>> {
                Box::pin(async move {
                    let mut conn = self.acquire().await?;
                    queries::$find(&mut conn, id $(, $lock)?).await
                })
            }

            fn list(&self) -> StoreFuture<'_, Vec<$entity>> {
                Box::pin(async move {
                    let mut conn = self.acquire().await?;
                    queries::$list(&mut conn).await
                })
            }

            fn insert(&self, record: $entity) -> StoreFuture<'_, $entity> {
                Box::pin(async move {
                    let mut conn = self.acquire().await?;
                    queries::$insert(&mut conn, &record).await?;
                    Ok(record)
                })
            }

            fn update(&self, record: $entity) -> StoreFuture<'_, $entity> {
                Box::pin(async move {
                    let mut conn = self.acquire().await?;
                    queries::$update(&mut conn, &record).await?.ok_or_else(|| {
                        StoreError::not_found(<$entity as Entity>::NAME, Entity::id(&record))
                    })
                })
            }

            fn delete(&self, id: <$entity as Entity>::Id) -> StoreFuture<'_, Option<$entity>> {
                Box::pin(async move {
                    let mut conn = self.acquire().await?;
                    queries::$delete(&mut conn, id).await
                })
            }

            fn delete_all(&self) -> StoreFuture<'_, u64> {
                Box::pin(async move {
                    let mut conn = self.acquire().await?;
                    queries::$delete_all(&mut conn).await
                })
            }
        }
    };
}

repository_via_queries!(
    Genre,
    find = find_genre,
    list = list_genres,
    insert = insert_genre,
    update = update_genre,
    delete = delete_genre,
    delete_all = delete_all_genres,
);
repository_via_queries!(
    Movie,
    find = find_movie(false),
    list = list_movies,
    insert = insert_movie,
    update = update_movie,
    delete = delete_movie,
    delete_all = delete_all_movies,
);
repository_via_queries!(
    Customer,
    find = find_customer(false),
    list = list_customers,
    insert = insert_customer,
    update = update_customer,
    delete = delete_customer,
    delete_all = delete_all_customers,
);
repository_via_queries!(
    User,
    find = find_user,
    list = list_users,
    insert = insert_user,
    update = update_user,
    delete = delete_user,
    delete_all = delete_all_users,
);

impl Database for PgStore {
    fn supports_transactions(&self) -> bool {
        true
    }

    fn begin(&self) -> StoreFuture<'_, Box<dyn Session>> {
        Box::pin(async move {
            let tx = self.pool.begin().await.map_err(queries::backend)?;
            let session: Box<dyn Session> = Box::new(PgSession { tx: Mutex::new(tx) });
            Ok(session)
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut conn = self.acquire().await?;
            queries::ping(&mut conn).await
        })
    }
}

