//! Persistence traits.
//!
//! Backends implement these traits; the workflow and the HTTP layer only see
//! `Arc<dyn Database>`.
//!
//! # Design
//!
//! - [`Repository`] covers plain CRUD for genres, movies, customers and users.
//! - [`RentalStore`] is the narrow set of reads and conditional writes the
//!   rental workflow needs. It is implemented both by the database itself
//!   (each call commits on its own) and by a [`Session`] (calls share one
//!   native transaction).
//! - [`RentalLedger`] is the read side of rentals and transactions.
//!
//! Stock and rented-count changes are *conditional* writes: the backend
//! applies the delta only if the result stays in range, otherwise it returns
//! [`StoreError::Conflict`]. Read-then-write in application memory is never
//! enough to protect the last copy of a movie.
//!
//! # Implementations
//!
//! - `PgStore` (in `vidly-postgres`): production backend with native transactions
//! - `InMemoryStore` (in `vidly-testing`): fast, deterministic, fault-injectable
//!
//! These traits use explicit `Pin<Box<dyn Future>>` returns instead of
//! `async fn` so they stay dyn-compatible.

use crate::error::StoreError;
use crate::types::{
    Customer, CustomerId, Genre, GenreId, Movie, MovieId, Rental, RentalId, RentalKind,
    Transaction, TransactionId, User, UserId,
};
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;

/// Boxed future returned by every store operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// A record addressable by id.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Identifier type
    type Id: Copy + Eq + Hash + Display + Send + Sync + 'static;

    /// Name used in errors and logs
    const NAME: &'static str;

    /// This record's id
    fn id(&self) -> Self::Id;

    /// Key the `list` operation sorts by
    fn sort_key(&self) -> String;

    /// Take the fields only the rental workflow writes from `stored`.
    ///
    /// [`Repository::update`] applies this before writing, so an edit made
    /// from a stale read never overwrites a concurrent borrow or return.
    #[must_use]
    fn keep_workflow_fields(self, _stored: &Self) -> Self {
        self
    }
}

impl Entity for Genre {
    type Id = GenreId;
    const NAME: &'static str = "genre";

    fn id(&self) -> GenreId {
        self.id
    }

    fn sort_key(&self) -> String {
        self.name.clone()
    }
}

impl Entity for Movie {
    type Id = MovieId;
    const NAME: &'static str = "movie";

    fn id(&self) -> MovieId {
        self.id
    }

    fn sort_key(&self) -> String {
        self.title.clone()
    }

    fn keep_workflow_fields(self, stored: &Self) -> Self {
        Self {
            pending_transactions: stored.pending_transactions.clone(),
            ..self
        }
    }
}

impl Entity for Customer {
    type Id = CustomerId;
    const NAME: &'static str = "customer";

    fn id(&self) -> CustomerId {
        self.id
    }

    fn sort_key(&self) -> String {
        self.name.clone()
    }
    fn keep_workflow_fields(self, stored: &Self) -> Self {
        Self {
            number_of_movies_rented: stored.number_of_movies_rented,
            pending_transactions: stored.pending_transactions.clone(),
            ..self
        }
    }
}

impl Entity for User {
    type Id = UserId;
    const NAME: &'static str = "user";

    fn id(&self) -> UserId {
        self.id
    }

    fn sort_key(&self) -> String {
        self.name.clone()
    }
}

/// Plain CRUD over one entity type.
pub trait Repository<T: Entity>: Send + Sync {
    /// Load one record.
    fn find(&self, id: T::Id) -> StoreFuture<'_, Option<T>>;

    /// All records, sorted by [`Entity::sort_key`].
    fn list(&self) -> StoreFuture<'_, Vec<T>>;

    /// Insert a new record.
    ///
    /// Fails with [`StoreError::Duplicate`] when a uniqueness constraint is hit.
    fn insert(&self, record: T) -> StoreFuture<'_, T>;

    /// Overwrite an existing record and return it as stored.
    ///
    /// Fields owned by the rental workflow (a customer's rented count, pending
    /// transaction markers) keep their stored values; see
    /// [`Entity::keep_workflow_fields`].
    ///
    /// Fails with [`StoreError::NotFound`] when the record does not exist.
    fn update(&self, record: T) -> StoreFuture<'_, T>;

    /// Remove one record, returning it if it existed.
    ///
    /// Fails with [`StoreError::Conflict`] when an active rental still references it.
    fn delete(&self, id: T::Id) -> StoreFuture<'_, Option<T>>;

    /// Remove every record that is not referenced by an active rental.
    ///
    /// Returns how many were removed.
    fn delete_all(&self) -> StoreFuture<'_, u64>;
}

/// User lookups beyond plain CRUD.
pub trait UserDirectory: Send + Sync {
    /// Find the user registered under `email` (case-insensitive).
    fn find_user_by_email(&self, email: &str) -> StoreFuture<'_, Option<User>>;
}

/// Reads and writes of the rental workflow.
pub trait RentalStore: Send + Sync {
    /// Load a customer. Inside a session the row stays locked until commit.
    fn find_customer(&self, id: CustomerId) -> StoreFuture<'_, Option<Customer>>;

    /// Load a movie. Inside a session the row stays locked until commit.
    fn find_movie(&self, id: MovieId) -> StoreFuture<'_, Option<Movie>>;

    /// The active (`borrow`, unreturned) rental for a customer/movie pair.
    fn find_active_rental(
        &self,
        customer_id: CustomerId,
        movie_id: MovieId,
    ) -> StoreFuture<'_, Option<Rental>>;

    /// Add `delta` to the stock if the result is non-negative, and record
    /// `marker` as pending on the movie when given.
    ///
    /// Fails with [`StoreError::Conflict`] when the stock would go negative.
    fn adjust_movie_stock(
        &self,
        id: MovieId,
        delta: i32,
        marker: Option<TransactionId>,
    ) -> StoreFuture<'_, Movie>;

    /// Add `delta` to the rented count if the result stays within
    /// `0..=MAX_RENTALS_PER_CUSTOMER`, and record `marker` as pending.
    ///
    /// Fails with [`StoreError::Conflict`] when the count would leave that range.
    fn adjust_customer_rentals(
        &self,
        id: CustomerId,
        delta: i32,
        marker: Option<TransactionId>,
    ) -> StoreFuture<'_, Customer>;

    /// Insert a new active rental.
    ///
    /// Fails with [`StoreError::Duplicate`] when the pair already has one.
    fn insert_rental(&self, rental: Rental) -> StoreFuture<'_, Rental>;

    /// Store the closed form of a rental, provided the stored one is still active.
    ///
    /// Fails with [`StoreError::Conflict`] when another request closed it first.
    fn close_rental(&self, rental: Rental) -> StoreFuture<'_, Rental>;

    /// Overwrite a rental unconditionally (used to reopen it on rollback).
    fn replace_rental(&self, rental: Rental) -> StoreFuture<'_, Rental>;

    /// Remove a rental, returning it if it existed.
    fn delete_rental(&self, id: RentalId) -> StoreFuture<'_, Option<Rental>>;

    /// Insert or overwrite a transaction record.
    fn save_transaction(&self, transaction: Transaction) -> StoreFuture<'_, Transaction>;

    /// Remove `transaction_id` from the movie's and the customer's pending lists.
    fn release_pending_markers(
        &self,
        transaction_id: TransactionId,
        movie_id: MovieId,
        customer_id: CustomerId,
    ) -> StoreFuture<'_, ()>;
}

/// Read side of the rental ledger.
pub trait RentalLedger: Send + Sync {
    /// Load one rental.
    fn find_rental(&self, id: RentalId) -> StoreFuture<'_, Option<Rental>>;

    /// Rentals whose marker is `kind`, newest checkout first.
    fn list_rentals(&self, kind: RentalKind) -> StoreFuture<'_, Vec<Rental>>;

    /// Load one transaction record.
    fn find_transaction(&self, id: TransactionId) -> StoreFuture<'_, Option<Transaction>>;
}

/// A native multi-record transaction.
///
/// Writes made through the session become visible only on [`Session::commit`].
/// Dropping a session without committing discards its writes.
pub trait Session: RentalStore {
    /// Make every write of the session visible atomically.
    fn commit(self: Box<Self>) -> StoreFuture<'static, ()>;

    /// Discard every write of the session.
    fn abort(self: Box<Self>) -> StoreFuture<'static, ()>;
}

/// Everything a backend provides.
pub trait Database:
    RentalStore
    + RentalLedger
    + UserDirectory
    + Repository<Genre>
    + Repository<Movie>
    + Repository<Customer>
    + Repository<User>
{
    /// Whether [`Database::begin`] can open native transactions.
    fn supports_transactions(&self) -> bool;

    /// Open a native transaction.
    ///
    /// Fails with [`StoreError::TransactionsUnsupported`] or
    /// [`StoreError::Backend`] when none can be opened.
    fn begin(&self) -> StoreFuture<'_, Box<dyn Session>>;

    /// Cheap connectivity check for readiness.
    fn ping(&self) -> StoreFuture<'_, ()>;
}
