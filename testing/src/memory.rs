//! In-memory [`Database`] for tests and for running without Postgres.
//!
//! Every operation takes one lock over all tables, so each conditional write
//! is atomic. A store built with [`InMemoryStore::transactional`] also opens
//! native sessions: the session holds the lock until it commits or aborts,
//! and an abort restores the snapshot taken when it began.
//!
//! Faults can be injected per operation to exercise rollback paths:
//!
//! ```ignore
//! let store = InMemoryStore::new();
//! store.fail_times(StoreOp::InsertRental, 1, StoreError::Backend("disk full".into()));
//! ```

use std::collections::HashMap;
use std::future::ready;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use vidly_core::error::StoreError;
use vidly_core::store::{
    Database, Entity, RentalLedger, RentalStore, Repository, Session, StoreFuture, UserDirectory,
};
use vidly_core::types::{
    Customer, CustomerId, Movie, MovieId, Rental, RentalId, RentalKind, Transaction,
    TransactionId, User,
};

/// Operations that faults can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// `find_customer`
    FindCustomer,
    /// `find_movie`
    FindMovie,
    /// `find_active_rental`
    FindActiveRental,
    /// `adjust_movie_stock`
    AdjustMovieStock,
    /// `adjust_customer_rentals`
    AdjustCustomerRentals,
    /// `insert_rental`
    InsertRental,
    /// `close_rental`
    CloseRental,
    /// `replace_rental`
    ReplaceRental,
    /// `delete_rental`
    DeleteRental,
    /// `save_transaction`
    SaveTransaction,
    /// `release_pending_markers`
    ReleasePendingMarkers,
    /// Reads of the rental ledger
    ReadLedger,
    /// Repository and user directory calls
    Crud,
    /// `begin`
    Begin,
    /// `Session::commit`
    Commit,
    /// `ping`
    Ping,
}

#[derive(Debug)]
struct Fault {
    error: StoreError,
    skip: usize,
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct Faults {
    plan: Mutex<HashMap<StoreOp, Fault>>,
    calls: Mutex<HashMap<StoreOp, usize>>,
}

impl Faults {
    fn check(&self, op: StoreOp) -> Result<(), StoreError> {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(op)
            .or_default() += 1;

        let mut plan = self.plan.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(fault) = plan.get_mut(&op) else {
            return Ok(());
        };
        if fault.skip > 0 {
            fault.skip -= 1;
            return Ok(());
        }
        if fault.remaining == Some(0) {
            plan.remove(&op);
            return Ok(());
        }
        if let Some(remaining) = fault.remaining.as_mut() {
            *remaining -= 1;
        }
        Err(fault.error.clone())
    }

    fn set(&self, op: StoreOp, fault: Fault) {
        self.plan
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(op, fault);
    }
}

/// Table storage, sealed inside this module.
mod tables {
    use std::collections::HashMap;
    use vidly_core::error::StoreError;
    use vidly_core::store::Entity;
    use vidly_core::types::{
        Customer, CustomerId, Genre, GenreId, MAX_RENTALS_PER_CUSTOMER, Movie, MovieId, Rental,
        RentalId, RentalKind, Transaction, TransactionId, User, UserId,
    };

    /// All tables, cloned wholesale for session snapshots.
    #[derive(Debug, Clone, Default)]
    pub struct Tables {
        pub genres: HashMap<GenreId, Genre>,
        pub movies: HashMap<MovieId, Movie>,
        pub customers: HashMap<CustomerId, Customer>,
        pub users: HashMap<UserId, User>,
        pub rentals: HashMap<RentalId, Rental>,
        pub transactions: HashMap<TransactionId, Transaction>,
    }

    impl Tables {
        pub fn active_rental(&self, customer_id: CustomerId, movie_id: MovieId) -> Option<&Rental> {
            self.rentals
                .values()
                .find(|r| r.customer.id == customer_id && r.movie.id == movie_id && r.is_active())
        }

        pub fn adjust_movie_stock(
            &mut self,
            id: MovieId,
            delta: i32,
            marker: Option<TransactionId>,
        ) -> Result<Movie, StoreError> {
            let movie = self
                .movies
                .get_mut(&id)
                .ok_or_else(|| StoreError::not_found("movie", id))?;
            let stock = i64::from(movie.number_in_stock) + i64::from(delta);
            let stock = u32::try_from(stock)
                .map_err(|_| StoreError::conflict("movie", id, "stock would go negative"))?;
            movie.number_in_stock = stock;
            if let Some(marker) = marker {
                if !movie.pending_transactions.contains(&marker) {
                    movie.pending_transactions.push(marker);
                }
            }
            Ok(movie.clone())
        }

        pub fn adjust_customer_rentals(
            &mut self,
            id: CustomerId,
            delta: i32,
            marker: Option<TransactionId>,
        ) -> Result<Customer, StoreError> {
            let customer = self
                .customers
                .get_mut(&id)
                .ok_or_else(|| StoreError::not_found("customer", id))?;
            let rented = i64::from(customer.number_of_movies_rented) + i64::from(delta);
            let rented = u32::try_from(rented)
                .ok()
                .filter(|n| *n <= MAX_RENTALS_PER_CUSTOMER)
                .ok_or_else(|| {
                    StoreError::conflict(
                        "customer",
                        id,
                        format!("rented count must stay within 0..={MAX_RENTALS_PER_CUSTOMER}"),
                    )
                })?;
            customer.number_of_movies_rented = rented;
            if let Some(marker) = marker {
                if !customer.pending_transactions.contains(&marker) {
                    customer.pending_transactions.push(marker);
                }
            }
            Ok(customer.clone())
        }

        pub fn insert_rental(&mut self, rental: Rental) -> Result<Rental, StoreError> {
            if self.rentals.contains_key(&rental.id) {
                return Err(StoreError::Duplicate {
                    entity: "rental",
                    reason: format!("rental {} already exists", rental.id),
                });
            }
            if rental.is_active() && self.active_rental(rental.customer.id, rental.movie.id).is_some()
            {
                return Err(StoreError::Duplicate {
                    entity: "rental",
                    reason: "customer already has an active rental of this movie".to_string(),
                });
            }
            self.rentals.insert(rental.id, rental.clone());
            Ok(rental)
        }

        pub fn close_rental(&mut self, rental: Rental) -> Result<Rental, StoreError> {
            let stored = self
                .rentals
                .get(&rental.id)
                .ok_or_else(|| StoreError::not_found("rental", rental.id))?;
            if !stored.is_active() {
                return Err(StoreError::conflict("rental", rental.id, "already returned"));
            }
            self.rentals.insert(rental.id, rental.clone());
            Ok(rental)
        }

        pub fn release_pending_markers(
            &mut self,
            transaction_id: TransactionId,
            movie_id: MovieId,
            customer_id: CustomerId,
        ) {
            if let Some(movie) = self.movies.get_mut(&movie_id) {
                movie.pending_transactions.retain(|t| *t != transaction_id);
            }
            if let Some(customer) = self.customers.get_mut(&customer_id) {
                customer.pending_transactions.retain(|t| *t != transaction_id);
            }
        }

        pub fn list_rentals(&self, kind: RentalKind) -> Vec<Rental> {
            let mut rentals: Vec<Rental> = self
                .rentals
                .values()
                .filter(|r| r.rental_type == kind)
                .cloned()
                .collect();
            rentals.sort_by(|a, b| b.date_out.cmp(&a.date_out));
            rentals
        }
    }

    /// Per-entity table access for the generic [`Repository`] impl.
    pub trait Table: Entity {
        fn table(tables: &Tables) -> &HashMap<Self::Id, Self>;
        fn table_mut(tables: &mut Tables) -> &mut HashMap<Self::Id, Self>;

        fn in_use(_tables: &Tables, _id: Self::Id) -> bool {
            false
        }

        fn check_unique(&self, _tables: &Tables) -> Result<(), StoreError> {
            Ok(())
        }
    }

    impl Table for Genre {
        fn table(tables: &Tables) -> &HashMap<GenreId, Self> {
            &tables.genres
        }
        fn table_mut(tables: &mut Tables) -> &mut HashMap<GenreId, Self> {
            &mut tables.genres
        }
    }

    impl Table for Movie {
        fn table(tables: &Tables) -> &HashMap<MovieId, Self> {
            &tables.movies
        }
        fn table_mut(tables: &mut Tables) -> &mut HashMap<MovieId, Self> {
            &mut tables.movies
        }
        fn in_use(tables: &Tables, id: MovieId) -> bool {
            tables.rentals.values().any(|r| r.movie.id == id && r.is_active())
        }
    }

    impl Table for Customer {
        fn table(tables: &Tables) -> &HashMap<CustomerId, Self> {
            &tables.customers
        }
        fn table_mut(tables: &mut Tables) -> &mut HashMap<CustomerId, Self> {
            &mut tables.customers
        }
        fn in_use(tables: &Tables, id: CustomerId) -> bool {
            tables
                .rentals
                .values()
                .any(|r| r.customer.id == id && r.is_active())
        }
    }

    impl Table for User {
        fn table(tables: &Tables) -> &HashMap<UserId, Self> {
            &tables.users
        }
        fn table_mut(tables: &mut Tables) -> &mut HashMap<UserId, Self> {
            &mut tables.users
        }
        fn check_unique(&self, tables: &Tables) -> Result<(), StoreError> {
            let taken = tables
                .users
                .values()
                .any(|u| u.id != self.id && u.email.eq_ignore_ascii_case(&self.email));
            if taken {
                return Err(StoreError::Duplicate {
                    entity: "user",
                    reason: "email already registered".to_string(),
                });
            }
            Ok(())
        }
    }
}

use tables::{Table, Tables};

/// In-memory [`Database`].
///
/// Cloning shares the underlying tables.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<AsyncMutex<Tables>>,
    faults: Arc<Faults>,
    transactional: bool,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("transactional", &self.transactional)
            .finish_non_exhaustive()
    }
}

impl InMemoryStore {
    /// A store without native transactions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose [`Database::begin`] opens native sessions.
    #[must_use]
    pub fn transactional() -> Self {
        Self {
            transactional: true,
            ..Self::default()
        }
    }

    /// Fail every call to `op` with `error`.
    pub fn fail(&self, op: StoreOp, error: StoreError) {
        self.faults.set(
            op,
            Fault {
                error,
                skip: 0,
                remaining: None,
            },
        );
    }

    /// Fail the next `times` calls to `op`, then succeed again.
    pub fn fail_times(&self, op: StoreOp, times: usize, error: StoreError) {
        self.faults.set(
            op,
            Fault {
                error,
                skip: 0,
                remaining: Some(times),
            },
        );
    }

    /// Let the next `skip` calls to `op` through, then fail every call.
    pub fn fail_after(&self, op: StoreOp, skip: usize, error: StoreError) {
        self.faults.set(
            op,
            Fault {
                error,
                skip,
                remaining: None,
            },
        );
    }

    /// Remove every injected fault.
    pub fn clear_faults(&self) {
        self.faults
            .plan
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// How many times `op` has been called, including failed calls.
    #[must_use]
    pub fn calls(&self, op: StoreOp) -> usize {
        self.faults
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    /// Every transaction record, oldest first.
    pub async fn transactions(&self) -> Vec<Transaction> {
        let tables = self.tables.lock().await;
        let mut all: Vec<Transaction> = tables.transactions.values().cloned().collect();
        all.sort_by_key(|t| t.created_at);
        all
    }

    /// Every rental, active or closed.
    pub async fn rentals(&self) -> Vec<Rental> {
        self.tables.lock().await.rentals.values().cloned().collect()
    }

    fn run<'a, T, F>(&'a self, op: StoreOp, f: F) -> StoreFuture<'a, T>
    where
        T: Send + 'a,
        F: FnOnce(&mut Tables) -> Result<T, StoreError> + Send + 'a,
    {
        Box::pin(async move {
            self.faults.check(op)?;
            let mut tables = self.tables.lock().await;
            f(&mut tables)
        })
    }
}

impl<T: Table> Repository<T> for InMemoryStore {
    fn find(&self, id: T::Id) -> StoreFuture<'_, Option<T>> {
        self.run(StoreOp::Crud, move |tables| {
            Ok(T::table(tables).get(&id).cloned())
        })
    }

    fn list(&self) -> StoreFuture<'_, Vec<T>> {
        self.run(StoreOp::Crud, |tables| {
            let mut records: Vec<T> = T::table(tables).values().cloned().collect();
            records.sort_by_key(|r| r.sort_key());
            Ok(records)
        })
    }

    fn insert(&self, record: T) -> StoreFuture<'_, T> {
        self.run(StoreOp::Crud, move |tables| {
            if T::table(tables).contains_key(&record.id()) {
                return Err(StoreError::Duplicate {
                    entity: T::NAME,
                    reason: format!("id {} already exists", record.id()),
                });
            }
            record.check_unique(tables)?;
            T::table_mut(tables).insert(record.id(), record.clone());
            Ok(record)
        })
    }

    fn update(&self, record: T) -> StoreFuture<'_, T> {
        self.run(StoreOp::Crud, move |tables| {
            let Some(stored) = T::table(tables).get(&record.id()) else {
                return Err(StoreError::not_found(T::NAME, record.id()));
            };
            let record = record.keep_workflow_fields(stored);
            record.check_unique(tables)?;
            T::table_mut(tables).insert(record.id(), record.clone());
            Ok(record)
        })
    }

    fn delete(&self, id: T::Id) -> StoreFuture<'_, Option<T>> {
        self.run(StoreOp::Crud, move |tables| {
            if T::in_use(tables, id) {
                return Err(StoreError::conflict(
                    T::NAME,
                    id,
                    "referenced by an active rental",
                ));
            }
            Ok(T::table_mut(tables).remove(&id))
        })
    }

    fn delete_all(&self) -> StoreFuture<'_, u64> {
        self.run(StoreOp::Crud, |tables| {
            let removable: Vec<T::Id> = T::table(tables)
                .keys()
                .copied()
                .filter(|id| !T::in_use(tables, *id))
                .collect();
            let table = T::table_mut(tables);
            for id in &removable {
                table.remove(id);
            }
            Ok(u64::try_from(removable.len()).unwrap_or(u64::MAX))
        })
    }
}

impl UserDirectory for InMemoryStore {
    fn find_user_by_email(&self, email: &str) -> StoreFuture<'_, Option<User>> {
        let email = email.to_string();
        self.run(StoreOp::Crud, move |tables| {
            Ok(tables
                .users
                .values()
                .find(|u| u.email.eq_ignore_ascii_case(&email))
                .cloned())
        })
    }
}

/// Implements [`RentalStore`] by routing every call through `self.run`.
macro_rules! rental_store_via_tables {
    ($ty:ty) => {
        impl RentalStore for $ty {
            fn find_customer(&self, id: CustomerId) -> StoreFuture<'_, Option<Customer>> {
                self.run(StoreOp::FindCustomer, move |t| Ok(t.customers.get(&id).cloned()))
            }

            fn find_movie(&self, id: MovieId) -> StoreFuture<'_, Option<Movie>> {
                self.run(StoreOp::FindMovie, move |t| Ok(t.movies.get(&id).cloned()))
            }

            fn find_active_rental(
                &self,
                customer_id: CustomerId,
                movie_id: MovieId,
            ) -> StoreFuture<'_, Option<Rental>> {
                self.run(StoreOp::FindActiveRental, move |t| {
                    Ok(t.active_rental(customer_id, movie_id).cloned())
                })
            }

            fn adjust_movie_stock(
                &self,
                id: MovieId,
                delta: i32,
                marker: Option<TransactionId>,
            ) -> StoreFuture<'_, Movie> {
                self.run(StoreOp::AdjustMovieStock, move |t| {
                    t.adjust_movie_stock(id, delta, marker)
                })
            }

            fn adjust_customer_rentals(
                &self,
                id: CustomerId,
                delta: i32,
                marker: Option<TransactionId>,
            ) -> StoreFuture<'_, Customer> {
                self.run(StoreOp::AdjustCustomerRentals, move |t| {
                    t.adjust_customer_rentals(id, delta, marker)
                })
            }

            fn insert_rental(&self, rental: Rental) -> StoreFuture<'_, Rental> {
                self.run(StoreOp::InsertRental, move |t| t.insert_rental(rental))
            }

            fn close_rental(&self, rental: Rental) -> StoreFuture<'_, Rental> {
                self.run(StoreOp::CloseRental, move |t| t.close_rental(rental))
            }

            fn replace_rental(&self, rental: Rental) -> StoreFuture<'_, Rental> {
                self.run(StoreOp::ReplaceRental, move |t| {
                    t.rentals.insert(rental.id, rental.clone());
                    Ok(rental)
                })
            }

            fn delete_rental(&self, id: RentalId) -> StoreFuture<'_, Option<Rental>> {
                self.run(StoreOp::DeleteRental, move |t| Ok(t.rentals.remove(&id)))
            }

            fn save_transaction(&self, transaction: Transaction) -> StoreFuture<'_, Transaction> {
                self.run(StoreOp::SaveTransaction, move |t| {
                    t.transactions.insert(transaction.id, transaction.clone());
                    Ok(transaction)
                })
            }

            fn release_pending_markers(
                &self,
                transaction_id: TransactionId,
                movie_id: MovieId,
                customer_id: CustomerId,
            ) -> StoreFuture<'_, ()> {
                self.run(StoreOp::ReleasePendingMarkers, move |t| {
                    t.release_pending_markers(transaction_id, movie_id, customer_id);
                    Ok(())
                })
            }
        }
    };
}

rental_store_via_tables!(InMemoryStore);
rental_store_via_tables!(InMemorySession);

impl RentalLedger for InMemoryStore {
    fn find_rental(&self, id: RentalId) -> StoreFuture<'_, Option<Rental>> {
        self.run(StoreOp::ReadLedger, move |t| Ok(t.rentals.get(&id).cloned()))
    }

    fn list_rentals(&self, kind: RentalKind) -> StoreFuture<'_, Vec<Rental>> {
        self.run(StoreOp::ReadLedger, move |t| Ok(t.list_rentals(kind)))
    }

    fn find_transaction(&self, id: TransactionId) -> StoreFuture<'_, Option<Transaction>> {
        self.run(StoreOp::ReadLedger, move |t| {
            Ok(t.transactions.get(&id).cloned())
        })
    }
}

impl Database for InMemoryStore {
    fn supports_transactions(&self) -> bool {
        self.transactional
    }

    fn begin(&self) -> StoreFuture<'_, Box<dyn Session>> {
        Box::pin(async move {
            if !self.transactional {
                return Err(StoreError::TransactionsUnsupported(
                    "in-memory store was created without transactions".to_string(),
                ));
            }
            self.faults.check(StoreOp::Begin)?;
            let guard = Arc::clone(&self.tables).lock_owned().await;
            let snapshot = guard.clone();
            let session: Box<dyn Session> = Box::new(InMemorySession {
                guard: Mutex::new(guard),
                snapshot: Some(snapshot),
                faults: Arc::clone(&self.faults),
            });
            Ok(session)
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(ready(self.faults.check(StoreOp::Ping)))
    }
}

/// A native session over an [`InMemoryStore`].
///
/// Holds the table lock for its whole life. Writes go straight to the tables;
/// abort, a failed commit, or drop without commit restores the snapshot.
pub struct InMemorySession {
    guard: Mutex<OwnedMutexGuard<Tables>>,
    snapshot: Option<Tables>,
    faults: Arc<Faults>,
}

impl InMemorySession {
    fn run<'a, T, F>(&'a self, op: StoreOp, f: F) -> StoreFuture<'a, T>
    where
        T: Send + 'a,
        F: FnOnce(&mut Tables) -> Result<T, StoreError> + Send + 'a,
    {
        let result = self.faults.check(op).and_then(|()| {
            let mut guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut guard)
        });
        Box::pin(ready(result))
    }
}

impl Session for InMemorySession {
    fn commit(mut self: Box<Self>) -> StoreFuture<'static, ()> {
        let result = self.faults.check(StoreOp::Commit);
        if result.is_ok() {
            self.snapshot = None;
        }
        drop(self);
        Box::pin(ready(result))
    }

    fn abort(self: Box<Self>) -> StoreFuture<'static, ()> {
        drop(self);
        Box::pin(ready(Ok(())))
    }
}

impl Drop for InMemorySession {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            let guard = self.guard.get_mut().unwrap_or_else(PoisonError::into_inner);
            **guard = snapshot;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::fixtures;
    use vidly_core::types::MAX_RENTALS_PER_CUSTOMER;

    #[tokio::test]
    async fn stock_never_goes_negative() {
        let store = InMemoryStore::new();
        let movie = fixtures::movie("Metropolis", 1, 300);
        Repository::<Movie>::insert(&store, movie.clone()).await.unwrap();

        let after = store.adjust_movie_stock(movie.id, -1, None).await.unwrap();
        assert_eq!(after.number_in_stock, 0);

        let err = store.adjust_movie_stock(movie.id, -1, None).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { entity: "movie", .. }));
    }

    #[tokio::test]
    async fn rented_count_is_capped() {
        let store = InMemoryStore::new();
        let customer = fixtures::customer("Ada Lovelace", MAX_RENTALS_PER_CUSTOMER);
        Repository::<Customer>::insert(&store, customer.clone())
            .await
            .unwrap();

        let err = store
            .adjust_customer_rentals(customer.id, 1, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { entity: "customer", .. }));
    }

    #[tokio::test]
    async fn stale_customer_edit_keeps_concurrent_rental() {
        let store = InMemoryStore::new();
        let customer = fixtures::customer("Ada Lovelace", 0);
        Repository::<Customer>::insert(&store, customer.clone())
            .await
            .unwrap();
        let stale = Repository::<Customer>::find(&store, customer.id)
            .await
            .unwrap()
            .unwrap();

        let marker = TransactionId::new();
        store
            .adjust_customer_rentals(customer.id, 1, Some(marker))
            .await
            .unwrap();

        let updated = Repository::<Customer>::update(
            &store,
            Customer {
                phone: "5550199999".to_string(),
                ..stale
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.phone, "5550199999");
        assert_eq!(updated.number_of_movies_rented, 1);
        assert_eq!(updated.pending_transactions, vec![marker]);
        let stored = Repository::<Customer>::find(&store, customer.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, updated);
    }

    #[tokio::test]
    async fn second_active_rental_for_pair_is_duplicate() {
        let store = InMemoryStore::new();
        let customer = fixtures::customer("Ada Lovelace", 0);
        let movie = fixtures::movie("Metropolis", 3, 300);
        let first = fixtures::rental(&customer, &movie, fixtures::epoch());
        let second = fixtures::rental(&customer, &movie, fixtures::epoch());

        store.insert_rental(first).await.unwrap();
        let err = store.insert_rental(second).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { entity: "rental", .. }));
    }

    #[tokio::test]
    async fn aborted_session_restores_snapshot() {
        let store = InMemoryStore::transactional();
        let movie = fixtures::movie("Metropolis", 2, 300);
        Repository::<Movie>::insert(&store, movie.clone()).await.unwrap();

        let session = store.begin().await.unwrap();
        session.adjust_movie_stock(movie.id, -1, None).await.unwrap();
        session.abort().await.unwrap();

        let stored = Repository::<Movie>::find(&store, movie.id).await.unwrap();
        assert_eq!(stored.map(|m| m.number_in_stock), Some(2));
    }

    #[tokio::test]
    async fn committed_session_is_visible() {
        let store = InMemoryStore::transactional();
        let movie = fixtures::movie("Metropolis", 2, 300);
        Repository::<Movie>::insert(&store, movie.clone()).await.unwrap();

        let session = store.begin().await.unwrap();
        session.adjust_movie_stock(movie.id, -1, None).await.unwrap();
        session.commit().await.unwrap();

        let stored = Repository::<Movie>::find(&store, movie.id).await.unwrap();
        assert_eq!(stored.map(|m| m.number_in_stock), Some(1));
    }

    #[tokio::test]
    async fn begin_without_transactions_is_unsupported() {
        let store = InMemoryStore::new();
        assert!(!store.supports_transactions());
        assert!(matches!(
            store.begin().await.err(),
            Some(StoreError::TransactionsUnsupported(_))
        ));
    }

    #[tokio::test]
    async fn faults_fire_after_skip_and_count_calls() {
        let store = InMemoryStore::new();
        let movie = fixtures::movie("Metropolis", 5, 300);
        Repository::<Movie>::insert(&store, movie.clone()).await.unwrap();
        store.fail_after(
            StoreOp::AdjustMovieStock,
            1,
            StoreError::Backend("connection reset".to_string()),
        );

        assert!(store.adjust_movie_stock(movie.id, -1, None).await.is_ok());
        assert!(store.adjust_movie_stock(movie.id, -1, None).await.is_err());
        assert!(store.adjust_movie_stock(movie.id, -1, None).await.is_err());
        assert_eq!(store.calls(StoreOp::AdjustMovieStock), 3);

        store.clear_faults();
        assert!(store.adjust_movie_stock(movie.id, 1, None).await.is_ok());
    }

    #[tokio::test]
    async fn delete_refuses_movies_on_loan() {
        let store = InMemoryStore::new();
        let customer = fixtures::customer("Ada Lovelace", 1);
        let movie = fixtures::movie("Metropolis", 2, 300);
        Repository::<Movie>::insert(&store, movie.clone()).await.unwrap();
        store
            .insert_rental(fixtures::rental(&customer, &movie, fixtures::epoch()))
            .await
            .unwrap();

        let err = Repository::<Movie>::delete(&store, movie.id).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { entity: "movie", .. }));
        assert_eq!(Repository::<Movie>::delete_all(&store).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn user_emails_are_unique_ignoring_case() {
        let store = InMemoryStore::new();
        Repository::<User>::insert(&store, fixtures::user("ada@example.com", false))
            .await
            .unwrap();
        let err = Repository::<User>::insert(&store, fixtures::user("ADA@example.com", false))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { entity: "user", .. }));
        assert!(
            store
                .find_user_by_email("Ada@Example.com")
                .await
                .unwrap()
                .is_some()
        );
    }
}
